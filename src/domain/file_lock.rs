use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single (repo, path) exclusive reservation. The unique index on
/// `(repo, path)` in §6.5 is what makes acquisition atomic — see
/// `database::file_locks_repository`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FileLock {
    pub repo: String,
    pub path: String,
    pub holder_worker_id: Uuid,
    pub acquired_at: DateTime<Utc>,
}
