use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only note surfaced to subsequent workers operating on the same repo.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    pub id: Uuid,
    pub repo: String,
    pub spec: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub work_item_id: Uuid,
}
