use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single append-only per-iteration measurement row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMetric {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub work_item_id: Uuid,
    pub iteration: i32,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub duration_ms: i64,
    pub files_modified: i32,
    pub tests_run: i32,
    pub tests_passed: i32,
    pub recorded_at: DateTime<Utc>,
}
