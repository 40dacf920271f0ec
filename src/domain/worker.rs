use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Running,
    Completed,
    Failed,
    Stuck,
    Killed,
}

impl WorkerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerStatus::Completed | WorkerStatus::Failed | WorkerStatus::Killed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: Uuid,
    pub work_item_id: Uuid,
    pub status: WorkerStatus,
    pub iteration: i32,
    pub last_heartbeat: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub tokens_in: i64,
    pub tokens_out: i64,
}

impl Worker {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
