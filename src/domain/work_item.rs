use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `execution` items are produced by the dispatcher and run a coding agent to
/// completion; `verification` items are auto-enqueued to validate the PR an
/// execution item produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkItemType {
    Execution,
    Verification,
}

/// Lifecycle of a work item. `Completed`, `Failed` and `Cancelled` are
/// terminal: once entered, no further transition is valid (I-3 in §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Generating,
    Queued,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl WorkItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkItemStatus::Completed | WorkItemStatus::Failed | WorkItemStatus::Cancelled
        )
    }
}

/// Ordered low < medium < high < critical — the derived ordering here backs
/// the priority-rank-descending claim order in §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

pub const DEFAULT_MAX_ITERATIONS: i32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: Uuid,
    pub repo: String,
    #[serde(rename = "type")]
    pub item_type: WorkItemType,
    pub status: WorkItemStatus,
    pub priority: Priority,
    pub spec: Option<String>,
    pub description: Option<String>,
    pub branch: Option<String>,
    pub pr_number: Option<i64>,
    pub pr_url: Option<String>,
    pub parent_work_item_id: Option<Uuid>,
    pub verification_passed: Option<bool>,
    pub iteration: i32,
    pub max_iterations: i32,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub worker_id: Option<Uuid>,
    pub source: Option<String>,
    pub source_ref: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl WorkItem {
    /// True once this item can never transition again (I-3).
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
