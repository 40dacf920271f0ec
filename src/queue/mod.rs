//! Queue Manager (§4.1): submission, atomic claim, cancellation, listing,
//! stats, and the execution→verification handoff.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::branch::default_queued_branch;
use crate::database::work_items_repository::{NewWorkItem, QueueStats};
use crate::database::WorkItemsRepository;
use crate::domain::{Priority, WorkItem, WorkItemStatus, WorkItemType, DEFAULT_MAX_ITERATIONS};
use crate::error::{OrchestratorError, Result};

/// Request shape accepted by `submit` (§6.1). Exactly one of `description`
/// or `spec` must be set — validated here, not at the HTTP edge, so any
/// caller gets the same guarantee.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub repo: String,
    pub description: Option<String>,
    pub spec: Option<String>,
    pub branch: Option<String>,
    pub priority: Option<Priority>,
    pub max_iterations: Option<i32>,
    pub source: Option<String>,
    pub source_ref: Option<String>,
    pub metadata: Option<JsonValue>,
}

#[derive(Clone)]
pub struct QueueManager {
    repo: WorkItemsRepository,
}

impl QueueManager {
    pub fn new(repo: WorkItemsRepository) -> Self {
        Self { repo }
    }

    /// I-1: exactly one of `spec`/`description`. Validation failure is
    /// surfaced to the caller with no state change (§7).
    pub async fn submit(&self, req: SubmitRequest) -> Result<WorkItem> {
        if req.repo.trim().is_empty() {
            return Err(OrchestratorError::validation("repo must not be empty"));
        }
        let (spec, description, status) = match (&req.spec, &req.description) {
            (Some(_), Some(_)) => {
                return Err(OrchestratorError::validation(
                    "exactly one of spec or description must be set, not both",
                ))
            }
            (None, None) => {
                return Err(OrchestratorError::validation(
                    "exactly one of spec or description must be set",
                ))
            }
            (Some(spec), None) => (Some(spec.clone()), None, WorkItemStatus::Queued),
            (None, Some(description)) => (None, Some(description.clone()), WorkItemStatus::Generating),
        };

        let id = Uuid::new_v4();
        // A directly-supplied spec gets its branch immediately — the
        // caller's override if given, else `whim/<id[:8]>` (§6.1); a
        // description waits for the spec-gen manager to derive one (§6.6),
        // so `branch` stays null until generation completes (I-1 in §8).
        let branch = match status {
            WorkItemStatus::Queued => {
                Some(req.branch.clone().unwrap_or_else(|| default_queued_branch(id)))
            }
            _ => None,
        };

        let new_item = NewWorkItem {
            id,
            repo: req.repo,
            item_type: WorkItemType::Execution,
            status,
            priority: req.priority.unwrap_or_default(),
            spec,
            description,
            branch,
            max_iterations: req.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            parent_work_item_id: None,
            pr_number: None,
            source: req.source,
            source_ref: req.source_ref,
            metadata: req.metadata.unwrap_or_else(|| JsonValue::Object(Default::default())),
        };

        Ok(self.repo.insert(new_item).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<WorkItem>> {
        Ok(self.repo.get(id).await?)
    }

    /// §4.1 claim ordering, atomic under concurrent callers (I-4, I-7).
    pub async fn claim_next(&self, type_filter: Option<WorkItemType>) -> Result<Option<WorkItem>> {
        Ok(self.repo.claim_next(type_filter).await?)
    }

    /// `{queued, assigned, generating} -> cancelled`. Idempotent: a second
    /// call on an already-cancelled (or otherwise terminal) item returns
    /// `false`. Callers that need to abort an in-flight spec generation
    /// should check the item's prior status with `get` before cancelling.
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        Ok(self.repo.cancel(id).await?)
    }

    /// §4.6: puts a just-claimed item back to `queued` when the daily
    /// iteration budget is exhausted before dispatch. Not a failure, so it
    /// doesn't touch `retry_count`/`next_retry_at`.
    pub async fn release_claim(&self, id: Uuid) -> Result<()> {
        Ok(self.repo.release_claim(id).await?)
    }

    pub async fn list(&self, type_filter: Option<WorkItemType>) -> Result<Vec<WorkItem>> {
        Ok(self.repo.list_active(type_filter).await?)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        Ok(self.repo.stats().await?)
    }

    /// §4.7: the execution→verification handoff. Inherits `repo`, `branch`,
    /// `priority`, `maxIterations` from the parent.
    pub async fn enqueue_verification(&self, parent: &WorkItem, pr_number: i64) -> Result<WorkItem> {
        let new_item = NewWorkItem {
            id: Uuid::new_v4(),
            repo: parent.repo.clone(),
            item_type: WorkItemType::Verification,
            status: WorkItemStatus::Queued,
            priority: parent.priority,
            spec: None,
            description: None,
            branch: parent.branch.clone(),
            max_iterations: parent.max_iterations,
            parent_work_item_id: Some(parent.id),
            pr_number: Some(pr_number),
            source: parent.source.clone(),
            source_ref: parent.source_ref.clone(),
            metadata: parent.metadata.clone(),
        };
        Ok(self.repo.insert(new_item).await?)
    }
}
