//! Worker Registry (§4.3): per-worker lifecycle, heartbeat ingestion, and
//! the staleness sweeper.

mod sweeper;

pub use sweeper::{run_sweeper, sweep_once, SweepOutcome};

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::database::metrics_repository::NewMetric;
use crate::database::{
    LearningsRepository, MetricsRepository, ReviewsRepository, WorkItemsRepository,
    WorkersRepository,
};
use crate::domain::{Worker, WorkerStatus, WorkItem};
use crate::error::{OrchestratorError, Result};
use crate::locks::FileLockService;
use crate::queue::QueueManager;
use crate::retry::{self, FailureClass};
use crate::config::OrchestratorConfig;

/// A single per-iteration measurement, reported with `complete` (§3
/// `WorkerMetric`).
#[derive(Debug, Clone, Default)]
pub struct MetricReport {
    pub iteration: i32,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub duration_ms: i64,
    pub files_modified: i32,
    pub tests_run: i32,
    pub tests_passed: i32,
}

/// A free-form note reported with `complete` (§3 `Learning`).
#[derive(Debug, Clone)]
pub struct LearningReport {
    pub spec: Option<String>,
    pub content: String,
}

/// A structured verifier report, reported with `complete` (§3 `PRReview`).
#[derive(Debug, Clone, Default)]
pub struct ReviewReport {
    pub spec_alignment: JsonValue,
    pub code_quality: JsonValue,
    pub overall_summary: Option<String>,
}

/// `heartbeat`'s result: the updated worker plus whether its work item has
/// been cancelled since the last beat (§5 cancellation signaling).
#[derive(Debug, Clone)]
pub struct HeartbeatOutcome {
    pub worker: Worker,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CompleteRequest {
    pub pr_url: Option<String>,
    pub pr_number: Option<i64>,
    pub metrics: Option<MetricReport>,
    pub learnings: Option<LearningReport>,
    pub review: Option<ReviewReport>,
    pub verification_enabled: bool,
}

#[derive(Clone)]
pub struct WorkerRegistry {
    workers: WorkersRepository,
    work_items: WorkItemsRepository,
    locks: FileLockService,
    queue: QueueManager,
    learnings: LearningsRepository,
    metrics: MetricsRepository,
    reviews: ReviewsRepository,
    config: OrchestratorConfig,
}

impl WorkerRegistry {
    pub fn new(
        workers: WorkersRepository,
        work_items: WorkItemsRepository,
        locks: FileLockService,
        queue: QueueManager,
        learnings: LearningsRepository,
        metrics: MetricsRepository,
        reviews: ReviewsRepository,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            workers,
            work_items,
            locks,
            queue,
            learnings,
            metrics,
            reviews,
            config,
        }
    }

    /// §4.3 `register`: creates the worker row, transitions the item to
    /// `in_progress`.
    pub async fn register(&self, work_item_id: Uuid) -> Result<Worker> {
        let worker = self.workers.register(work_item_id).await?;
        self.work_items
            .mark_in_progress(work_item_id, worker.id)
            .await?;
        Ok(worker)
    }

    /// Missing or terminal workers return a distinct error so the caller
    /// (an external harness) knows to stop. The returned `cancelled` flag
    /// is how §5's "signals the worker via the next heartbeat response"
    /// cancellation semantics surface: a worker whose work item was
    /// cancelled mid-run sees `cancelled=true` and is expected to
    /// terminate on its own (the staleness sweeper is the backstop if it
    /// doesn't).
    pub async fn heartbeat(
        &self,
        worker_id: Uuid,
        iteration: i32,
        tokens_in: i64,
        tokens_out: i64,
    ) -> Result<HeartbeatOutcome> {
        let worker = self
            .workers
            .heartbeat(worker_id, iteration, tokens_in, tokens_out)
            .await?
            .ok_or_else(|| OrchestratorError::conflict("worker missing or terminal"))?;

        let cancelled = self
            .work_items
            .get(worker.work_item_id)
            .await?
            .map(|item| item.status == crate::domain::WorkItemStatus::Cancelled)
            .unwrap_or(false);

        Ok(HeartbeatOutcome { worker, cancelled })
    }

    pub async fn lock(
        &self,
        worker_id: Uuid,
        repo: &str,
        paths: &[String],
    ) -> Result<crate::locks::AcquireResult> {
        self.locks.acquire(repo, worker_id, paths).await
    }

    pub async fn unlock(&self, worker_id: Uuid, repo: &str, paths: &[String]) -> Result<()> {
        self.locks.release(repo, worker_id, paths).await
    }

    /// §4.3 `complete`: terminal for the worker and its execution item;
    /// persists metrics/learnings/review, and on `prNumber` +
    /// `verificationEnabled` enqueues the paired verification item (§4.7).
    pub async fn complete(&self, worker_id: Uuid, req: CompleteRequest) -> Result<WorkItem> {
        let worker = self
            .workers
            .get(worker_id)
            .await?
            .ok_or_else(|| OrchestratorError::conflict("worker not found"))?;

        let item = self
            .work_items
            .complete(worker.work_item_id, req.pr_number, req.pr_url.as_deref())
            .await?
            .ok_or_else(|| OrchestratorError::conflict("work item already terminal"))?;

        self.workers
            .set_status(worker_id, WorkerStatus::Completed)
            .await?;
        self.locks.release_all_of(worker_id).await?;

        if let Some(m) = req.metrics {
            self.metrics
                .record(NewMetric {
                    worker_id,
                    work_item_id: item.id,
                    iteration: m.iteration,
                    tokens_in: m.tokens_in,
                    tokens_out: m.tokens_out,
                    duration_ms: m.duration_ms,
                    files_modified: m.files_modified,
                    tests_run: m.tests_run,
                    tests_passed: m.tests_passed,
                })
                .await?;
        }

        if let Some(l) = req.learnings {
            self.learnings
                .append(&item.repo, l.spec.as_deref(), &l.content, item.id)
                .await?;
        }

        if let Some(r) = req.review {
            self.reviews
                .upsert(
                    item.id,
                    r.spec_alignment,
                    r.code_quality,
                    r.overall_summary.as_deref(),
                )
                .await?;
        }

        if req.verification_enabled {
            if let Some(pr_number) = item.pr_number {
                self.queue.enqueue_verification(&item, pr_number).await?;
            }
        }

        Ok(item)
    }

    /// §4.7 `completeVerification`: idempotent — a second call for the same
    /// verification worker is a no-op (worker already terminal).
    pub async fn complete_verification(&self, worker_id: Uuid, passed: bool) -> Result<()> {
        let worker = self
            .workers
            .get(worker_id)
            .await?
            .ok_or_else(|| OrchestratorError::conflict("worker not found"))?;

        if worker.is_terminal() {
            return Ok(());
        }

        let item = self
            .work_items
            .complete(worker.work_item_id, None, None)
            .await?
            .ok_or_else(|| OrchestratorError::conflict("work item already terminal"))?;

        self.workers
            .set_status(worker_id, WorkerStatus::Completed)
            .await?;
        self.locks.release_all_of(worker_id).await?;

        if let Some(parent_id) = item.parent_work_item_id {
            self.work_items
                .set_verification_passed(parent_id, passed)
                .await?;
        }

        Ok(())
    }

    /// §4.3 `fail`: transitions the worker and applies Retry Policy to the
    /// item.
    pub async fn fail(&self, worker_id: Uuid, error: &str, class: FailureClass) -> Result<()> {
        let worker = self
            .workers
            .get(worker_id)
            .await?
            .ok_or_else(|| OrchestratorError::conflict("worker not found"))?;

        self.workers
            .set_status(worker_id, WorkerStatus::Failed)
            .await?;
        self.locks.release_all_of(worker_id).await?;

        self.apply_retry(worker.work_item_id, error, class).await
    }

    /// §4.3 `stuck`: transitions the worker to `stuck`; the item follows
    /// Retry Policy as a transient failure, distinct attempt counter
    /// surfaced via `reason`.
    pub async fn stuck(&self, worker_id: Uuid, reason: &str) -> Result<()> {
        let worker = self
            .workers
            .get(worker_id)
            .await?
            .ok_or_else(|| OrchestratorError::conflict("worker not found"))?;

        self.workers
            .set_status(worker_id, WorkerStatus::Stuck)
            .await?;
        self.locks.release_all_of(worker_id).await?;

        self.apply_retry(worker.work_item_id, reason, FailureClass::Transient)
            .await
    }

    /// §4.3 `kill`: operator-initiated, `{starting, running, stuck} -> killed`.
    pub async fn kill(&self, worker_id: Uuid) -> Result<()> {
        let worker = self
            .workers
            .get(worker_id)
            .await?
            .ok_or_else(|| OrchestratorError::conflict("worker not found"))?;

        self.workers
            .set_status(worker_id, WorkerStatus::Killed)
            .await?;
        self.locks.release_all_of(worker_id).await?;

        self.apply_retry(worker.work_item_id, "killed by operator", FailureClass::Transient)
            .await
    }

    async fn apply_retry(&self, work_item_id: Uuid, error: &str, class: FailureClass) -> Result<()> {
        let item = self
            .work_items
            .get(work_item_id)
            .await?
            .ok_or_else(|| OrchestratorError::fatal("work item referenced by worker is missing"))?;

        if item.is_terminal() {
            return Ok(());
        }

        match retry::apply(&self.config, item.retry_count, class) {
            retry::RetryOutcome::RetryAt {
                retry_count,
                next_retry_at,
            } => {
                self.work_items
                    .retry_later(work_item_id, retry_count, next_retry_at, error)
                    .await?;
            }
            retry::RetryOutcome::Exhausted => {
                self.work_items.fail(work_item_id, error).await?;
            }
        }
        Ok(())
    }
}
