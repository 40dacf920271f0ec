//! Staleness sweeper (§4.3): periodic repair of workers that stopped
//! heartbeating and items that never got a worker registered.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::database::{WorkItemsRepository, WorkersRepository};
use crate::domain::WorkerStatus;
use crate::locks::FileLockService;
use crate::retry::{self, FailureClass};

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOutcome {
    pub workers_marked_stuck: usize,
    pub assignments_reverted: usize,
}

/// One sweep pass. Exposed separately from the loop so tests can drive it
/// deterministically without waiting on a timer.
pub async fn sweep_once(
    workers: &WorkersRepository,
    work_items: &WorkItemsRepository,
    locks: &FileLockService,
    config: &OrchestratorConfig,
) -> Result<SweepOutcome, sqlx::Error> {
    let mut outcome = SweepOutcome::default();

    let stale_window = ChronoDuration::from_std(config.stale_worker_window)
        .unwrap_or_else(|_| ChronoDuration::seconds(120));
    for worker in workers.list_stale(stale_window).await? {
        if workers
            .set_status(worker.id, WorkerStatus::Stuck)
            .await?
            .is_none()
        {
            continue;
        }
        let _ = locks.release_all_of(worker.id).await;

        if let Some(item) = work_items.get(worker.work_item_id).await? {
            if !item.is_terminal() {
                match retry::apply(config, item.retry_count, FailureClass::Transient) {
                    retry::RetryOutcome::RetryAt {
                        retry_count,
                        next_retry_at,
                    } => {
                        work_items
                            .retry_later(
                                item.id,
                                retry_count,
                                next_retry_at,
                                "worker stuck: heartbeat timeout",
                            )
                            .await?;
                    }
                    retry::RetryOutcome::Exhausted => {
                        work_items
                            .fail(item.id, "worker stuck: retry attempts exhausted")
                            .await?;
                    }
                }
            }
        }
        outcome.workers_marked_stuck += 1;
    }

    let grace = ChronoDuration::from_std(config.worker_registration_grace)
        .unwrap_or_else(|_| ChronoDuration::seconds(60));
    for item in work_items.list_stale_assignments(grace).await? {
        work_items
            .revert_stale_assignment(item.id, item.retry_count + 1)
            .await?;
        outcome.assignments_reverted += 1;
    }

    Ok(outcome)
}

/// Long-lived sweep loop; stops when `shutdown` reports `true`.
pub async fn run_sweeper(
    workers: Arc<WorkersRepository>,
    work_items: Arc<WorkItemsRepository>,
    locks: Arc<FileLockService>,
    config: Arc<OrchestratorConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.sweep_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_once(&workers, &work_items, &locks, &config).await {
                    Ok(outcome) if outcome.workers_marked_stuck > 0 || outcome.assignments_reverted > 0 => {
                        info!(
                            workers_marked_stuck = outcome.workers_marked_stuck,
                            assignments_reverted = outcome.assignments_reverted,
                            "staleness sweep repaired state"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "staleness sweep failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("staleness sweeper shutting down");
                    break;
                }
            }
        }
    }
}
