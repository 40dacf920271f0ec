//! Dispatcher (§4.6): matches idle capacity to claimable work, enforces the
//! daily iteration budget, and spawns the worker process contract (§6.4).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::domain::WorkItem;
use crate::queue::QueueManager;
use crate::retry::FailureClass;
use crate::workers::WorkerRegistry;

/// Tracks how many items have been dispatched today; resets at UTC
/// midnight. Exhaustion suppresses dispatch without failing queued items
/// (§4.5).
struct DailyBudget {
    limit: u32,
    used: AtomicU32,
    day: Mutex<NaiveDate>,
}

impl DailyBudget {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            used: AtomicU32::new(0),
            day: Mutex::new(Utc::now().date_naive()),
        }
    }

    async fn try_consume(&self) -> bool {
        let today = Utc::now().date_naive();
        {
            let mut day = self.day.lock().await;
            if *day != today {
                *day = today;
                self.used.store(0, Ordering::SeqCst);
            }
        }
        let mut current = self.used.load(Ordering::SeqCst);
        loop {
            if current >= self.limit {
                return false;
            }
            match self.used.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

pub struct Dispatcher {
    queue: QueueManager,
    workers: Arc<WorkerRegistry>,
    config: Arc<OrchestratorConfig>,
    capacity: Arc<Semaphore>,
    budget: Arc<DailyBudget>,
}

impl Dispatcher {
    pub fn new(queue: QueueManager, workers: Arc<WorkerRegistry>, config: Arc<OrchestratorConfig>) -> Self {
        let capacity = Arc::new(Semaphore::new(config.max_concurrent_workers));
        let budget = Arc::new(DailyBudget::new(config.daily_iteration_budget));
        Self {
            queue,
            workers,
            config,
            capacity,
            budget,
        }
    }

    /// Long-lived cooperative loop; stops when `shutdown` reports `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                info!("dispatcher shutting down");
                return;
            }

            let Ok(permit) = self.capacity.clone().try_acquire_owned() else {
                self.sleep_or_shutdown(&mut shutdown).await;
                continue;
            };

            let claimed = match self.queue.claim_next(None).await {
                Ok(item) => item,
                Err(err) => {
                    warn!(error = %err, "claim_next failed, will retry");
                    drop(permit);
                    self.sleep_or_shutdown(&mut shutdown).await;
                    continue;
                }
            };

            let Some(item) = claimed else {
                drop(permit);
                self.sleep_or_shutdown(&mut shutdown).await;
                continue;
            };

            // Budget is only charged once an item is actually going to be
            // dispatched (§4.5/§4.6) — an idle queue must never burn it.
            if !self.budget.try_consume().await {
                if let Err(err) = self.queue.release_claim(item.id).await {
                    error!(work_item_id = %item.id, error = %err, "failed to release claimed item back to queue");
                }
                drop(permit);
                self.sleep_or_shutdown(&mut shutdown).await;
                continue;
            }

            let workers = self.workers.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                dispatch_one(workers, config, item).await;
                drop(permit);
            });
        }
    }

    async fn sleep_or_shutdown(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.dispatch_poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// §4.6 steps 2-3 for a single claimed item.
async fn dispatch_one(workers: Arc<WorkerRegistry>, config: Arc<OrchestratorConfig>, item: WorkItem) {
    let work_dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            error!(work_item_id = %item.id, error = %err, "failed to allocate work dir");
            return;
        }
    };

    let worker = match workers.register(item.id).await {
        Ok(worker) => worker,
        Err(err) => {
            error!(work_item_id = %item.id, error = %err, "failed to register worker");
            return;
        }
    };

    match spawn_worker_process(&config, &item, worker.id, work_dir.path()) {
        Ok(mut child) => {
            tokio::spawn(async move {
                let _ = child.wait().await;
                let _ = work_dir;
            });
        }
        Err(err) => {
            warn!(work_item_id = %item.id, worker_id = %worker.id, error = %err, "worker spawn failed");
            let _ = workers
                .fail(worker.id, &format!("spawn failed: {err}"), FailureClass::Transient)
                .await;
        }
    }
}

/// §6.4 worker spawn contract: one child process per claimed item, carrying
/// `ORCHESTRATOR_URL`, `WORKER_ID`, `WORK_ITEM`, `GITHUB_TOKEN`, `WORK_DIR`.
fn spawn_worker_process(
    config: &OrchestratorConfig,
    item: &WorkItem,
    worker_id: Uuid,
    work_dir: &std::path::Path,
) -> std::io::Result<tokio::process::Child> {
    let work_item_json = json!({
        "id": item.id,
        "repo": item.repo,
        "type": item.item_type,
        "spec": item.spec,
        "branch": item.branch,
        "priority": item.priority,
        "maxIterations": item.max_iterations,
        "parentWorkItemId": item.parent_work_item_id,
    })
    .to_string();

    let mut cmd = tokio::process::Command::new(&config.worker_command);
    cmd.current_dir(work_dir)
        .env("ORCHESTRATOR_URL", &config.orchestrator_url)
        .env("WORKER_ID", worker_id.to_string())
        .env("WORK_ITEM", work_item_json)
        .env("WORK_DIR", work_dir)
        .kill_on_drop(true);

    if let Some(token) = &config.github_token {
        cmd.env("GITHUB_TOKEN", token);
    }

    cmd.spawn()
}
