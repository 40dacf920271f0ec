//! Spec-Generation Manager (§4.2): turns a `description` work item into
//! `(spec, branch)` by running an external generator as a child process and
//! parsing its line-delimited event stream.

mod events;

pub use events::SpecGenEvent;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Notify, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::branch::derive as derive_branch;
use crate::config::OrchestratorConfig;
use crate::database::WorkItemsRepository;
use crate::domain::WorkItem;

/// Cooperative cancellation for one in-flight generation: `cancel()` flips
/// the flag and wakes anyone waiting on `notify`, without needing an
/// `.await` held across the `in_flight` lock.
#[derive(Clone)]
struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Tracks which items currently have a generation task in flight. Guarded
/// by a std mutex since every critical section is synchronous (insert,
/// remove, membership check) — no `.await` is ever held across the lock.
#[derive(Clone)]
pub struct SpecGenManager {
    inner: Arc<Inner>,
}

struct Inner {
    in_flight: Mutex<HashMap<Uuid, CancelHandle>>,
    semaphore: Arc<Semaphore>,
    work_items: WorkItemsRepository,
    config: OrchestratorConfig,
}

impl SpecGenManager {
    pub fn new(work_items: WorkItemsRepository, config: OrchestratorConfig) -> Self {
        let max_concurrency = config.spec_gen_max_concurrency;
        Self {
            inner: Arc::new(Inner {
                in_flight: Mutex::new(HashMap::new()),
                semaphore: Arc::new(Semaphore::new(max_concurrency)),
                work_items,
                config,
            }),
        }
    }

    pub fn is_generating(&self, id: Uuid) -> bool {
        self.inner
            .in_flight
            .lock()
            .expect("in_flight mutex poisoned")
            .contains_key(&id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().expect("in_flight mutex poisoned").len()
    }

    pub fn in_flight_ids(&self) -> Vec<Uuid> {
        self.inner
            .in_flight
            .lock()
            .expect("in_flight mutex poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// §4.2 `start`: idempotent per `item.id`. Spawns a long-lived task that
    /// owns the item's full retry loop until it succeeds, is cancelled, or
    /// exhausts its attempt budget.
    pub fn start(&self, item: WorkItem) {
        let id = item.id;
        let handle = CancelHandle::new();
        {
            let mut in_flight = self.inner.in_flight.lock().expect("in_flight mutex poisoned");
            if in_flight.contains_key(&id) {
                return;
            }
            in_flight.insert(id, handle.clone());
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_generation_loop(&inner, item, handle).await;
            inner.in_flight.lock().expect("in_flight mutex poisoned").remove(&id);
        });
    }

    /// §5 cancellation semantics: aborts the in-flight generation's child
    /// process and scratch directory. A no-op if `id` has no generation in
    /// flight (e.g. it already completed, or was never started).
    pub fn cancel(&self, id: Uuid) {
        if let Some(handle) = self.inner.in_flight.lock().expect("in_flight mutex poisoned").get(&id) {
            handle.cancel();
        }
    }
}

async fn run_generation_loop(inner: &Inner, item: WorkItem, cancel: CancelHandle) {
    let max_attempts = inner.config.spec_gen_max_attempts;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            info!(work_item_id = %item.id, "spec generation cancelled before attempt");
            return;
        }

        attempt += 1;
        let _permit = inner.semaphore.acquire().await;

        match run_one_attempt(inner, &item, &cancel).await {
            Ok(Outcome::Completed) => {
                info!(work_item_id = %item.id, attempt, "spec generation complete");
                return;
            }
            Ok(Outcome::Cancelled) => {
                info!(work_item_id = %item.id, "spec generation cancelled");
                return;
            }
            Err(err) => {
                warn!(work_item_id = %item.id, attempt, error = %err, "spec generation attempt failed");
                if attempt >= max_attempts {
                    let _ = inner
                        .work_items
                        .fail(item.id, &format!("spec generation exhausted attempts: {err}"))
                        .await;
                    return;
                }
                let delay = backoff_for_attempt(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.notify.notified() => {
                        info!(work_item_id = %item.id, "spec generation cancelled during backoff");
                        return;
                    }
                }
            }
        }
    }
}

enum Outcome {
    Completed,
    Cancelled,
}

/// `2^attempt` seconds, capped at the retry ceiling used elsewhere (30 min).
fn backoff_for_attempt(attempt: u32) -> std::time::Duration {
    let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX).min(1800);
    std::time::Duration::from_secs(secs)
}

async fn run_one_attempt(inner: &Inner, item: &WorkItem, cancel: &CancelHandle) -> Result<Outcome, String> {
    let scratch_dir = tempfile::tempdir().map_err(|e| format!("scratch dir: {e}"))?;

    let description = item.description.as_deref().unwrap_or("");

    let mut child = Command::new(&inner.config.spec_generator_command)
        .current_dir(scratch_dir.path())
        .arg(description)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("spawn: {e}"))?;

    let stdout = child.stdout.take().ok_or_else(|| "no stdout".to_string())?;
    let mut lines = BufReader::new(stdout).lines();

    let timeout = inner.config.spec_gen_timeout;
    let read_events = async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(event) = SpecGenEvent::parse(&line) {
                match event {
                    SpecGenEvent::Started => {
                        info!(work_item_id = %item.id, "spec generation started");
                    }
                    SpecGenEvent::Complete { spec_path, .. } => {
                        return Some(Ok(spec_path));
                    }
                    SpecGenEvent::Failed { error } => {
                        return Some(Err(error));
                    }
                }
            }
        }
        None
    };

    let outcome = tokio::select! {
        result = tokio::time::timeout(timeout, read_events) => {
            match result {
                Err(_) => {
                    let _ = child.kill().await;
                    let _ = scratch_dir.close();
                    return Err("timed out".to_string());
                }
                Ok(None) => {
                    let _ = child.wait().await;
                    let _ = scratch_dir.close();
                    return Err("generator exited without a terminal event".to_string());
                }
                Ok(Some(outcome)) => outcome,
            }
        }
        _ = cancel.notify.notified() => {
            let _ = child.kill().await;
            let _ = scratch_dir.close();
            return Ok(Outcome::Cancelled);
        }
    };

    let _ = child.wait().await;

    let spec_path = match outcome {
        Ok(path) => path,
        Err(error) => {
            let _ = scratch_dir.close();
            return Err(error);
        }
    };

    let spec_contents = std::fs::read_to_string(&spec_path).map_err(|e| format!("read spec: {e}"))?;
    let _ = scratch_dir.close();

    let branch = derive_branch(
        item.source.as_deref(),
        item.source_ref.as_deref(),
        item.description.as_deref(),
    );

    match inner
        .work_items
        .complete_generation(item.id, &spec_contents, &branch)
        .await
    {
        Ok(Some(_)) => Ok(Outcome::Completed),
        Ok(None) => Ok(Outcome::Cancelled),
        Err(e) => Err(format!("persist spec: {e}")),
    }
}
