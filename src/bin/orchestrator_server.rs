//! orchestrator_server — standalone binary for the AI software-factory
//! control plane (§1-2).
//!
//! Reads config from env vars (see `orchestrator::config::OrchestratorConfig`):
//!   DATABASE_URL        — Postgres connection string
//!   BIND_ADDR           — listen address (default: 127.0.0.1:3000)
//!   ORCHESTRATOR_URL    — advertised back to spawned workers
//!   GITHUB_TOKEN        — injected into spawned worker processes
//!   WORKER_COMMAND, SPEC_GENERATOR_COMMAND — external executables
//!
//! Starts three long-lived background tasks alongside the HTTP listener
//! (§5 "scheduling model"): the dispatcher, the staleness sweeper, and the
//! spec-generation manager's in-flight tasks (spawned lazily, per item).

use std::sync::Arc;

use orchestrator::api::{build_router, AppState};
use orchestrator::config::OrchestratorConfig;
use orchestrator::database::{
    DatabaseConfig, DatabaseManager, FileLocksRepository, LearningsRepository, MetricsRepository,
    ReviewsRepository, WorkItemsRepository, WorkersRepository,
};
use orchestrator::dispatcher::Dispatcher;
use orchestrator::domain::WorkItemStatus;
use orchestrator::locks::FileLockService;
use orchestrator::queue::QueueManager;
use orchestrator::specgen::SpecGenManager;
use orchestrator::workers::{run_sweeper, WorkerRegistry};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orchestrator=debug".into()),
        )
        .init();

    let config = OrchestratorConfig::from_env();

    let db_config = DatabaseConfig {
        database_url: config.database_url.clone(),
        max_connections: config.max_db_connections,
        connection_timeout: std::time::Duration::from_secs(10),
    };
    let db = DatabaseManager::connect(&db_config).await?;
    db.run_migrations().await?;
    let pool = db.pool().clone();

    let work_items = WorkItemsRepository::new(pool.clone());
    let workers_repo = WorkersRepository::new(pool.clone());
    let file_locks_repo = FileLocksRepository::new(pool.clone());
    let learnings_repo = LearningsRepository::new(pool.clone());
    let metrics_repo = MetricsRepository::new(pool.clone());
    let reviews_repo = ReviewsRepository::new(pool.clone());

    let locks = FileLockService::new(file_locks_repo);
    let queue = QueueManager::new(work_items.clone());
    let specgen = SpecGenManager::new(work_items.clone(), config.clone());

    let worker_registry = WorkerRegistry::new(
        workers_repo.clone(),
        work_items.clone(),
        locks.clone(),
        queue.clone(),
        learnings_repo.clone(),
        metrics_repo.clone(),
        reviews_repo.clone(),
        config.clone(),
    );
    let worker_registry = Arc::new(worker_registry);

    resume_pending_generations(&queue, &specgen).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = tokio::spawn(run_sweeper(
        Arc::new(workers_repo.clone()),
        Arc::new(work_items.clone()),
        Arc::new(locks.clone()),
        Arc::new(config.clone()),
        shutdown_rx.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        queue.clone(),
        worker_registry.clone(),
        Arc::new(config.clone()),
    ));
    let dispatcher_for_task = dispatcher.clone();
    let dispatcher_shutdown_rx = shutdown_rx.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher_for_task.run(dispatcher_shutdown_rx).await;
    });

    let state = AppState {
        queue,
        worker_registry: (*worker_registry).clone(),
        specgen,
        workers_repo,
        learnings_repo,
        metrics_repo,
        reviews_repo,
    };
    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("orchestrator listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;
    let _ = dispatcher_handle.await;
    Ok(())
}

/// §4.2: items left `generating` by a previous process (e.g. a restart
/// mid-generation) get a fresh generation task — `start` is idempotent per
/// item, so this is safe to call unconditionally at boot.
async fn resume_pending_generations(queue: &QueueManager, specgen: &SpecGenManager) {
    let Ok(items) = queue.list(None).await else {
        tracing::warn!("failed to list active work items at startup");
        return;
    };
    for item in items.into_iter().filter(|i| i.status == WorkItemStatus::Generating) {
        specgen.start(item);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
