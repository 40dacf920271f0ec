//! Shared application state threaded through every route handler.
//!
//! Mirrors the teacher's `AgentState` (`api/agent_state.rs`): a small,
//! cheaply-`Clone`able struct of already-`Clone`able services, handed to
//! `axum::Router::with_state`.

use crate::database::{LearningsRepository, MetricsRepository, ReviewsRepository, WorkersRepository};
use crate::queue::QueueManager;
use crate::specgen::SpecGenManager;
use crate::workers::WorkerRegistry;

#[derive(Clone)]
pub struct AppState {
    pub queue: QueueManager,
    pub worker_registry: WorkerRegistry,
    pub specgen: SpecGenManager,
    pub workers_repo: WorkersRepository,
    pub learnings_repo: LearningsRepository,
    pub metrics_repo: MetricsRepository,
    pub reviews_repo: ReviewsRepository,
}
