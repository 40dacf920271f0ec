//! HTTP Surface (§4 component table, §6): a thin adapter over the queue,
//! worker registry, and spec-gen manager. No business logic lives here —
//! handlers translate HTTP in and out and otherwise just call through.

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the full axum router (§6.1-6.3). Mirrors the teacher's
/// `router::build_router` in shape — a flat `Router::new().route(...)`
/// chain plus a tracing layer — but with a single unauthenticated state
/// instead of the teacher's public/protected JWT split: every RPC here is
/// meant to be called by trusted in-fleet workers and intake processes,
/// not end users (§1 scope).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/work", post(handlers::work_items::submit))
        .route("/api/work/:id", get(handlers::work_items::get))
        .route("/api/work/:id/cancel", post(handlers::work_items::cancel))
        .route(
            "/api/worker/:worker_id/heartbeat",
            post(handlers::worker::heartbeat),
        )
        .route("/api/worker/:worker_id/lock", post(handlers::worker::lock))
        .route(
            "/api/worker/:worker_id/unlock",
            post(handlers::worker::unlock),
        )
        .route(
            "/api/worker/:worker_id/complete",
            post(handlers::worker::complete),
        )
        .route("/api/worker/:worker_id/fail", post(handlers::worker::fail))
        .route(
            "/api/worker/:worker_id/stuck",
            post(handlers::worker::stuck),
        )
        .route("/api/workers/:worker_id/kill", post(handlers::worker::kill))
        .route("/api/queue", get(handlers::reads::queue))
        .route("/api/workers", get(handlers::reads::workers))
        .route("/api/status", get(handlers::reads::status))
        .route("/api/metrics", get(handlers::reads::metrics))
        .route("/api/learnings", get(handlers::reads::learnings))
        .route("/api/reviews", get(handlers::reads::reviews))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
