//! Error taxonomy for the orchestrator (§7).
//!
//! Five kinds, not five types: `Validation`/`Conflict` never change state and
//! map to 4xx; `Transient` is handled by the retry policy and never escapes
//! to a caller as a bare error (callers see the item's updated status
//! instead); `Terminal`/`Fatal` map to 5xx. Modeled on the teacher's
//! `LockError` in `database/locks.rs`, which distinguishes `Contention`
//! (a precondition failure) from `Database` (an infrastructure failure).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("terminal error: {0}")]
    Terminal(String),

    #[error("fatal invariant breach: {0}")]
    Fatal(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        OrchestratorError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        OrchestratorError::Conflict(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        OrchestratorError::Transient(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        OrchestratorError::Terminal(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        OrchestratorError::Fatal(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Validation(_) => "validation",
            OrchestratorError::Conflict(_) => "conflict",
            OrchestratorError::Transient(_) => "transient",
            OrchestratorError::Terminal(_) => "terminal",
            OrchestratorError::Fatal(_) => "fatal",
            OrchestratorError::NotFound => "not_found",
            OrchestratorError::Database(_) => "transient",
            OrchestratorError::Io(_) => "transient",
        }
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::Conflict(_) => StatusCode::CONFLICT,
            OrchestratorError::NotFound => StatusCode::NOT_FOUND,
            OrchestratorError::Transient(_)
            | OrchestratorError::Database(_)
            | OrchestratorError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Terminal(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(self, OrchestratorError::Fatal(_)) {
            tracing::error!(error = %self, "fatal invariant breach");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
