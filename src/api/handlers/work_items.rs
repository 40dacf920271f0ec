//! Submission API (§6.1): `POST /api/work`, `GET /api/work/:id`,
//! `POST /api/work/:id/cancel`.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::domain::{Priority, WorkItem, WorkItemStatus};
use crate::error::{OrchestratorError, Result};
use crate::queue::SubmitRequest;

/// `POST /api/work` body. Exactly one of `description`/`spec` is required —
/// enforced by `QueueManager::submit`, not here, so every caller (this
/// handler, tests, a future RPC transport) gets the same guarantee.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
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

impl From<SubmitBody> for SubmitRequest {
    fn from(b: SubmitBody) -> Self {
        SubmitRequest {
            repo: b.repo,
            description: b.description,
            spec: b.spec,
            branch: b.branch,
            priority: b.priority,
            max_iterations: b.max_iterations,
            source: b.source,
            source_ref: b.source_ref,
            metadata: b.metadata,
        }
    }
}

pub async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> Result<Json<WorkItem>> {
    let item = state.queue.submit(body.into()).await?;
    if item.status == WorkItemStatus::Generating {
        state.specgen.start(item.clone());
    }
    Ok(Json(item))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkItem>> {
    state
        .queue
        .get(id)
        .await?
        .map(Json)
        .ok_or(OrchestratorError::NotFound)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>> {
    // §5: cancelling a `generating` item must abort its spec-gen child
    // process, so the prior status is checked before the transition.
    let was_generating = state
        .queue
        .get(id)
        .await?
        .map(|item| item.status == WorkItemStatus::Generating)
        .unwrap_or(false);

    let cancelled = state.queue.cancel(id).await?;
    if cancelled && was_generating {
        state.specgen.cancel(id);
    }

    Ok(Json(CancelResponse { cancelled }))
}
