//! Worker RPCs (§6.2): heartbeat, lock/unlock, complete, fail, stuck, kill.
//!
//! These are the handlers an external harness process calls back into as it
//! runs one work item (§6.4 worker spawn contract).

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::domain::Worker;
use crate::error::Result;
use crate::retry::FailureClass;
use crate::workers::{CompleteRequest, LearningReport, MetricReport, ReviewReport};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    #[serde(flatten)]
    pub worker: Worker,
    /// §5: set once the worker's work item has been cancelled — the
    /// harness is expected to terminate on seeing this.
    pub cancelled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
    pub iteration: i32,
    /// Accepted for wire-compat with harnesses that report their own
    /// in-process status string; the registry derives worker status from
    /// the RPC that was called, not from this field.
    pub status: Option<String>,
    #[serde(default)]
    pub tokens_in: i64,
    #[serde(default)]
    pub tokens_out: i64,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
    Json(body): Json<HeartbeatBody>,
) -> Result<Json<HeartbeatResponse>> {
    let outcome = state
        .worker_registry
        .heartbeat(worker_id, body.iteration, body.tokens_in, body.tokens_out)
        .await?;
    Ok(Json(HeartbeatResponse {
        worker: outcome.worker,
        cancelled: outcome.cancelled,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LockBody {
    pub repo: String,
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    pub acquired: bool,
    pub conflicting_worker: Option<Uuid>,
}

pub async fn lock(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
    Json(body): Json<LockBody>,
) -> Result<Json<LockResponse>> {
    let result = state
        .worker_registry
        .lock(worker_id, &body.repo, &body.files)
        .await?;
    Ok(Json(LockResponse {
        acquired: result.acquired,
        conflicting_worker: result.conflicting_worker,
    }))
}

pub async fn unlock(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
    Json(body): Json<LockBody>,
) -> Result<()> {
    state
        .worker_registry
        .unlock(worker_id, &body.repo, &body.files)
        .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBody {
    pub iteration: i32,
    #[serde(default)]
    pub tokens_in: i64,
    #[serde(default)]
    pub tokens_out: i64,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub files_modified: i32,
    #[serde(default)]
    pub tests_run: i32,
    #[serde(default)]
    pub tests_passed: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningBody {
    pub spec: Option<String>,
    pub content: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBody {
    #[serde(default)]
    pub spec_alignment: JsonValue,
    #[serde(default)]
    pub code_quality: JsonValue,
    pub overall_summary: Option<String>,
}

/// `POST /api/worker/:id/complete` body. The `verificationPassed` form
/// (§6.2) is distinguished by its absence of the other fields and is
/// routed to `complete_verification` instead of the execution `complete`
/// path — an open question the spec (§9) resolves by treating it as a
/// distinct endpoint on the wire while accepting the overloaded shape.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    pub pr_url: Option<String>,
    pub pr_number: Option<i64>,
    pub metrics: Option<MetricsBody>,
    pub learnings: Option<LearningBody>,
    pub review: Option<ReviewBody>,
    #[serde(default)]
    pub verification_enabled: bool,
    pub verification_passed: Option<bool>,
}

pub async fn complete(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
    Json(body): Json<CompleteBody>,
) -> Result<Json<JsonValue>> {
    if let Some(passed) = body.verification_passed {
        state
            .worker_registry
            .complete_verification(worker_id, passed)
            .await?;
        return Ok(Json(serde_json::json!({ "verificationPassed": passed })));
    }

    let req = CompleteRequest {
        pr_url: body.pr_url,
        pr_number: body.pr_number,
        metrics: body.metrics.map(|m| MetricReport {
            iteration: m.iteration,
            tokens_in: m.tokens_in,
            tokens_out: m.tokens_out,
            duration_ms: m.duration_ms,
            files_modified: m.files_modified,
            tests_run: m.tests_run,
            tests_passed: m.tests_passed,
        }),
        learnings: body.learnings.map(|l| LearningReport {
            spec: l.spec,
            content: l.content,
        }),
        review: body.review.map(|r| ReviewReport {
            spec_alignment: r.spec_alignment,
            code_quality: r.code_quality,
            overall_summary: r.overall_summary,
        }),
        verification_enabled: body.verification_enabled,
    };

    let item = state.worker_registry.complete(worker_id, req).await?;
    Ok(Json(serde_json::to_value(item).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct FailBody {
    pub error: String,
    #[allow(dead_code)]
    pub iteration: i32,
}

pub async fn fail(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
    Json(body): Json<FailBody>,
) -> Result<()> {
    state
        .worker_registry
        .fail(worker_id, &body.error, FailureClass::Transient)
        .await
}

#[derive(Debug, Deserialize)]
pub struct StuckBody {
    pub reason: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub attempts: i32,
}

pub async fn stuck(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
    Json(body): Json<StuckBody>,
) -> Result<()> {
    state.worker_registry.stuck(worker_id, &body.reason).await
}

/// `POST /api/workers/:id/kill` — operator-initiated, no body.
pub async fn kill(State(state): State<AppState>, Path(worker_id): Path<Uuid>) -> Result<()> {
    state.worker_registry.kill(worker_id).await
}
