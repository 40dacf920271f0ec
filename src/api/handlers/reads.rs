//! Read surfaces (§6.3): denormalized projections, consistency is
//! snapshot-at-query. `GET /api/queue`, `/api/workers`, `/api/status`,
//! `/api/metrics`, `/api/learnings`, `/api/reviews`.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::database::work_items_repository::QueueStats;
use crate::domain::{Learning, PrReview, WorkItem, WorkItemType, Worker, WorkerMetric};
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct TypeFilterQuery {
    #[serde(rename = "type")]
    pub item_type: Option<WorkItemType>,
}

pub async fn queue(
    State(state): State<AppState>,
    Query(query): Query<TypeFilterQuery>,
) -> Result<Json<Vec<WorkItem>>> {
    Ok(Json(state.queue.list(query.item_type).await?))
}

pub async fn workers(State(state): State<AppState>) -> Result<Json<Vec<Worker>>> {
    Ok(Json(state.workers_repo.list_all().await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub queue: QueueStatsDto,
    pub spec_generations_in_flight: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsDto {
    pub total: i64,
    pub by_status: Vec<CountDto>,
    pub by_priority: Vec<CountDto>,
}

#[derive(Debug, Serialize)]
pub struct CountDto {
    pub key: String,
    pub count: i64,
}

impl From<QueueStats> for QueueStatsDto {
    fn from(s: QueueStats) -> Self {
        QueueStatsDto {
            total: s.total,
            by_status: s
                .by_status
                .into_iter()
                .map(|(key, count)| CountDto { key, count })
                .collect(),
            by_priority: s
                .by_priority
                .into_iter()
                .map(|(key, count)| CountDto { key, count })
                .collect(),
        }
    }
}

/// `GET /api/status` (§6.3): a one-shot health summary — queue
/// composition plus how many spec generations are currently in flight.
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let stats = state.queue.stats().await?;
    Ok(Json(StatusResponse {
        queue: stats.into(),
        spec_generations_in_flight: state.specgen.in_flight_count(),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> Result<Json<Vec<WorkerMetric>>> {
    Ok(Json(state.metrics_repo.list_recent(500).await?))
}

#[derive(Debug, Deserialize)]
pub struct LearningsQuery {
    pub repo: Option<String>,
    pub spec: Option<String>,
}

pub async fn learnings(
    State(state): State<AppState>,
    Query(query): Query<LearningsQuery>,
) -> Result<Json<Vec<Learning>>> {
    Ok(Json(
        state
            .learnings_repo
            .list(query.repo.as_deref(), query.spec.as_deref())
            .await?,
    ))
}

pub async fn reviews(State(state): State<AppState>) -> Result<Json<Vec<PrReview>>> {
    Ok(Json(state.reviews_repo.list_all().await?))
}
