//! Append-only per-iteration worker metrics, surfaced at `/api/metrics` (§6.3).

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::WorkerMetric;

pub struct NewMetric {
    pub worker_id: Uuid,
    pub work_item_id: Uuid,
    pub iteration: i32,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub duration_ms: i64,
    pub files_modified: i32,
    pub tests_run: i32,
    pub tests_passed: i32,
}

#[derive(Clone)]
pub struct MetricsRepository {
    pool: PgPool,
}

impl MetricsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, m: NewMetric) -> Result<WorkerMetric, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, WorkerMetric>(
            r#"
            INSERT INTO worker_metrics
                (id, worker_id, work_item_id, iteration, tokens_in, tokens_out,
                 duration_ms, files_modified, tests_run, tests_passed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(m.worker_id)
        .bind(m.work_item_id)
        .bind(m.iteration)
        .bind(m.tokens_in)
        .bind(m.tokens_out)
        .bind(m.duration_ms)
        .bind(m.files_modified)
        .bind(m.tests_run)
        .bind(m.tests_passed)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_for_work_item(
        &self,
        work_item_id: Uuid,
    ) -> Result<Vec<WorkerMetric>, sqlx::Error> {
        sqlx::query_as::<_, WorkerMetric>(
            "SELECT * FROM worker_metrics WHERE work_item_id = $1 ORDER BY recorded_at ASC",
        )
        .bind(work_item_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Backs `GET /api/metrics` (§6.3): most recent rows first, capped so
    /// the projection stays boundable as the append-only log grows.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<WorkerMetric>, sqlx::Error> {
        sqlx::query_as::<_, WorkerMetric>(
            "SELECT * FROM worker_metrics ORDER BY recorded_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
