//! Worker-lifecycle persistence (§4.3).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Worker, WorkerStatus};

fn status_str(s: WorkerStatus) -> &'static str {
    match s {
        WorkerStatus::Starting => "starting",
        WorkerStatus::Running => "running",
        WorkerStatus::Completed => "completed",
        WorkerStatus::Failed => "failed",
        WorkerStatus::Stuck => "stuck",
        WorkerStatus::Killed => "killed",
    }
}

#[derive(Clone)]
pub struct WorkersRepository {
    pool: PgPool,
}

impl WorkersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// §4.3 `register`: creates the worker row, `starting`.
    pub async fn register(&self, work_item_id: Uuid) -> Result<Worker, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, Worker>(
            r#"
            INSERT INTO workers (id, work_item_id, status)
            VALUES ($1, $2, 'starting')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(work_item_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Worker>, sqlx::Error> {
        sqlx::query_as::<_, Worker>("SELECT * FROM workers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// §4.3 `heartbeat`: bumps `last_heartbeat`/`iteration`/token counters,
    /// and flips `starting -> running` on the first beat. No-op on a
    /// terminal worker (I-2). `stuck` is not terminal — a worker that
    /// resumes heartbeating after a sweep is allowed back to `running`.
    pub async fn heartbeat(
        &self,
        id: Uuid,
        iteration: i32,
        tokens_in: i64,
        tokens_out: i64,
    ) -> Result<Option<Worker>, sqlx::Error> {
        sqlx::query_as::<_, Worker>(
            r#"
            UPDATE workers
            SET last_heartbeat = now(),
                iteration = $2,
                tokens_in = tokens_in + $3,
                tokens_out = tokens_out + $4,
                status = CASE WHEN status IN ('starting', 'stuck') THEN 'running' ELSE status END
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'killed')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(iteration)
        .bind(tokens_in)
        .bind(tokens_out)
        .fetch_optional(&self.pool)
        .await
    }

    /// Generic terminal/non-terminal status transition. Returns `None` if
    /// the worker is already terminal (I-2: no transition out of a
    /// terminal state). `stuck` is not terminal, so a stuck worker can
    /// still be transitioned (e.g. `kill`, per §4.3's `{starting, running,
    /// stuck} -> killed`).
    pub async fn set_status(
        &self,
        id: Uuid,
        status: WorkerStatus,
    ) -> Result<Option<Worker>, sqlx::Error> {
        sqlx::query_as::<_, Worker>(
            r#"
            UPDATE workers
            SET status = $2
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'killed')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status_str(status))
        .fetch_optional(&self.pool)
        .await
    }

    /// Sweeper query (§4.3): non-terminal workers whose last heartbeat is
    /// older than `window`.
    pub async fn list_stale(&self, window: chrono::Duration) -> Result<Vec<Worker>, sqlx::Error> {
        let cutoff = Utc::now() - window;
        sqlx::query_as::<_, Worker>(
            r#"
            SELECT * FROM workers
            WHERE status NOT IN ('completed', 'failed', 'stuck', 'killed')
              AND last_heartbeat < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_by_work_item(&self, work_item_id: Uuid) -> Result<Vec<Worker>, sqlx::Error> {
        sqlx::query_as::<_, Worker>(
            "SELECT * FROM workers WHERE work_item_id = $1 ORDER BY started_at ASC",
        )
        .bind(work_item_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Backs `GET /api/workers` (§6.3): a snapshot-at-query projection,
    /// most recently started first.
    pub async fn list_all(&self) -> Result<Vec<Worker>, sqlx::Error> {
        sqlx::query_as::<_, Worker>("SELECT * FROM workers ORDER BY started_at DESC")
            .fetch_all(&self.pool)
            .await
    }
}
