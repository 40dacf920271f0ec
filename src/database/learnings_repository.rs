//! Append-only learnings log, surfaced at `/api/learnings?repo=&spec=` (§6.3).

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Learning;

#[derive(Clone)]
pub struct LearningsRepository {
    pool: PgPool,
}

impl LearningsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        repo: &str,
        spec: Option<&str>,
        content: &str,
        work_item_id: Uuid,
    ) -> Result<Learning, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, Learning>(
            r#"
            INSERT INTO learnings (id, repo, spec, content, work_item_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(repo)
        .bind(spec)
        .bind(content)
        .bind(work_item_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list(
        &self,
        repo: Option<&str>,
        spec: Option<&str>,
    ) -> Result<Vec<Learning>, sqlx::Error> {
        sqlx::query_as::<_, Learning>(
            r#"
            SELECT * FROM learnings
            WHERE ($1::text IS NULL OR repo = $1)
              AND ($2::text IS NULL OR spec = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(repo)
        .bind(spec)
        .fetch_all(&self.pool)
        .await
    }
}
