//! Verifier reports, keyed by execution work item, surfaced at
//! `/api/reviews` (§6.3).

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::PrReview;

#[derive(Clone)]
pub struct ReviewsRepository {
    pool: PgPool,
}

impl ReviewsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserted by work item — a verification item's completion replaces
    /// any prior review for the same execution item.
    pub async fn upsert(
        &self,
        work_item_id: Uuid,
        spec_alignment: JsonValue,
        code_quality: JsonValue,
        overall_summary: Option<&str>,
    ) -> Result<PrReview, sqlx::Error> {
        sqlx::query_as::<_, PrReview>(
            r#"
            INSERT INTO pr_reviews (work_item_id, spec_alignment, code_quality, overall_summary)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (work_item_id) DO UPDATE SET
                spec_alignment = EXCLUDED.spec_alignment,
                code_quality = EXCLUDED.code_quality,
                overall_summary = EXCLUDED.overall_summary
            RETURNING *
            "#,
        )
        .bind(work_item_id)
        .bind(spec_alignment)
        .bind(code_quality)
        .bind(overall_summary)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get(&self, work_item_id: Uuid) -> Result<Option<PrReview>, sqlx::Error> {
        sqlx::query_as::<_, PrReview>("SELECT * FROM pr_reviews WHERE work_item_id = $1")
            .bind(work_item_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Backs `GET /api/reviews` (§6.3).
    pub async fn list_all(&self) -> Result<Vec<PrReview>, sqlx::Error> {
        sqlx::query_as::<_, PrReview>("SELECT * FROM pr_reviews")
            .fetch_all(&self.pool)
            .await
    }
}
