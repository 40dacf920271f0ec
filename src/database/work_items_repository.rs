//! Work item persistence — the queue's source of truth.
//!
//! `claim_next` is the one query in this crate where correctness under
//! concurrency actually lives: `SELECT ... FOR UPDATE SKIP LOCKED` lets N
//! concurrent dispatcher loops each get a distinct row without blocking on
//! each other (§4.1 claim ordering, §5 "shared resources and locking
//! discipline", I-4/I-7 in §8).

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{Priority, WorkItem, WorkItemStatus, WorkItemType};

pub fn item_type_str(t: WorkItemType) -> &'static str {
    match t {
        WorkItemType::Execution => "execution",
        WorkItemType::Verification => "verification",
    }
}

pub fn status_str(s: WorkItemStatus) -> &'static str {
    match s {
        WorkItemStatus::Generating => "generating",
        WorkItemStatus::Queued => "queued",
        WorkItemStatus::Assigned => "assigned",
        WorkItemStatus::InProgress => "in_progress",
        WorkItemStatus::Completed => "completed",
        WorkItemStatus::Failed => "failed",
        WorkItemStatus::Cancelled => "cancelled",
    }
}

pub fn priority_str(p: Priority) -> &'static str {
    match p {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}

/// Fields accepted at submission time (§6.1).
///
/// `id` is generated by the caller, not here, so that callers needing the
/// id before the row exists (e.g. to derive the default `whim/<id[:8]>`
/// branch) can do so without a round trip.
pub struct NewWorkItem {
    pub id: Uuid,
    pub repo: String,
    pub item_type: WorkItemType,
    pub status: WorkItemStatus,
    pub priority: Priority,
    pub spec: Option<String>,
    pub description: Option<String>,
    pub branch: Option<String>,
    pub max_iterations: i32,
    pub parent_work_item_id: Option<Uuid>,
    pub pr_number: Option<i64>,
    pub source: Option<String>,
    pub source_ref: Option<String>,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub total: i64,
    pub by_status: Vec<(String, i64)>,
    pub by_priority: Vec<(String, i64)>,
}

#[derive(Clone)]
pub struct WorkItemsRepository {
    pool: PgPool,
}

impl WorkItemsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, item: NewWorkItem) -> Result<WorkItem, sqlx::Error> {
        let id = item.id;
        sqlx::query_as::<_, WorkItem>(
            r#"
            INSERT INTO work_items
                (id, repo, item_type, status, priority, spec, description, branch,
                 max_iterations, parent_work_item_id, pr_number, source, source_ref, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&item.repo)
        .bind(item.item_type)
        .bind(item.status)
        .bind(item.priority)
        .bind(&item.spec)
        .bind(&item.description)
        .bind(&item.branch)
        .bind(item.max_iterations)
        .bind(item.parent_work_item_id)
        .bind(item.pr_number)
        .bind(&item.source)
        .bind(&item.source_ref)
        .bind(&item.metadata)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<WorkItem>, sqlx::Error> {
        sqlx::query_as::<_, WorkItem>("SELECT * FROM work_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Atomic claim: §4.1 ordering, exact.
    pub async fn claim_next(
        &self,
        type_filter: Option<WorkItemType>,
    ) -> Result<Option<WorkItem>, sqlx::Error> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;

        let filter_str = type_filter.map(item_type_str);
        let candidate: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM work_items
            WHERE status = 'queued'
              AND (next_retry_at IS NULL OR next_retry_at <= now())
              AND ($1::text IS NULL OR item_type = $1)
            ORDER BY
              CASE WHEN $1::text IS NULL AND item_type = 'verification' THEN 1 ELSE 0 END,
              CASE priority
                WHEN 'critical' THEN 3
                WHEN 'high' THEN 2
                WHEN 'medium' THEN 1
                ELSE 0
              END DESC,
              created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(filter_str)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let item = sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items SET status = 'assigned', updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(item))
    }

    /// §4.1/§5 `cancel`: `{queued, assigned} -> cancelled` synchronously;
    /// `generating -> cancelled` too (the spec-gen manager separately aborts
    /// the child process and scratch directory); `in_progress -> cancelled`
    /// is also allowed per §5's "cancelling an assigned/in_progress item"
    /// semantics — the running worker learns of it on its next heartbeat
    /// (see `WorkersRepository::heartbeat`'s returned item status) and is
    /// expected to terminate, with the staleness sweeper as a backstop if
    /// it doesn't. Returns whether the transition occurred (I-3: terminal
    /// items are untouched).
    pub async fn cancel(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE work_items SET status = 'cancelled', updated_at = now()
            WHERE id = $1 AND status IN ('queued', 'assigned', 'generating', 'in_progress')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_active(
        &self,
        type_filter: Option<WorkItemType>,
    ) -> Result<Vec<WorkItem>, sqlx::Error> {
        let filter_str = type_filter.map(item_type_str);
        sqlx::query_as::<_, WorkItem>(
            r#"
            SELECT * FROM work_items
            WHERE status NOT IN ('completed', 'failed', 'cancelled')
              AND ($1::text IS NULL OR item_type = $1)
            ORDER BY
              CASE WHEN $1::text IS NULL AND item_type = 'verification' THEN 1 ELSE 0 END,
              CASE priority
                WHEN 'critical' THEN 3
                WHEN 'high' THEN 2
                WHEN 'medium' THEN 1
                ELSE 0
              END DESC,
              created_at ASC
            "#,
        )
        .bind(filter_str)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn stats(&self) -> Result<QueueStats, sqlx::Error> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM work_items")
            .fetch_one(&self.pool)
            .await?;

        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM work_items GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let by_priority: Vec<(String, i64)> =
            sqlx::query_as("SELECT priority, COUNT(*) FROM work_items GROUP BY priority")
                .fetch_all(&self.pool)
                .await?;

        Ok(QueueStats {
            total: total.0,
            by_status,
            by_priority,
        })
    }

    /// §4.2 step 4: `generating -> queued` with spec/branch populated.
    pub async fn complete_generation(
        &self,
        id: Uuid,
        spec: &str,
        branch: &str,
    ) -> Result<Option<WorkItem>, sqlx::Error> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items
            SET spec = $2, branch = $3, status = 'queued', updated_at = now()
            WHERE id = $1 AND status = 'generating'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(spec)
        .bind(branch)
        .fetch_optional(&self.pool)
        .await
    }

    /// §4.2 step 5 exhaustion, and terminal-class failures generally.
    pub async fn fail(&self, id: Uuid, error: &str) -> Result<Option<WorkItem>, sqlx::Error> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items
            SET status = 'failed', error = $2, updated_at = now(), completed_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
    }

    /// §4.5 transient-failure retry: bump `retry_count`, requeue with
    /// `next_retry_at`.
    pub async fn retry_later(
        &self,
        id: Uuid,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> Result<Option<WorkItem>, sqlx::Error> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items
            SET status = 'queued', retry_count = $2, next_retry_at = $3,
                error = $4, worker_id = NULL, updated_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
    }

    /// §4.3 `register`: `assigned/queued -> in_progress`, binds `worker_id`.
    pub async fn mark_in_progress(
        &self,
        id: Uuid,
        worker_id: Uuid,
    ) -> Result<Option<WorkItem>, sqlx::Error> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items
            SET status = 'in_progress', worker_id = $2, updated_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// §4.3 `complete`: terminal completion, optionally with PR info.
    pub async fn complete(
        &self,
        id: Uuid,
        pr_number: Option<i64>,
        pr_url: Option<&str>,
    ) -> Result<Option<WorkItem>, sqlx::Error> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items
            SET status = 'completed', pr_number = COALESCE($2, pr_number),
                pr_url = COALESCE($3, pr_url), completed_at = now(), updated_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(pr_number)
        .bind(pr_url)
        .fetch_optional(&self.pool)
        .await
    }

    /// §4.7: set the parent execution item's `verificationPassed`. Only
    /// applies to items that don't already carry a verdict, which is what
    /// makes a repeated call idempotent (I-8 round-trip property).
    pub async fn set_verification_passed(
        &self,
        parent_id: Uuid,
        passed: bool,
    ) -> Result<Option<WorkItem>, sqlx::Error> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            UPDATE work_items
            SET verification_passed = $2, updated_at = now()
            WHERE id = $1 AND verification_passed IS NULL
            RETURNING *
            "#,
        )
        .bind(parent_id)
        .bind(passed)
        .fetch_optional(&self.pool)
        .await
    }

    /// §4.3 sweeper repair: `assigned` with no registered worker older than
    /// the grace window reverts to `queued`.
    pub async fn revert_stale_assignment(
        &self,
        id: Uuid,
        retry_count: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'queued', retry_count = $2, next_retry_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'assigned'
            "#,
        )
        .bind(id)
        .bind(retry_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §4.6 daily-budget back-pressure: puts an `assigned` item straight
    /// back to `queued`, immediately visible to the next claim. Unlike
    /// `revert_stale_assignment`, this isn't a failure — the item was
    /// claimed but the dispatcher chose not to spend an iteration on it —
    /// so `retry_count`/`next_retry_at` are left untouched.
    pub async fn release_claim(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE work_items SET status = 'queued', updated_at = now()
            WHERE id = $1 AND status = 'assigned'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Items stuck `assigned` with no worker registered, older than `grace`.
    pub async fn list_stale_assignments(
        &self,
        grace: chrono::Duration,
    ) -> Result<Vec<WorkItem>, sqlx::Error> {
        let cutoff = Utc::now() - grace;
        sqlx::query_as::<_, WorkItem>(
            r#"
            SELECT wi.* FROM work_items wi
            LEFT JOIN workers w ON w.work_item_id = wi.id
            WHERE wi.status = 'assigned'
              AND wi.updated_at < $1
              AND w.id IS NULL
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_ordering_strings_round_trip() {
        for t in [WorkItemType::Execution, WorkItemType::Verification] {
            assert!(!item_type_str(t).is_empty());
        }
        for s in [
            WorkItemStatus::Generating,
            WorkItemStatus::Queued,
            WorkItemStatus::Assigned,
            WorkItemStatus::InProgress,
            WorkItemStatus::Completed,
            WorkItemStatus::Failed,
            WorkItemStatus::Cancelled,
        ] {
            assert!(!status_str(s).is_empty());
        }
    }

    #[test]
    fn priority_rank_matches_ord() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }
}
