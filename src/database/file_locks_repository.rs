//! File-level concurrency interlock (§4.4, §6.5, I-5/I-6).
//!
//! Locks are rows, not session state, so they survive a dispatcher restart —
//! this is why the teacher's Postgres advisory-lock approach
//! (`database/locks.rs`) doesn't fit here and a unique `(repo, path)` index
//! is used instead. Acquisition sorts paths before insertion, the same
//! deadlock-avoidance trick the teacher's lock service uses.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::FileLock;

/// Returned when an all-or-nothing acquisition can't proceed because some
/// requested path is already held by a different worker.
#[derive(Debug, Clone)]
pub struct LockConflict {
    pub path: String,
    pub holder_worker_id: Uuid,
}

#[derive(Clone)]
pub struct FileLocksRepository {
    pool: PgPool,
}

impl FileLocksRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attempts to acquire every path in `paths` for `worker_id`. Either all
    /// paths end up held by `worker_id`, or none do (I-5). Re-acquiring a
    /// path already held by the same worker is a no-op, not a conflict
    /// (idempotent re-acquire, I-6).
    pub async fn acquire_all(
        &self,
        repo: &str,
        worker_id: Uuid,
        paths: &[String],
    ) -> Result<Result<Vec<FileLock>, LockConflict>, sqlx::Error> {
        let mut sorted: Vec<&String> = paths.iter().collect();
        sorted.sort();

        let mut tx = self.pool.begin().await?;

        for path in &sorted {
            let existing: Option<(Uuid,)> = sqlx::query_as(
                "SELECT holder_worker_id FROM file_locks WHERE repo = $1 AND path = $2 FOR UPDATE",
            )
            .bind(repo)
            .bind(path.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((holder,)) = existing {
                if holder != worker_id {
                    tx.rollback().await?;
                    return Ok(Err(LockConflict {
                        path: (*path).clone(),
                        holder_worker_id: holder,
                    }));
                }
            }
        }

        // `DO NOTHING` so a concurrent winner's row is never overwritten
        // (`DO UPDATE` here would let a loser steal the lock out from under
        // the winner after the unique index serializes the two inserts,
        // which is exactly the I-5 violation the `FOR UPDATE` scan above
        // can't catch on a row that didn't exist yet).
        let mut locks = Vec::with_capacity(sorted.len());
        for path in &sorted {
            let inserted = sqlx::query_as::<_, FileLock>(
                r#"
                INSERT INTO file_locks (repo, path, holder_worker_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (repo, path) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(repo)
            .bind(path.as_str())
            .bind(worker_id)
            .fetch_optional(&mut *tx)
            .await?;

            let lock = match inserted {
                Some(lock) => lock,
                None => {
                    // Lost the race: re-read whoever actually holds it now.
                    let holder = sqlx::query_as::<_, FileLock>(
                        "SELECT * FROM file_locks WHERE repo = $1 AND path = $2",
                    )
                    .bind(repo)
                    .bind(path.as_str())
                    .fetch_one(&mut *tx)
                    .await?;

                    if holder.holder_worker_id != worker_id {
                        tx.rollback().await?;
                        return Ok(Err(LockConflict {
                            path: (*path).clone(),
                            holder_worker_id: holder.holder_worker_id,
                        }));
                    }
                    holder
                }
            };
            locks.push(lock);
        }

        tx.commit().await?;
        Ok(Ok(locks))
    }

    /// Releases specific paths held by `worker_id`. Releasing a path not
    /// held by `worker_id` (or not held at all) is a no-op.
    pub async fn release(
        &self,
        repo: &str,
        worker_id: Uuid,
        paths: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "DELETE FROM file_locks WHERE repo = $1 AND holder_worker_id = $2 AND path = ANY($3)",
        )
        .bind(repo)
        .bind(worker_id)
        .bind(paths)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §4.4 `releaseAllOf`: releases every lock held by `worker_id`,
    /// invoked on any terminal worker transition.
    pub async fn release_all_of(&self, worker_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM file_locks WHERE holder_worker_id = $1")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_held_by(&self, worker_id: Uuid) -> Result<Vec<FileLock>, sqlx::Error> {
        sqlx::query_as::<_, FileLock>("SELECT * FROM file_locks WHERE holder_worker_id = $1")
            .bind(worker_id)
            .fetch_all(&self.pool)
            .await
    }
}
