//! File-Lock Service (§4.4): at-most-one concurrent writer per file path
//! within a repo.

use uuid::Uuid;

use crate::database::FileLocksRepository;
use crate::error::Result;

/// Outcome of an `acquire` call (§6.2 `/api/worker/{id}/lock`).
#[derive(Debug, Clone)]
pub struct AcquireResult {
    pub acquired: bool,
    pub conflicting_worker: Option<Uuid>,
}

#[derive(Clone)]
pub struct FileLockService {
    repo: FileLocksRepository,
}

impl FileLockService {
    pub fn new(repo: FileLocksRepository) -> Self {
        Self { repo }
    }

    /// All-or-nothing over `paths` (I-5). Re-acquiring a path already held
    /// by `worker_id` is a no-op success (idempotent re-acquire, I-6).
    pub async fn acquire(
        &self,
        repo: &str,
        worker_id: Uuid,
        paths: &[String],
    ) -> Result<AcquireResult> {
        if paths.is_empty() {
            return Ok(AcquireResult {
                acquired: true,
                conflicting_worker: None,
            });
        }

        match self.repo.acquire_all(repo, worker_id, paths).await? {
            Ok(_locks) => Ok(AcquireResult {
                acquired: true,
                conflicting_worker: None,
            }),
            Err(conflict) => Ok(AcquireResult {
                acquired: false,
                conflicting_worker: Some(conflict.holder_worker_id),
            }),
        }
    }

    pub async fn release(&self, repo: &str, worker_id: Uuid, paths: &[String]) -> Result<()> {
        self.repo.release(repo, worker_id, paths).await?;
        Ok(())
    }

    /// §4.4 `releaseAllOf`: invoked on any terminal worker transition (I-6).
    pub async fn release_all_of(&self, worker_id: Uuid) -> Result<u64> {
        Ok(self.repo.release_all_of(worker_id).await?)
    }
}
