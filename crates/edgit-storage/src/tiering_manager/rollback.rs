use edgit_core::CoreResult;
use std::sync::Arc;

use super::job::{JobState, MigrationJob};
use crate::backend::TierStorage;

/// Undo helper for job-based migrations.
pub struct MigrationRollback {
    storage: Arc<dyn TierStorage>,
}

impl MigrationRollback {
    pub fn new(storage: Arc<dyn TierStorage>) -> Self {
        Self { storage }
    }

    /// Removes any partial target copy, releases the lock if held and marks
    /// the job rolled back. The source copy is never touched.
    pub async fn rollback(&self, job: &mut MigrationJob) -> CoreResult<()> {
        self.cleanup(job).await?;
        job.finish(JobState::RolledBack);
        Ok(())
    }

    /// Same cleanup as [`rollback`](Self::rollback) without choosing the
    /// terminal state.
    pub(crate) async fn cleanup(&self, job: &mut MigrationJob) -> CoreResult<()> {
        if let Err(e) = self.storage.delete_object(job.target_tier, &job.sha).await {
            tracing::warn!(
                sha = %job.sha,
                tier = %job.target_tier,
                error = %e,
                "Failed to delete partial target copy during rollback"
            );
        }

        if job.lock_acquired {
            self.storage.release_lock(&job.sha).await?;
            job.lock_acquired = false;
        }
        Ok(())
    }
}
