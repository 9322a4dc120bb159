//! Collection task queue upkeep and lock cleanup.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use super::{seconds, ContinuousVerificationService};

impl ContinuousVerificationService {
    #[instrument(skip(self), err)]
    pub async fn process_next_tasks(&self, account_id: &str) -> Result<usize> {
        self.collection_tasks.process_next_tasks(account_id).await
    }

    #[instrument(skip(self), err)]
    pub async fn expire_long_running_tasks(&self, account_id: &str) -> Result<u64> {
        self.collection_tasks.expire_long_running_tasks(account_id).await
    }

    #[instrument(skip(self), err)]
    pub async fn retry_tasks(&self, account_id: &str) -> Result<u64> {
        self.collection_tasks.retry_tasks(account_id).await
    }

    /// Drop lock records held longer than the configured maximum age.
    #[instrument(skip(self), err)]
    pub async fn cleanup_stuck_locks(&self) -> Result<u64> {
        let max_age = seconds(self.settings.lock_max_age_secs);
        let removed = self
            .locks
            .delete_acquired_before(self.clock.now() - max_age)
            .await
            .context("Failed to clean up stuck locks")?;
        if removed > 0 {
            info!(removed, "removed stuck locks");
        }
        Ok(removed)
    }
}
