use crate::domain::errors::DomainResult;
use crate::domain::models::{CollectionStatus, CollectionTask};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository port for the task-based data collection queue
#[async_trait]
pub trait CollectionTaskRepository: Send + Sync {
    async fn insert(&self, task: &CollectionTask) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<CollectionTask>>;

    /// Atomically claim the oldest QUEUED task for an account and mark it RUNNING
    async fn claim_next(&self, account_id: &str, now: DateTime<Utc>) -> DomainResult<Option<CollectionTask>>;

    async fn update_status(
        &self,
        id: Uuid,
        status: CollectionStatus,
        exception: Option<&str>,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// Mark RUNNING tasks last updated before `cutoff` as TIMEOUT
    async fn expire_running_before(&self, account_id: &str, cutoff: DateTime<Utc>) -> DomainResult<u64>;

    /// Requeue FAILED or TIMEOUT tasks below `max_retries`, bumping their retry count
    async fn requeue_retryable(&self, account_id: &str, max_retries: u32, at: DateTime<Utc>) -> DomainResult<u64>;
}
