use crate::domain::errors::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Distributed lock records written by external schedulers
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Record a lock. Returns false if `id` is already held.
    async fn acquire(&self, id: &str, holder: &str, at: DateTime<Utc>) -> DomainResult<bool>;

    async fn release(&self, id: &str) -> DomainResult<()>;

    /// Remove locks acquired before `cutoff`. Returns the number removed.
    async fn delete_acquired_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64>;
}
