use crate::domain::errors::DomainResult;
use crate::domain::models::{MonitoredConfiguration, VerificationKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository port for monitored configurations
#[async_trait]
pub trait CvConfigurationRepository: Send + Sync {
    /// Insert or replace a configuration
    async fn upsert(&self, config: &MonitoredConfiguration) -> DomainResult<()>;

    /// Get a configuration by ID
    async fn get(&self, id: &str) -> DomainResult<Option<MonitoredConfiguration>>;

    /// Enabled configurations for an account, optionally narrowed to one kind
    async fn list_enabled(
        &self,
        account_id: &str,
        kind: Option<VerificationKind>,
    ) -> DomainResult<Vec<MonitoredConfiguration>>;

    /// All configurations, for operator inspection
    async fn list_all(&self) -> DomainResult<Vec<MonitoredConfiguration>>;

    /// Flip the enabled flag and stamp `updated_at`
    async fn set_enabled(&self, id: &str, enabled: bool, at: DateTime<Utc>) -> DomainResult<()>;
}
