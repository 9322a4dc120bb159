use crate::domain::errors::DomainResult;
use crate::domain::models::{ClusterLevel, LogRecord, LogScope, MinuteOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository port for clustered log records and heartbeat markers.
///
/// Implementations must enforce uniqueness on
/// (scope, minute, host, level, cluster label).
#[async_trait]
pub trait LogRecordRepository: Send + Sync {
    /// Insert records, skipping any that already exist. Returns the number inserted.
    async fn insert_ignoring_duplicates(&self, records: &[LogRecord]) -> DomainResult<u64>;

    /// Records for a scope and level within an inclusive minute range
    async fn list(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        start_minute: i64,
        end_minute: i64,
        host: Option<&str>,
    ) -> DomainResult<Vec<LogRecord>>;

    /// Distinct hosts with a record at any of `levels` for one minute
    async fn hosts_for_minute(
        &self,
        scope: &LogScope,
        minute: i64,
        levels: &[ClusterLevel],
    ) -> DomainResult<Vec<String>>;

    /// Whether any record at `levels` exists within an inclusive minute range
    async fn any_in_range(
        &self,
        scope: &LogScope,
        start_minute: i64,
        end_minute: i64,
        levels: &[ClusterLevel],
    ) -> DomainResult<bool>;

    /// Earliest or latest minute with a record at `level`
    async fn minute_for_level(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        order: MinuteOrder,
    ) -> DomainResult<Option<i64>>;

    /// Latest minute at any level, heartbeats included
    async fn max_minute(&self, scope: &LogScope) -> DomainResult<Option<i64>>;

    /// When the most recent record for the scope was written
    async fn last_created_at(&self, scope: &LogScope) -> DomainResult<Option<DateTime<Utc>>>;

    /// Earliest or latest minute at `level` restricted to `hosts`
    async fn minute_for_hosts(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        hosts: &[String],
        order: MinuteOrder,
    ) -> DomainResult<Option<i64>>;

    /// Delete records at `level` for one minute, for one host or all hosts
    async fn delete_at_minute(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        minute: i64,
        host: Option<&str>,
    ) -> DomainResult<u64>;

    /// Delete records at `level` with minute <= `max_minute`
    async fn delete_up_to_minute(&self, scope: &LogScope, level: ClusterLevel, max_minute: i64) -> DomainResult<u64>;

    /// Move heartbeats from `from` to `to` for one minute, for one host or all
    /// hosts. A marker already present at `to` wins and the duplicate at
    /// `from` is removed. Returns the number of markers moved.
    async fn bump_heartbeat(
        &self,
        scope: &LogScope,
        minute: i64,
        host: Option<&str>,
        from: ClusterLevel,
        to: ClusterLevel,
    ) -> DomainResult<u64>;

    /// Move heartbeats from `from` to `to` for every minute <= `max_minute`
    async fn bump_heartbeats_up_to(
        &self,
        scope: &LogScope,
        max_minute: i64,
        from: ClusterLevel,
        to: ClusterLevel,
    ) -> DomainResult<u64>;
}
