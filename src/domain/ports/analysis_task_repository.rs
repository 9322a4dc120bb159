use crate::domain::errors::DomainResult;
use crate::domain::models::{AnalysisTask, AnalysisType, ClaimFilter, ClusterLevel, ExecutionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Filters for listing analysis tasks
#[derive(Default, Debug, Clone)]
pub struct AnalysisTaskFilters {
    pub status: Option<ExecutionStatus>,
    pub config_id: Option<String>,
    pub analysis_type: Option<AnalysisType>,
    pub limit: Option<i64>,
}

/// Identity of the live (non-forked) task covering one analysis window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWindow<'a> {
    pub scope_key: &'a str,
    pub analysis_minute: i64,
    pub analysis_type: AnalysisType,
    pub cluster_level: Option<ClusterLevel>,
}

/// Repository port for the analysis task queue.
///
/// `enqueue_if_absent` and `claim_next` must be atomic with respect to
/// other schedulers and workers sharing the same store.
#[async_trait]
pub trait AnalysisTaskRepository: Send + Sync {
    /// Insert `task` unless a QUEUED, RUNNING or SUCCESS task with the same
    /// (scope key, type, level, version, tag) already covers its window.
    /// A SUCCESS task for an earlier minute does not block.
    async fn enqueue_if_absent(&self, task: &AnalysisTask) -> DomainResult<bool>;

    /// Fail RUNNING tasks whose lease expired after their last allowed
    /// attempt. Returns the tasks just failed.
    async fn fail_exhausted_leases(
        &self,
        visibility_timeout: Duration,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<AnalysisTask>>;

    /// Claim the oldest runnable task: QUEUED, or RUNNING with a lease older
    /// than `visibility_timeout`, and below `max_retries` attempts. The claim
    /// sets RUNNING, increments retry and stamps `updated_at = now`.
    async fn claim_next(
        &self,
        filter: &ClaimFilter,
        visibility_timeout: Duration,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<AnalysisTask>>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<AnalysisTask>>;

    async fn list(&self, filters: AnalysisTaskFilters) -> DomainResult<Vec<AnalysisTask>>;

    async fn update_status(&self, id: Uuid, status: ExecutionStatus, at: DateTime<Utc>) -> DomainResult<()>;

    /// Mark the live task for a window SUCCESS. Returns rows updated.
    async fn mark_window_completed(&self, window: &TaskWindow<'_>, at: DateTime<Utc>) -> DomainResult<u64>;

    /// Fork FAILED tasks, and RUNNING tasks that retried at least once and
    /// whose lease is still inside `visibility_timeout`, for a scope and
    /// minute: each gets the next attempt number and status FAILED.
    async fn fork_failed(
        &self,
        scope_key: &str,
        analysis_minute: i64,
        visibility_timeout: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<u64>;

    /// Most recent fork for a scope, minute and type
    async fn latest_fork(
        &self,
        scope_key: &str,
        analysis_minute: i64,
        analysis_type: AnalysisType,
    ) -> DomainResult<Option<AnalysisTask>>;

    /// Whether a QUEUED or RUNNING task exists for a configuration,
    /// optionally only among windows at or after `since_minute`
    async fn is_running_or_queued(&self, config_id: &str, since_minute: Option<i64>) -> DomainResult<bool>;

    /// Count tasks in a status for a scope key, across attempts
    async fn count_for_scope(&self, scope_key: &str, status: Option<ExecutionStatus>) -> DomainResult<i64>;
}
