//! Continuous verification orchestrator.
//!
//! A thin coordinator over the scheduling subsystems. Every trigger takes an
//! account id, walks that account's enabled configurations and isolates
//! failures per configuration:
//!
//! - **collection**: metric and log data collection windows
//! - **time_series**: time-series analysis tasks and their results
//! - **log_clustering**: L1 and L2 clustering tasks
//! - **log_analysis**: log-ML analysis tasks, results and workflow completion
//! - **feedback**: feedback analysis tasks and results
//! - **workflow**: per-minute collection for workflow contexts
//! - **maintenance**: collection task queue upkeep and stuck lock cleanup

mod collection;
mod feedback;
mod log_analysis;
mod log_clustering;
mod maintenance;
mod time_series;
mod workflow;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::domain::models::{
    should_perform_service_guard_tasks, MonitoredConfiguration, SchedulerConfig, VerificationKind,
};
use crate::domain::ports::{
    AnalysisContextRepository, AnalysisRecordRepository, AnalysisTaskRepository, Clock, CollectionTaskRepository,
    CvConfigurationRepository, LockRepository, LogRecordRepository, VerificationManager,
};
use crate::services::alert_service::AlertService;
use crate::services::clustering_service::ClusteringService;
use crate::services::collection_scheduler::CollectionScheduler;
use crate::services::collection_task_service::CollectionTaskService;
use crate::services::learning_engine_service::LearningEngineService;
use crate::services::task_urls::TaskUrlBuilder;

/// Scheduler entry points, one call per account per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    MetricCollection,
    LogCollection,
    TimeSeriesAnalysis,
    LogL1Clustering,
    LogL2Clustering,
    LogAnalysis,
    FeedbackAnalysis,
    ProcessNextTasks,
    ExpireLongRunningTasks,
    RetryTasks,
    CleanupStuckLocks,
}

impl TriggerKind {
    /// Every entry point, in the order a tick runs them.
    pub const ALL: [TriggerKind; 11] = [
        Self::MetricCollection,
        Self::LogCollection,
        Self::ProcessNextTasks,
        Self::TimeSeriesAnalysis,
        Self::LogL1Clustering,
        Self::LogL2Clustering,
        Self::LogAnalysis,
        Self::FeedbackAnalysis,
        Self::ExpireLongRunningTasks,
        Self::RetryTasks,
        Self::CleanupStuckLocks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MetricCollection => "metric-collection",
            Self::LogCollection => "log-collection",
            Self::TimeSeriesAnalysis => "time-series-analysis",
            Self::LogL1Clustering => "log-l1-clustering",
            Self::LogL2Clustering => "log-l2-clustering",
            Self::LogAnalysis => "log-analysis",
            Self::FeedbackAnalysis => "feedback-analysis",
            Self::ProcessNextTasks => "process-next-tasks",
            Self::ExpireLongRunningTasks => "expire-long-running-tasks",
            Self::RetryTasks => "retry-tasks",
            Self::CleanupStuckLocks => "cleanup-stuck-locks",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown trigger: {s}"))
    }
}

/// Repositories the orchestrator reads and writes.
#[derive(Clone)]
pub struct VerificationRepositories {
    pub configs: Arc<dyn CvConfigurationRepository>,
    pub contexts: Arc<dyn AnalysisContextRepository>,
    pub logs: Arc<dyn LogRecordRepository>,
    pub records: Arc<dyn AnalysisRecordRepository>,
    pub tasks: Arc<dyn AnalysisTaskRepository>,
    pub collection_tasks: Arc<dyn CollectionTaskRepository>,
    pub locks: Arc<dyn LockRepository>,
}

/// The continuous verification scheduler.
pub struct ContinuousVerificationService {
    // Repository layer
    pub(super) configs: Arc<dyn CvConfigurationRepository>,
    pub(super) contexts: Arc<dyn AnalysisContextRepository>,
    pub(super) logs: Arc<dyn LogRecordRepository>,
    pub(super) records: Arc<dyn AnalysisRecordRepository>,
    pub(super) locks: Arc<dyn LockRepository>,
    pub(super) manager: Arc<dyn VerificationManager>,
    pub(super) clock: Arc<dyn Clock>,

    // Configuration
    pub(super) settings: SchedulerConfig,
    pub(super) urls: TaskUrlBuilder,

    // Composed services
    pub(super) scheduler: CollectionScheduler,
    pub(super) learning: LearningEngineService,
    pub(super) clustering: ClusteringService,
    pub(super) alerts: AlertService,
    pub(super) collection_tasks: CollectionTaskService,
}

impl ContinuousVerificationService {
    pub fn new(
        repos: VerificationRepositories,
        manager: Arc<dyn VerificationManager>,
        clock: Arc<dyn Clock>,
        settings: SchedulerConfig,
        urls: TaskUrlBuilder,
    ) -> Self {
        let scheduler = CollectionScheduler::new(
            repos.configs.clone(),
            repos.tasks.clone(),
            clock.clone(),
            settings.idle_disable_days,
        );
        let learning = LearningEngineService::new(
            repos.tasks.clone(),
            repos.contexts.clone(),
            manager.clone(),
            clock.clone(),
            seconds(settings.task_visibility_timeout_secs),
            settings.max_task_retries,
        );
        let clustering = ClusteringService::new(repos.logs.clone(), repos.tasks.clone(), clock.clone());
        let alerts = AlertService::new(repos.records.clone(), manager.clone(), clock.clone());
        let collection_tasks = CollectionTaskService::new(
            repos.collection_tasks.clone(),
            manager.clone(),
            clock.clone(),
            seconds(settings.collection_task_timeout_secs),
            settings.max_task_retries,
        );
        Self {
            configs: repos.configs,
            contexts: repos.contexts,
            logs: repos.logs,
            records: repos.records,
            locks: repos.locks,
            manager,
            clock,
            settings,
            urls,
            scheduler,
            learning,
            clustering,
            alerts,
            collection_tasks,
        }
    }

    /// Queue operations used by analysis workers.
    pub fn learning_engine(&self) -> &LearningEngineService {
        &self.learning
    }

    /// Clustering state machine used by collectors and clustering workers.
    pub fn clustering(&self) -> &ClusteringService {
        &self.clustering
    }

    pub fn settings(&self) -> &SchedulerConfig {
        &self.settings
    }

    /// Run one entry point for an account. Returns how many units of work
    /// (tasks, collections, rows) it produced.
    #[instrument(skip(self), fields(trigger = %kind), err)]
    pub async fn run_trigger(&self, kind: TriggerKind, account_id: &str) -> Result<u64> {
        let produced = match kind {
            TriggerKind::MetricCollection => self.trigger_metric_data_collection(account_id).await? as u64,
            TriggerKind::LogCollection => self.trigger_log_data_collection(account_id).await? as u64,
            TriggerKind::TimeSeriesAnalysis => self.trigger_time_series_analysis(account_id).await? as u64,
            TriggerKind::LogL1Clustering => self.trigger_log_l1_clustering(account_id).await? as u64,
            TriggerKind::LogL2Clustering => self.trigger_log_l2_clustering(account_id).await? as u64,
            TriggerKind::LogAnalysis => self.trigger_log_data_analysis(account_id).await? as u64,
            TriggerKind::FeedbackAnalysis => self.trigger_feedback_analysis(account_id).await? as u64,
            TriggerKind::ProcessNextTasks => self.process_next_tasks(account_id).await? as u64,
            TriggerKind::ExpireLongRunningTasks => self.expire_long_running_tasks(account_id).await?,
            TriggerKind::RetryTasks => self.retry_tasks(account_id).await?,
            TriggerKind::CleanupStuckLocks => self.cleanup_stuck_locks().await?,
        };
        Ok(produced)
    }

    /// Run every entry point for an account under the account's tick lock.
    /// Returns false when another scheduler holds the lock.
    #[instrument(skip(self), err)]
    pub async fn run_tick(&self, account_id: &str) -> Result<bool> {
        let lock_id = format!("cv-tick-{account_id}");
        let holder = Uuid::new_v4().to_string();
        let acquired = self
            .locks
            .acquire(&lock_id, &holder, self.clock.now())
            .await
            .context("Failed to acquire tick lock")?;
        if !acquired {
            debug!("tick lock held elsewhere, skipping account");
            return Ok(false);
        }

        for kind in TriggerKind::ALL {
            if let Err(e) = self.run_trigger(kind, account_id).await {
                error!(trigger = %kind, error = ?e, "trigger failed");
            }
        }

        self.locks
            .release(&lock_id)
            .await
            .context("Failed to release tick lock")?;
        Ok(true)
    }

    /// Enabled configurations of `kind` for a licensed account. Unlicensed
    /// tiers get no service guard work at all.
    pub(super) async fn service_guard_configs(
        &self,
        account_id: &str,
        kind: VerificationKind,
    ) -> Result<Vec<MonitoredConfiguration>> {
        let license = self
            .manager
            .account_license(account_id)
            .await
            .context("Failed to load account license")?;
        if !should_perform_service_guard_tasks(license.as_ref()) {
            info!(account_id, "account not licensed for service guard, skipping");
            return Ok(Vec::new());
        }
        self.configs
            .list_enabled(account_id, Some(kind))
            .await
            .context("Failed to list enabled configurations")
    }

    /// Look up a configuration a worker result refers to.
    pub(super) async fn require_config(&self, config_id: &str) -> Result<MonitoredConfiguration> {
        self.configs
            .get(config_id)
            .await
            .context("Failed to load configuration")?
            .ok_or_else(|| crate::domain::errors::DomainError::ConfigurationNotFound(config_id.to_string()).into())
    }
}

fn seconds(secs: u64) -> Duration {
    // Clamp to a century; chrono panics past its range.
    const MAX_SECS: i64 = 100 * 365 * 24 * 60 * 60;
    Duration::seconds(i64::try_from(secs).unwrap_or(MAX_SECS).min(MAX_SECS))
}
