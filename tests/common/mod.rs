//! Common test utilities for integration tests
//!
//! Provides a fake manager that records every side-effecting call, and a
//! harness wiring the scheduler to an in-memory SQLite store and a manual
//! clock.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use vigil::adapters::sqlite::{
    create_migrated_test_pool, SqliteAnalysisContextRepository, SqliteAnalysisRecordRepository,
    SqliteAnalysisTaskRepository, SqliteCollectionTaskRepository, SqliteCvConfigurationRepository,
    SqliteLockRepository, SqliteLogRecordRepository,
};
use vigil::domain::errors::{DomainError, DomainResult};
use vigil::domain::models::{
    AccountLicense, AlertData, AnalysisTask, MonitoredConfiguration, SchedulerConfig, VerificationKind,
};
use vigil::domain::ports::{
    AnalysisTaskFilters, AnalysisTaskRepository, CvConfigurationRepository, ManualClock, VerificationManager,
    WorkflowNotification,
};
use vigil::services::{ContinuousVerificationService, TaskUrlBuilder, VerificationRepositories};

/// Minute the harness clock starts at. A multiple of 15.
pub const NOW: i64 = 29_000_010;

pub const ACCOUNT: &str = "acct-1";

#[derive(Debug, Clone, PartialEq)]
pub enum ManagerCall {
    TriggerCollection {
        config_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    TriggerWorkflowCollection {
        context_id: String,
        start_minute: i64,
    },
    CollectCvData(Uuid),
    OpenAlert(AlertData),
    CloseAlert(AlertData),
    NotifyWorkflow(WorkflowNotification),
}

/// Manager fake with switchable failure modes.
#[derive(Default)]
pub struct FakeManager {
    calls: Mutex<Vec<ManagerCall>>,
    features: Mutex<HashSet<String>>,
    license: Mutex<Option<AccountLicense>>,
    failing_configs: Mutex<HashSet<String>>,
    pub user_feedback: AtomicBool,
    pub state_invalid: AtomicBool,
    pub fail_collection: AtomicBool,
}

impl FakeManager {
    pub fn calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn enable_feature(&self, feature: &str) {
        self.features.lock().unwrap().insert(feature.to_string());
    }

    pub fn set_license(&self, license: AccountLicense) {
        *self.license.lock().unwrap() = Some(license);
    }

    /// Make collection requests for one configuration fail.
    pub fn fail_collection_for(&self, config_id: &str) {
        self.failing_configs.lock().unwrap().insert(config_id.to_string());
    }

    pub fn set_user_feedback(&self, value: bool) {
        self.user_feedback.store(value, Ordering::SeqCst);
    }

    pub fn collections(&self) -> Vec<(String, DateTime<Utc>, DateTime<Utc>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ManagerCall::TriggerCollection { config_id, start, end } => Some((config_id, start, end)),
                _ => None,
            })
            .collect()
    }

    pub fn opened_alerts(&self) -> Vec<AlertData> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ManagerCall::OpenAlert(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<WorkflowNotification> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ManagerCall::NotifyWorkflow(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ManagerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VerificationManager for FakeManager {
    async fn trigger_data_collection(
        &self,
        config_id: &str,
        _kind: VerificationKind,
        _state_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<bool> {
        if self.fail_collection.load(Ordering::SeqCst) || self.failing_configs.lock().unwrap().contains(config_id) {
            return Err(DomainError::ManagerError("collector unavailable".into()));
        }
        self.record(ManagerCall::TriggerCollection {
            config_id: config_id.to_string(),
            start,
            end,
        });
        Ok(true)
    }

    async fn trigger_workflow_data_collection(&self, context_id: &str, start_minute: i64) -> DomainResult<bool> {
        if self.fail_collection.load(Ordering::SeqCst) {
            return Err(DomainError::ManagerError("collector unavailable".into()));
        }
        self.record(ManagerCall::TriggerWorkflowCollection {
            context_id: context_id.to_string(),
            start_minute,
        });
        Ok(true)
    }

    async fn collect_cv_data(&self, collection_task_id: Uuid, _payload: &serde_json::Value) -> DomainResult<bool> {
        self.record(ManagerCall::CollectCvData(collection_task_id));
        Ok(true)
    }

    async fn open_alert(&self, _config_id: &str, alert: &AlertData) -> DomainResult<()> {
        self.record(ManagerCall::OpenAlert(alert.clone()));
        Ok(())
    }

    async fn close_alert(&self, _config_id: &str, alert: &AlertData) -> DomainResult<()> {
        self.record(ManagerCall::CloseAlert(alert.clone()));
        Ok(())
    }

    async fn notify_workflow(&self, notification: &WorkflowNotification) -> DomainResult<()> {
        self.record(ManagerCall::NotifyWorkflow(notification.clone()));
        Ok(())
    }

    async fn is_state_valid(&self, _app_id: &str, _state_execution_id: &str) -> DomainResult<bool> {
        Ok(!self.state_invalid.load(Ordering::SeqCst))
    }

    async fn is_feature_enabled(&self, feature: &str, _account_id: &str) -> DomainResult<bool> {
        Ok(self.features.lock().unwrap().contains(feature))
    }

    async fn account_license(&self, _account_id: &str) -> DomainResult<Option<AccountLicense>> {
        Ok(*self.license.lock().unwrap())
    }

    async fn has_user_feedback(&self, _config_id: &str) -> DomainResult<bool> {
        Ok(self.user_feedback.load(Ordering::SeqCst))
    }
}

/// Scheduler wired to an in-memory store, a fake manager and a manual clock.
pub struct Harness {
    pub service: ContinuousVerificationService,
    pub manager: Arc<FakeManager>,
    pub clock: ManualClock,
    pub configs: Arc<SqliteCvConfigurationRepository>,
    pub contexts: Arc<SqliteAnalysisContextRepository>,
    pub logs: Arc<SqliteLogRecordRepository>,
    pub records: Arc<SqliteAnalysisRecordRepository>,
    pub tasks: Arc<SqliteAnalysisTaskRepository>,
    pub collection_tasks: Arc<SqliteCollectionTaskRepository>,
    pub locks: Arc<SqliteLockRepository>,
}

impl Harness {
    pub async fn add_config(&self, config: &MonitoredConfiguration) {
        self.configs.upsert(config).await.expect("Failed to store configuration");
    }

    /// Every analysis task in the store, oldest first.
    pub async fn all_tasks(&self) -> Vec<AnalysisTask> {
        let mut tasks = self
            .tasks
            .list(AnalysisTaskFilters {
                limit: Some(1000),
                ..Default::default()
            })
            .await
            .expect("Failed to list tasks");
        tasks.sort_by_key(|t| (t.created_at, t.analysis_minute, t.attempt));
        tasks
    }

    pub async fn tasks_for_scope(&self, scope_key: &str) -> Vec<AnalysisTask> {
        self.all_tasks()
            .await
            .into_iter()
            .filter(|t| t.scope_key == scope_key)
            .collect()
    }
}

/// Build a harness whose clock reads the start of `minute`.
pub async fn harness_at(minute: i64) -> Harness {
    let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
    let configs = Arc::new(SqliteCvConfigurationRepository::new(pool.clone()));
    let contexts = Arc::new(SqliteAnalysisContextRepository::new(pool.clone()));
    let logs = Arc::new(SqliteLogRecordRepository::new(pool.clone()));
    let records = Arc::new(SqliteAnalysisRecordRepository::new(pool.clone()));
    let tasks = Arc::new(SqliteAnalysisTaskRepository::new(pool.clone()));
    let collection_tasks = Arc::new(SqliteCollectionTaskRepository::new(pool.clone()));
    let locks = Arc::new(SqliteLockRepository::new(pool));

    let manager = Arc::new(FakeManager::default());
    let clock = ManualClock::at_minute(minute);
    let repos = VerificationRepositories {
        configs: configs.clone(),
        contexts: contexts.clone(),
        logs: logs.clone(),
        records: records.clone(),
        tasks: tasks.clone(),
        collection_tasks: collection_tasks.clone(),
        locks: locks.clone(),
    };
    let service = ContinuousVerificationService::new(
        repos,
        manager.clone(),
        Arc::new(clock.clone()),
        SchedulerConfig::default(),
        TaskUrlBuilder::new("http://manager.test/api").expect("valid base url"),
    );

    Harness {
        service,
        manager,
        clock,
        configs,
        contexts,
        logs,
        records,
        tasks,
        collection_tasks,
        locks,
    }
}

pub async fn harness() -> Harness {
    harness_at(NOW).await
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
