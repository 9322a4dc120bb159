//! In-crate fakes shared by service unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AccountLicense, AlertData, VerificationKind};
use crate::domain::ports::{VerificationManager, WorkflowNotification};

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

/// Manager fake that records every side-effecting call.
#[derive(Default)]
pub struct RecordingManager {
    calls: Mutex<Vec<ManagerCall>>,
    features: Mutex<HashSet<String>>,
    license: Mutex<Option<AccountLicense>>,
    pub user_feedback: AtomicBool,
    pub state_invalid: AtomicBool,
    pub fail_collection: AtomicBool,
}

impl RecordingManager {
    pub fn calls(&self) -> Vec<ManagerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn enable_feature(&self, feature: &str) {
        self.features.lock().unwrap().insert(feature.to_string());
    }

    pub fn set_license(&self, license: AccountLicense) {
        *self.license.lock().unwrap() = Some(license);
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

    fn record(&self, call: ManagerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl VerificationManager for RecordingManager {
    async fn trigger_data_collection(
        &self,
        config_id: &str,
        _kind: VerificationKind,
        _state_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<bool> {
        if self.fail_collection.load(Ordering::SeqCst) {
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
