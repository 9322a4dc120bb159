//! Boundary to the manager service that owns data collection, alerting and
//! workflow state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AccountLicense, AlertData, AnalysisContext, VerificationKind, WorkflowNotificationStatus,
};

/// Feature flag that turns off the neural-net feedback pipeline.
pub const DISABLE_LOGML_NEURAL_NET: &str = "DISABLE_LOGML_NEURAL_NET";

/// Notification sent to the workflow owning an analysis context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNotification {
    pub context_id: String,
    pub state_execution_id: String,
    pub correlation_id: String,
    pub status: WorkflowNotificationStatus,
    pub error_msg: Option<String>,
    pub analysis_minute: Option<i64>,
}

impl WorkflowNotification {
    pub fn new(context: &AnalysisContext, status: WorkflowNotificationStatus) -> Self {
        Self {
            context_id: context.id.clone(),
            state_execution_id: context.state_execution_id.clone(),
            correlation_id: context.correlation_id.clone(),
            status,
            error_msg: None,
            analysis_minute: None,
        }
    }

    pub fn with_error(mut self, error_msg: impl Into<String>, analysis_minute: Option<i64>) -> Self {
        self.error_msg = Some(error_msg.into());
        self.analysis_minute = analysis_minute;
        self
    }
}

/// Manager API as seen by the scheduler.
#[async_trait]
pub trait VerificationManager: Send + Sync {
    /// Ask the manager to collect data for a configuration over `[start, end]`
    async fn trigger_data_collection(
        &self,
        config_id: &str,
        kind: VerificationKind,
        state_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Ask the manager to collect the next minute for a workflow context
    async fn trigger_workflow_data_collection(&self, context_id: &str, start_minute: i64) -> DomainResult<bool>;

    /// Hand a claimed collection task to the manager for execution
    async fn collect_cv_data(&self, collection_task_id: Uuid, payload: &serde_json::Value) -> DomainResult<bool>;

    async fn open_alert(&self, config_id: &str, alert: &AlertData) -> DomainResult<()>;

    async fn close_alert(&self, config_id: &str, alert: &AlertData) -> DomainResult<()>;

    async fn notify_workflow(&self, notification: &WorkflowNotification) -> DomainResult<()>;

    /// Whether the workflow state execution is still running
    async fn is_state_valid(&self, app_id: &str, state_execution_id: &str) -> DomainResult<bool>;

    async fn is_feature_enabled(&self, feature: &str, account_id: &str) -> DomainResult<bool>;

    /// License of an account; `None` when the account carries no license
    async fn account_license(&self, account_id: &str) -> DomainResult<Option<AccountLicense>>;

    /// Whether users have left feedback on any log cluster of a configuration
    async fn has_user_feedback(&self, config_id: &str) -> DomainResult<bool>;
}
