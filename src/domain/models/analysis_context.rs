//! Workflow-scoped verification context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VerificationKind;

/// A one-shot (non 24x7) verification run tied to a single workflow state
/// execution. Scheduling follows the same rules as a monitored
/// configuration, without baseline-window semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub id: String,
    pub account_id: String,
    pub app_id: String,
    pub state_execution_id: String,
    pub correlation_id: String,
    pub analysis_type: VerificationKind,
    pub state_type: String,
    #[serde(default)]
    pub query: Option<String>,
    pub start_data_collection_minute: i64,
    /// Length of the verification in minutes.
    pub time_duration: i64,
    #[serde(default)]
    pub per_min_collection_finished: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AnalysisContext {
    pub fn new(
        id: impl Into<String>,
        state_execution_id: impl Into<String>,
        analysis_type: VerificationKind,
        start_data_collection_minute: i64,
        time_duration: i64,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: String::new(),
            app_id: String::new(),
            state_execution_id: state_execution_id.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            analysis_type,
            state_type: String::new(),
            query: None,
            start_data_collection_minute,
            time_duration,
            per_min_collection_finished: false,
            created_at: Utc::now(),
        }
    }
}

/// Outcome reported back to the workflow that owns a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowNotificationStatus {
    Success,
    Error,
}
