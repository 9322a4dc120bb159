//! Analysis task domain model.
//!
//! An analysis task is one unit of work handed to the external analysis
//! engine. Workers claim QUEUED tasks, fetch data from the task's callback
//! URLs and post back to exactly one of the save or failure URLs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ClusterLevel;

/// Hard ceiling on worker attempts before a task fails permanently.
pub const MAX_TASK_RETRIES: u32 = 3;

/// Execution status of an analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Queued,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Queued or running: the window is owned by a live task.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<ExecutionStatus> {
        match self {
            Self::Queued => vec![Self::Running, Self::Success, Self::Failed],
            // Running -> Running is a lease reclaim.
            Self::Running => vec![Self::Running, Self::Queued, Self::Success, Self::Failed],
            Self::Success => vec![],
            Self::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of analysis a task asks the engine to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisType {
    TimeSeries,
    LogMl,
    LogCluster,
    FeedbackAnalysis,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeSeries => "TIME_SERIES",
            Self::LogMl => "LOG_ML",
            Self::LogCluster => "LOG_CLUSTER",
            Self::FeedbackAnalysis => "FEEDBACK_ANALYSIS",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "TIME_SERIES" => Some(Self::TimeSeries),
            "LOG_ML" => Some(Self::LogMl),
            "LOG_CLUSTER" => Some(Self::LogCluster),
            "FEEDBACK_ANALYSIS" | "FEEDBACK" => Some(Self::FeedbackAnalysis),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback URLs a worker uses to fetch input and report results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUrls {
    pub data_fetch: String,
    pub save: String,
    pub failure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// A unit of work for the external analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: Uuid,
    pub account_id: String,
    pub app_id: String,
    pub config_id: Option<String>,
    /// State execution of the owning workflow, for workflow-backed configs.
    pub workflow_execution_id: Option<String>,
    pub scope_key: String,
    /// Zero for the original task; forks of a failed task count up from 1.
    pub attempt: u32,
    pub analysis_minute: i64,
    pub analysis_start_minute: Option<i64>,
    pub analysis_type: AnalysisType,
    pub cluster_level: Option<ClusterLevel>,
    pub status: ExecutionStatus,
    pub retry: u32,
    pub backoff_count: u32,
    pub version: i32,
    pub is_24x7: bool,
    pub tag: Option<String>,
    pub hosts: Vec<String>,
    pub alert_threshold: Option<f64>,
    pub priority: i32,
    pub urls: TaskUrls,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisTask {
    pub fn new(
        account_id: impl Into<String>,
        scope_key: impl Into<String>,
        analysis_type: AnalysisType,
        analysis_minute: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            app_id: String::new(),
            config_id: None,
            workflow_execution_id: None,
            scope_key: scope_key.into(),
            attempt: 0,
            analysis_minute,
            analysis_start_minute: None,
            analysis_type,
            cluster_level: None,
            status: ExecutionStatus::Queued,
            retry: 0,
            backoff_count: 0,
            version: 1,
            is_24x7: true,
            tag: None,
            hosts: Vec::new(),
            alert_threshold: None,
            priority: 0,
            urls: TaskUrls::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_config(mut self, config_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self.app_id = app_id.into();
        self
    }

    pub fn with_workflow_execution(mut self, state_execution_id: impl Into<String>) -> Self {
        self.workflow_execution_id = Some(state_execution_id.into());
        self
    }

    pub fn with_start_minute(mut self, minute: i64) -> Self {
        self.analysis_start_minute = Some(minute);
        self
    }

    pub fn with_cluster_level(mut self, level: ClusterLevel) -> Self {
        self.cluster_level = Some(level);
        self
    }

    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_backoff_count(mut self, backoff_count: u32) -> Self {
        self.backoff_count = backoff_count;
        self
    }

    pub fn with_alert_threshold(mut self, threshold: Option<f64>) -> Self {
        self.alert_threshold = threshold;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_urls(mut self, urls: TaskUrls) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    /// Whether this row is a fork of an earlier failed task.
    pub fn is_fork(&self) -> bool {
        self.attempt > 0
    }
}

/// Failure report posted by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningEngineError {
    pub analysis_minute: i64,
    pub error_msg: String,
}

/// Narrowing applied to an atomic claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimFilter {
    pub is_24x7: Option<bool>,
    /// Empty means any analysis type.
    pub analysis_types: Vec<AnalysisType>,
}

impl ClaimFilter {
    pub fn service_guard(analysis_types: Vec<AnalysisType>) -> Self {
        Self { is_24x7: Some(true), analysis_types }
    }
}

/// Scope keys that group tasks for dedup and failure forking.
pub mod scope_keys {
    pub fn time_series(config_id: &str) -> String {
        format!("CV_24x7_STATE_EXECUTION-{config_id}")
    }

    pub fn cluster_l1(config_id: &str, minute: i64) -> String {
        format!("LOGS_CLUSTER_L1_{config_id}_{minute}")
    }

    pub fn cluster_l2(config_id: &str, minute: i64) -> String {
        format!("LOGS_CLUSTER_L2_{config_id}_{minute}")
    }

    pub fn log_analysis(config_id: &str, minute: i64) -> String {
        format!("LOG_24X7_ANALYSIS_{config_id}_{minute}")
    }

    pub fn feedback_analysis(config_id: &str, minute: i64) -> String {
        format!("LOG_24X7_FEEDBACK_ANALYSIS_{config_id}_{minute}")
    }
}
