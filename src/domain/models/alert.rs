//! Alert payloads and analysis results that feed them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    TimeSeries,
    Log,
}

/// Alert raised or closed for a monitored configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertData {
    pub config_id: String,
    pub account_id: String,
    pub app_id: String,
    pub kind: AlertKind,
    pub risk_score: f64,
    pub threshold: f64,
    /// Epoch milliseconds.
    pub analysis_start_time: i64,
    /// Epoch milliseconds.
    pub analysis_end_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_anomaly: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

/// A log cluster the analysis engine could not match against history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownCluster {
    pub text: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Engine-assigned priority; clusters without one always alert.
    #[serde(default)]
    pub priority_score: Option<f64>,
}

/// Result posted by the analysis engine for a log-ML task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogAnalysisResult {
    pub analysis_minute: i64,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub unknown_clusters: Vec<UnknownCluster>,
}

/// Result posted by the analysis engine for a time-series task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesAnalysisResult {
    pub analysis_minute: i64,
    pub risk_score: f64,
    #[serde(default)]
    pub tag: Option<String>,
}
