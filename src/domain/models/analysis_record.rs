//! Per-minute analysis outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which pipeline produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Time-series analysis with a risk score.
    TimeSeries,
    /// Log-ML analysis completed for the minute.
    LogMl,
    /// Feedback analysis completed for the minute.
    Feedback,
    /// Time-series data collected through the minute.
    Collected,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeSeries => "time_series",
            Self::LogMl => "log_ml",
            Self::Feedback => "feedback",
            Self::Collected => "collected",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "time_series" => Some(Self::TimeSeries),
            "log_ml" => Some(Self::LogMl),
            "feedback" => Some(Self::Feedback),
            "collected" => Some(Self::Collected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Configuration id, or the state execution id for workflow contexts.
    pub owner_id: String,
    pub analysis_minute: i64,
    pub kind: RecordKind,
    /// Empty when the analysis was not split by tag.
    pub tag: String,
    pub risk_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(owner_id: impl Into<String>, analysis_minute: i64, kind: RecordKind) -> Self {
        Self {
            owner_id: owner_id.into(),
            analysis_minute,
            kind,
            tag: String::new(),
            risk_score: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_risk(mut self, risk_score: f64) -> Self {
        self.risk_score = Some(risk_score);
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag.unwrap_or_default();
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}
