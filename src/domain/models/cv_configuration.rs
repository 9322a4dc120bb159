//! Monitored configuration domain model.
//!
//! A monitored configuration identifies one service plus metric or log
//! source under continuous verification. It is read-only to the scheduler
//! except for auto-disablement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of data a configuration verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    /// Metric / APM time series.
    TimeSeries,
    /// Log events, clustered before analysis.
    Log,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeSeries => "time_series",
            Self::Log => "log",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "time_series" | "timeseries" | "metric" => Some(Self::TimeSeries),
            "log" | "logs" => Some(Self::Log),
            _ => None,
        }
    }
}

/// How analysis compares test data against history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStrategy {
    #[default]
    CompareWithPrevious,
    CompareWithCurrent,
    Predictive,
}

impl ComparisonStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompareWithPrevious => "compare_with_previous",
            Self::CompareWithCurrent => "compare_with_current",
            Self::Predictive => "predictive",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "compare_with_previous" => Some(Self::CompareWithPrevious),
            "compare_with_current" => Some(Self::CompareWithCurrent),
            "predictive" => Some(Self::Predictive),
            _ => None,
        }
    }
}

/// Inclusive baseline window in epoch minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineWindow {
    pub start_minute: i64,
    pub end_minute: i64,
}

impl BaselineWindow {
    pub const fn new(start_minute: i64, end_minute: i64) -> Self {
        Self { start_minute, end_minute }
    }

    pub const fn contains(&self, minute: i64) -> bool {
        minute >= self.start_minute && minute <= self.end_minute
    }

    /// Strictly inside the window, both ends excluded.
    pub const fn strictly_contains(&self, minute: i64) -> bool {
        minute > self.start_minute && minute < self.end_minute
    }
}

/// A configuration under continuous verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredConfiguration {
    pub id: String,
    pub account_id: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub name: String,
    pub kind: VerificationKind,
    /// Provider of the data (NEW_RELIC, PROMETHEUS, ELK, SUMO, ...).
    pub state_type: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub comparison_strategy: ComparisonStrategy,
    /// Only meaningful for log configurations.
    #[serde(default)]
    pub baseline: Option<BaselineWindow>,
    #[serde(default)]
    pub alert_enabled: bool,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    #[serde(default)]
    pub snooze_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub snooze_end: Option<DateTime<Utc>>,
    #[serde(default = "default_occurrences")]
    pub num_occurrences_for_alert: u32,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Set when the configuration backs a single workflow verification.
    #[serde(default)]
    pub context_id: Option<String>,
    /// Enqueue collection tasks instead of calling the manager directly.
    #[serde(default)]
    pub task_based_collection: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

const fn default_enabled() -> bool {
    true
}

const fn default_alert_threshold() -> f64 {
    0.5
}

const fn default_occurrences() -> u32 {
    1
}

impl MonitoredConfiguration {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        kind: VerificationKind,
        state_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            account_id: account_id.into(),
            app_id: String::new(),
            service_id: String::new(),
            kind,
            state_type: state_type.into(),
            enabled: true,
            comparison_strategy: ComparisonStrategy::default(),
            baseline: None,
            alert_enabled: false,
            alert_threshold: default_alert_threshold(),
            snooze_start: None,
            snooze_end: None,
            num_occurrences_for_alert: default_occurrences(),
            query: None,
            tags: Vec::new(),
            context_id: None,
            task_based_collection: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_baseline(mut self, start_minute: i64, end_minute: i64) -> Self {
        self.baseline = Some(BaselineWindow::new(start_minute, end_minute));
        self
    }

    pub fn with_alerts(mut self, threshold: f64, occurrences: u32) -> Self {
        self.alert_enabled = true;
        self.alert_threshold = threshold;
        self.num_occurrences_for_alert = occurrences;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn is_workflow_config(&self) -> bool {
        self.context_id.is_some()
    }

    pub fn is_log(&self) -> bool {
        self.kind == VerificationKind::Log
    }

    pub fn is_time_series(&self) -> bool {
        self.kind == VerificationKind::TimeSeries
    }

    /// Splunk delivers already-clustered L2 data, so it skips L1/L2 clustering.
    pub fn requires_clustering(&self) -> bool {
        self.is_log() && !self.state_type.eq_ignore_ascii_case("SPLUNKV2")
    }

    /// Baseline window, or an empty window before every real minute.
    pub fn baseline_or_unset(&self) -> BaselineWindow {
        self.baseline.unwrap_or(BaselineWindow::new(-1, -1))
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some_and(|b| b.start_minute >= 0 && b.end_minute >= 0)
    }

    /// Whether `at` falls inside a configured snooze interval.
    pub fn is_snoozed_at(&self, at: DateTime<Utc>) -> bool {
        match (self.snooze_start, self.snooze_end) {
            (Some(start), Some(end)) => at >= start && at <= end,
            _ => false,
        }
    }

    /// Threshold handed to the analysis engine for `analysis_minute`, or none
    /// when alerting is off or that minute lies inside the snooze interval.
    pub fn alert_threshold_for_minute(&self, analysis_minute: i64) -> Option<f64> {
        if !self.alert_enabled {
            return None;
        }
        let snoozed = match (self.snooze_start, self.snooze_end) {
            (Some(start), Some(end)) => {
                let start_minute = start.timestamp().div_euclid(60);
                let end_minute = end.timestamp().div_euclid(60);
                analysis_minute >= start_minute && analysis_minute <= end_minute
            }
            _ => false,
        };
        (!snoozed).then_some(self.alert_threshold)
    }
}

/// License facts about an account that gate service guard work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLicense {
    pub status: AccountStatus,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Expired,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Paid,
    Trial,
    Community,
    Essentials,
}

/// Unlicensed accounts and active paid or trial accounts get service guard tasks.
pub fn should_perform_service_guard_tasks(license: Option<&AccountLicense>) -> bool {
    match license {
        None => true,
        Some(license) => {
            license.status == AccountStatus::Active
                && matches!(license.account_type, AccountType::Paid | AccountType::Trial)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_baseline_containment() {
        let window = BaselineWindow::new(100, 130);
        assert!(window.contains(100));
        assert!(window.contains(130));
        assert!(!window.strictly_contains(100));
        assert!(window.strictly_contains(101));
        assert!(!window.contains(131));
    }

    #[test]
    fn test_snooze_suppresses_threshold() {
        let mut config = MonitoredConfiguration::new("c1", "acct", VerificationKind::TimeSeries, "PROMETHEUS")
            .with_alerts(0.4, 1);
        assert_eq!(config.alert_threshold_for_minute(1_000), Some(0.4));

        config.snooze_start = Some(Utc.timestamp_opt(990 * 60, 0).unwrap());
        config.snooze_end = Some(Utc.timestamp_opt(1_010 * 60, 0).unwrap());
        assert_eq!(config.alert_threshold_for_minute(1_000), None);
        assert_eq!(config.alert_threshold_for_minute(1_011), Some(0.4));
    }

    #[test]
    fn test_alerts_disabled_has_no_threshold() {
        let config = MonitoredConfiguration::new("c1", "acct", VerificationKind::Log, "ELK");
        assert_eq!(config.alert_threshold_for_minute(5), None);
    }

    #[test]
    fn test_splunk_skips_clustering() {
        let elk = MonitoredConfiguration::new("c1", "a", VerificationKind::Log, "ELK");
        let splunk = MonitoredConfiguration::new("c2", "a", VerificationKind::Log, "SPLUNKV2");
        assert!(elk.requires_clustering());
        assert!(!splunk.requires_clustering());
    }

    #[test]
    fn test_service_guard_license_gate() {
        assert!(should_perform_service_guard_tasks(None));
        let paid = AccountLicense { status: AccountStatus::Active, account_type: AccountType::Paid };
        assert!(should_perform_service_guard_tasks(Some(&paid)));
        let community = AccountLicense { status: AccountStatus::Active, account_type: AccountType::Community };
        assert!(!should_perform_service_guard_tasks(Some(&community)));
        let expired = AccountLicense { status: AccountStatus::Expired, account_type: AccountType::Trial };
        assert!(!should_perform_service_guard_tasks(Some(&expired)));
    }
}
