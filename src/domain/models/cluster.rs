//! Log clustering domain model.
//!
//! Raw log events move through ordered cluster levels (L0 -> L1 -> L2).
//! Each level has a parallel heartbeat level (H0/H1/H2) holding exactly one
//! marker per (minute, host), so completion checks never scan the clustered
//! records themselves. HF is the final heartbeat: the minute has been fully
//! analysed and is eligible for retention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage of a log record in the clustering pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterLevel {
    L0,
    L1,
    L2,
    H0,
    H1,
    H2,
    HF,
}

impl ClusterLevel {
    /// The level the pipeline ends in.
    pub const FINAL: Self = Self::HF;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L0 => "L0",
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::H0 => "H0",
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::HF => "HF",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "L0" => Some(Self::L0),
            "L1" => Some(Self::L1),
            "L2" => Some(Self::L2),
            "H0" => Some(Self::H0),
            "H1" => Some(Self::H1),
            "H2" => Some(Self::H2),
            "HF" => Some(Self::HF),
            _ => None,
        }
    }

    /// Numeric clustering pass, as carried on log-cluster analysis tasks.
    pub const fn level(&self) -> i32 {
        match self {
            Self::L0 | Self::H0 => 0,
            Self::L1 | Self::H1 => 1,
            Self::L2 | Self::H2 => 2,
            Self::HF => -1,
        }
    }

    pub const fn from_level(level: i32) -> Option<Self> {
        match level {
            0 => Some(Self::L0),
            1 => Some(Self::L1),
            2 => Some(Self::L2),
            _ => None,
        }
    }

    /// Heartbeat level mirroring this level. Heartbeats map to themselves.
    pub const fn heartbeat(&self) -> Self {
        match self {
            Self::L0 | Self::H0 => Self::H0,
            Self::L1 | Self::H1 => Self::H1,
            Self::L2 | Self::H2 => Self::H2,
            Self::HF => Self::HF,
        }
    }

    pub const fn is_heartbeat(&self) -> bool {
        matches!(self, Self::H0 | Self::H1 | Self::H2 | Self::HF)
    }

    /// Data level one clustering pass up, if any.
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::L0 => Some(Self::L1),
            Self::L1 => Some(Self::L2),
            _ => None,
        }
    }

    /// Data level one clustering pass down, if any.
    pub const fn previous(&self) -> Option<Self> {
        match self {
            Self::L1 => Some(Self::L0),
            Self::L2 => Some(Self::L1),
            _ => None,
        }
    }

    /// Expand a set of levels so each data level also matches its heartbeat.
    pub fn with_heartbeats(levels: &[Self]) -> Vec<Self> {
        let mut expanded: Vec<Self> = Vec::with_capacity(levels.len() * 2);
        for level in levels {
            for candidate in [*level, level.heartbeat()] {
                if !expanded.contains(&candidate) {
                    expanded.push(candidate);
                }
            }
        }
        expanded
    }
}

impl std::fmt::Display for ClusterLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of a set of log records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LogScope {
    /// Service guard configuration (24x7).
    Configuration(String),
    /// One workflow verification state execution.
    StateExecution(String),
}

impl LogScope {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "cv_config",
            Self::StateExecution(_) => "state_execution",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Configuration(id) | Self::StateExecution(id) => id,
        }
    }

    pub fn from_parts(kind: &str, id: String) -> Option<Self> {
        match kind {
            "cv_config" => Some(Self::Configuration(id)),
            "state_execution" => Some(Self::StateExecution(id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.id())
    }
}

/// Cluster label carried by heartbeat markers. Real clusters use labels >= 0.
pub const HEARTBEAT_LABEL: &str = "-1";

/// Host name used when a record is not tied to a real host.
pub const DUMMY_HOST: &str = "dummy";

/// One clustering unit or heartbeat marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub scope: LogScope,
    /// Log provider the record was collected from (ELK, SUMO, ...).
    pub state_type: String,
    pub query: String,
    pub host: String,
    /// Minutes since the Unix epoch.
    pub minute: i64,
    pub level: ClusterLevel,
    pub cluster_label: String,
    pub message: String,
    pub count: i64,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(
        scope: LogScope,
        host: impl Into<String>,
        minute: i64,
        level: ClusterLevel,
        cluster_label: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            state_type: String::new(),
            query: String::new(),
            host: host.into(),
            minute,
            level,
            cluster_label: cluster_label.into(),
            message: message.into(),
            count: 1,
            created_at: Utc::now(),
        }
    }

    /// Heartbeat marker for `host` at `minute` mirroring `level`.
    pub fn heartbeat(scope: LogScope, host: impl Into<String>, minute: i64, level: ClusterLevel) -> Self {
        Self::new(scope, host, minute, level.heartbeat(), HEARTBEAT_LABEL, "")
    }

    pub fn with_state_type(mut self, state_type: impl Into<String>) -> Self {
        self.state_type = state_type.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn is_heartbeat(&self) -> bool {
        self.level.is_heartbeat() || self.cluster_label.parse::<i64>().is_ok_and(|l| l < 0)
    }
}

/// Which end of a minute range to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinuteOrder {
    Earliest,
    Latest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_mapping() {
        assert_eq!(ClusterLevel::L0.heartbeat(), ClusterLevel::H0);
        assert_eq!(ClusterLevel::L1.heartbeat(), ClusterLevel::H1);
        assert_eq!(ClusterLevel::L2.heartbeat(), ClusterLevel::H2);
        assert_eq!(ClusterLevel::HF.heartbeat(), ClusterLevel::HF);
        assert_eq!(ClusterLevel::H1.heartbeat(), ClusterLevel::H1);
    }

    #[test]
    fn test_level_round_trip_via_number() {
        for level in [ClusterLevel::L0, ClusterLevel::L1, ClusterLevel::L2] {
            assert_eq!(ClusterLevel::from_level(level.level()), Some(level));
        }
        assert_eq!(ClusterLevel::from_level(7), None);
    }

    #[test]
    fn test_with_heartbeats_dedups() {
        let levels = ClusterLevel::with_heartbeats(&[ClusterLevel::L0, ClusterLevel::H0, ClusterLevel::L1]);
        assert_eq!(levels, vec![ClusterLevel::L0, ClusterLevel::H0, ClusterLevel::L1, ClusterLevel::H1]);
    }

    #[test]
    fn test_heartbeat_record_detection() {
        let scope = LogScope::Configuration("cfg".into());
        let hb = LogRecord::heartbeat(scope.clone(), "host-a", 10, ClusterLevel::L0);
        assert!(hb.is_heartbeat());
        assert_eq!(hb.level, ClusterLevel::H0);

        let data = LogRecord::new(scope, "host-a", 10, ClusterLevel::L0, "3", "boom");
        assert!(!data.is_heartbeat());
    }

    #[test]
    fn test_scope_parts() {
        let scope = LogScope::from_parts("state_execution", "se-1".into()).unwrap();
        assert_eq!(scope.kind_str(), "state_execution");
        assert_eq!(scope.id(), "se-1");
        assert!(LogScope::from_parts("other", "x".into()).is_none());
    }
}
