//! Opening and closing alerts for analysis results.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{debug, info, instrument};

use crate::domain::models::{AlertData, AlertKind, LogAnalysisResult, MonitoredConfiguration, RecordKind};
use crate::domain::ports::{AnalysisRecordRepository, Clock, VerificationManager};
use crate::services::windowing::{ANALYSIS_WINDOW_MINUTES, HISTORY_MINUTES};

/// What a time-series alert evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Alerting is off or snoozed.
    Skipped,
    Closed,
    /// Breach recorded but not enough consecutive breaches yet.
    Debounced,
    Opened,
}

pub struct AlertService {
    records: Arc<dyn AnalysisRecordRepository>,
    manager: Arc<dyn VerificationManager>,
    clock: Arc<dyn Clock>,
}

impl AlertService {
    pub fn new(
        records: Arc<dyn AnalysisRecordRepository>,
        manager: Arc<dyn VerificationManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { records, manager, clock }
    }

    /// Evaluate a time-series risk score for `analysis_minute`.
    ///
    /// The result for `analysis_minute` must already be saved: it counts
    /// toward the consecutive breaches.
    #[instrument(skip(self, config), fields(config_id = %config.id), err)]
    pub async fn time_series_alert(
        &self,
        config: &MonitoredConfiguration,
        risk_score: f64,
        analysis_minute: i64,
        tag: Option<&str>,
    ) -> Result<AlertOutcome> {
        if !config.alert_enabled || config.is_snoozed_at(self.clock.now()) {
            return Ok(AlertOutcome::Skipped);
        }

        let alert = AlertData {
            config_id: config.id.clone(),
            account_id: config.account_id.clone(),
            app_id: config.app_id.clone(),
            kind: AlertKind::TimeSeries,
            risk_score,
            threshold: config.alert_threshold,
            analysis_start_time: (analysis_minute - ANALYSIS_WINDOW_MINUTES) * 60_000 + 1,
            analysis_end_time: analysis_minute * 60_000,
            tag: tag.map(str::to_string),
            log_anomaly: None,
            hosts: Vec::new(),
            valid_until: None,
        };

        if risk_score <= config.alert_threshold {
            self.manager
                .close_alert(&config.id, &alert)
                .await
                .context("Failed to close alert")?;
            return Ok(AlertOutcome::Closed);
        }

        let needed = config.num_occurrences_for_alert.max(1);
        if needed > 1 {
            let earliest = analysis_minute - i64::from(needed - 1) * ANALYSIS_WINDOW_MINUTES;
            let breaches = self
                .records
                .count_above_threshold(
                    &config.id,
                    RecordKind::TimeSeries,
                    tag,
                    earliest,
                    analysis_minute,
                    config.alert_threshold,
                )
                .await
                .context("Failed to count threshold breaches")?;
            if breaches < i64::from(needed) {
                debug!(breaches, needed, "alert debounced");
                return Ok(AlertOutcome::Debounced);
            }
        }

        self.manager
            .open_alert(&config.id, &alert)
            .await
            .context("Failed to open alert")?;
        info!(risk_score, analysis_minute, "time series alert opened");
        Ok(AlertOutcome::Opened)
    }

    /// Open one alert per unknown cluster whose priority reaches the
    /// threshold. Clusters without a priority always alert.
    #[instrument(skip(self, config, result), fields(config_id = %config.id, minute = result.analysis_minute), err)]
    pub async fn log_alert(&self, config: &MonitoredConfiguration, result: &LogAnalysisResult) -> Result<usize> {
        let now = self.clock.now();
        if !config.alert_enabled || config.is_snoozed_at(now) {
            return Ok(0);
        }

        let mut opened = 0;
        for cluster in &result.unknown_clusters {
            if cluster.priority_score.is_some_and(|p| p < config.alert_threshold) {
                continue;
            }
            let alert = AlertData {
                config_id: config.id.clone(),
                account_id: config.account_id.clone(),
                app_id: config.app_id.clone(),
                kind: AlertKind::Log,
                risk_score: 1.0,
                threshold: config.alert_threshold,
                analysis_start_time: (result.analysis_minute - ANALYSIS_WINDOW_MINUTES) * 60_000 + 1,
                analysis_end_time: result.analysis_minute * 60_000,
                tag: None,
                log_anomaly: Some(cluster.text.clone()),
                hosts: cluster.hosts.clone(),
                valid_until: Some(now + Duration::minutes(HISTORY_MINUTES)),
            };
            self.manager
                .open_alert(&config.id, &alert)
                .await
                .context("Failed to open log alert")?;
            opened += 1;
        }
        if opened > 0 {
            info!(opened, "log alerts opened");
        }
        Ok(opened)
    }
}
