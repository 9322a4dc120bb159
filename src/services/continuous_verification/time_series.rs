//! Time-series analysis scheduling and result handling.

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{
    scope_keys, AnalysisRecord, AnalysisTask, AnalysisType, MonitoredConfiguration, RecordKind,
    TimeSeriesAnalysisResult, VerificationKind, DUMMY_HOST,
};
use crate::services::alert_service::AlertOutcome;
use crate::services::windowing::{
    restart_guard_minute, time_series_analysis_start, AnalysisStart, ANALYSIS_WINDOW_MINUTES, HISTORY_MINUTES,
};

use super::ContinuousVerificationService;

impl ContinuousVerificationService {
    /// Queue the next time-series analysis window for every configuration.
    #[instrument(skip(self), err)]
    pub async fn trigger_time_series_analysis(&self, account_id: &str) -> Result<usize> {
        let configs = self.service_guard_configs(account_id, VerificationKind::TimeSeries).await?;
        let mut created = 0;
        for config in configs {
            match self.analyze_time_series_for(&config).await {
                Ok(n) => created += n,
                Err(e) => error!(config_id = %config.id, error = ?e, "time series analysis trigger failed"),
            }
        }
        Ok(created)
    }

    async fn analyze_time_series_for(&self, config: &MonitoredConfiguration) -> Result<usize> {
        let now_minute = self.clock.now_minute();
        let last_collection = self
            .records
            .last_minute(&config.id, RecordKind::Collected)
            .await
            .context("Failed to load last collected minute")?;
        let Some(last_collection) = last_collection.filter(|m| *m > 0) else {
            debug!(config_id = %config.id, "no data collected yet");
            return Ok(0);
        };
        let last_analysis = self
            .records
            .last_minute(&config.id, RecordKind::TimeSeries)
            .await
            .context("Failed to load last analysis minute")?;

        let start = time_series_analysis_start(last_collection, last_analysis, now_minute);
        if let AnalysisStart::Restart(restart) = start {
            if self
                .learning
                .is_task_running_or_queued(&config.id, Some(restart_guard_minute(restart)))
                .await?
            {
                debug!(config_id = %config.id, restart, "earlier analysis still in flight");
                return Ok(0);
            }
        }
        let start_minute = start.minute();
        if last_collection - start_minute < ANALYSIS_WINDOW_MINUTES {
            return Ok(0);
        }

        let end_minute = start_minute + ANALYSIS_WINDOW_MINUTES;
        let window_start = start_minute + 1;
        let scope_key = scope_keys::time_series(&config.id);
        let Some(backoff_count) = self
            .learning
            .prepare_window(&scope_key, end_minute, AnalysisType::TimeSeries)
            .await?
        else {
            return Ok(0);
        };

        let tags: Vec<Option<&str>> = if config.tags.is_empty() {
            vec![None]
        } else {
            config.tags.iter().map(|t| Some(t.as_str())).collect()
        };

        let mut created = 0;
        for tag in tags {
            let mut task = AnalysisTask::new(&config.account_id, &scope_key, AnalysisType::TimeSeries, end_minute)
                .with_config(&config.id, &config.app_id)
                .with_start_minute(window_start - HISTORY_MINUTES)
                .with_tag(tag.map(str::to_string))
                .with_hosts(vec![DUMMY_HOST.to_string()])
                .with_backoff_count(backoff_count)
                .with_alert_threshold(config.alert_threshold_for_minute(end_minute))
                .with_priority(1)
                .with_created_at(self.clock.now());
            task.urls = self
                .urls
                .time_series(task.id, &config.id, window_start - HISTORY_MINUTES, end_minute, tag);
            if self.learning.add_task(&task).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Persist a worker's time-series result, complete its task and
    /// evaluate the alert.
    #[instrument(skip(self, result), fields(minute = result.analysis_minute), err)]
    pub async fn save_time_series_result(
        &self,
        task_id: Uuid,
        result: &TimeSeriesAnalysisResult,
    ) -> Result<AlertOutcome> {
        let task = self
            .learning
            .task(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))?;
        let config_id = task
            .config_id
            .as_deref()
            .ok_or_else(|| DomainError::ValidationFailed(format!("task {task_id} has no configuration")))?;
        let config = self.require_config(config_id).await?;

        let tag = result.tag.clone().or_else(|| task.tag.clone());
        let record = AnalysisRecord::new(&config.id, result.analysis_minute, RecordKind::TimeSeries)
            .with_risk(result.risk_score)
            .with_tag(tag.clone())
            .with_created_at(self.clock.now());
        self.records
            .save(&record)
            .await
            .context("Failed to save time series result")?;
        self.learning.mark_task_completed(task_id).await?;
        info!(config_id = %config.id, risk_score = result.risk_score, "time series result saved");

        self.alerts
            .time_series_alert(&config, result.risk_score, result.analysis_minute, tag.as_deref())
            .await
    }
}
