//! Feedback analysis scheduling and results.

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::models::{
    scope_keys, AnalysisRecord, AnalysisTask, AnalysisType, LogAnalysisResult, MonitoredConfiguration, RecordKind,
    VerificationKind, DUMMY_HOST,
};
use crate::domain::ports::DISABLE_LOGML_NEURAL_NET;
use crate::services::windowing::{next_feedback_minute, ANALYSIS_WINDOW_MINUTES};

use super::ContinuousVerificationService;

impl ContinuousVerificationService {
    /// Queue the next feedback analysis for every service guard log
    /// configuration.
    #[instrument(skip(self), err)]
    pub async fn trigger_feedback_analysis(&self, account_id: &str) -> Result<usize> {
        if self
            .manager
            .is_feature_enabled(DISABLE_LOGML_NEURAL_NET, account_id)
            .await
            .context("Failed to check feature flag")?
        {
            debug!("log ML neural net disabled, skipping feedback analysis");
            return Ok(0);
        }

        let configs = self.service_guard_configs(account_id, VerificationKind::Log).await?;
        let mut created = 0;
        for config in configs.iter().filter(|c| !c.is_workflow_config()) {
            match self.feedback_for(config).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => error!(config_id = %config.id, error = ?e, "feedback analysis trigger failed"),
            }
        }
        Ok(created)
    }

    async fn feedback_for(&self, config: &MonitoredConfiguration) -> Result<bool> {
        let last_log_ml = self.last_record_minute(config, RecordKind::LogMl).await?;
        let last_feedback = self.last_record_minute(config, RecordKind::Feedback).await?;
        let candidate_has_log_ml = match last_feedback.filter(|m| *m > 0) {
            Some(last) => self.has_record(config, RecordKind::LogMl, last + ANALYSIS_WINDOW_MINUTES).await?,
            None => false,
        };

        let Some(minute) = next_feedback_minute(last_log_ml, last_feedback, candidate_has_log_ml) else {
            return Ok(false);
        };
        if minute <= config.baseline_or_unset().end_minute {
            debug!(config_id = %config.id, minute, "baseline minute, no feedback");
            return Ok(false);
        }

        let has_feedback = self
            .manager
            .has_user_feedback(&config.id)
            .await
            .context("Failed to check user feedback")?;
        if !has_feedback {
            // Alerts for this minute fired with the log-ML result; only advance.
            if self.has_record(config, RecordKind::LogMl, minute).await? {
                self.save_feedback_record(config, minute, None).await?;
            } else {
                warn!(config_id = %config.id, minute, "no log analysis record for feedback minute");
            }
            return Ok(false);
        }

        let scope_key = scope_keys::feedback_analysis(&config.id, minute);
        let Some(backoff_count) = self
            .learning
            .prepare_window(&scope_key, minute, AnalysisType::FeedbackAnalysis)
            .await?
        else {
            return Ok(false);
        };
        let mut task = AnalysisTask::new(&config.account_id, &scope_key, AnalysisType::FeedbackAnalysis, minute)
            .with_config(&config.id, &config.app_id)
            .with_start_minute(minute - ANALYSIS_WINDOW_MINUTES + 1)
            .with_hosts(vec![DUMMY_HOST.to_string()])
            .with_backoff_count(backoff_count)
            .with_alert_threshold(config.alert_threshold_for_minute(minute))
            .with_priority(1)
            .with_created_at(self.clock.now());
        task.urls = self.urls.feedback_analysis(task.id, &config.id, minute);
        self.learning.add_task(&task).await
    }

    /// Persist a feedback analysis result and raise its alerts. Returns
    /// the number of alerts opened.
    #[instrument(skip(self, result), fields(minute = result.analysis_minute), err)]
    pub async fn save_feedback_result(&self, config_id: &str, result: &LogAnalysisResult) -> Result<usize> {
        let config = self.require_config(config_id).await?;
        let minute = result.analysis_minute;
        self.save_feedback_record(&config, minute, Some(result.score)).await?;
        self.learning
            .mark_completed(
                &scope_keys::feedback_analysis(&config.id, minute),
                minute,
                AnalysisType::FeedbackAnalysis,
                None,
            )
            .await?;
        info!(config_id = %config.id, "feedback result saved");
        self.alerts.log_alert(&config, result).await
    }

    async fn save_feedback_record(
        &self,
        config: &MonitoredConfiguration,
        minute: i64,
        score: Option<f64>,
    ) -> Result<()> {
        let mut record = AnalysisRecord::new(&config.id, minute, RecordKind::Feedback).with_created_at(self.clock.now());
        if let Some(score) = score {
            record = record.with_risk(score);
        }
        self.records
            .save(&record)
            .await
            .context("Failed to save feedback record")
    }

    async fn last_record_minute(&self, config: &MonitoredConfiguration, kind: RecordKind) -> Result<Option<i64>> {
        self.records
            .last_minute(&config.id, kind)
            .await
            .with_context(|| format!("Failed to load last {} minute", kind.as_str()))
    }

    async fn has_record(&self, config: &MonitoredConfiguration, kind: RecordKind, minute: i64) -> Result<bool> {
        self.records
            .exists(&config.id, kind, minute)
            .await
            .context("Failed to check analysis record")
    }
}
