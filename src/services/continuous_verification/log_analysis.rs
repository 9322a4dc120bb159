//! Log-ML analysis scheduling, results and workflow completion.

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::models::{
    scope_keys, AnalysisContext, AnalysisRecord, AnalysisTask, AnalysisType, ClusterLevel, ComparisonStrategy,
    LogAnalysisResult, LogScope, MinuteOrder, MonitoredConfiguration, RecordKind, VerificationKind,
    WorkflowNotificationStatus, DUMMY_HOST,
};
use crate::domain::ports::{WorkflowNotification, DISABLE_LOGML_NEURAL_NET};
use crate::services::windowing::{log_ml_analysis_end_minute, LogMlInputs, ANALYSIS_WINDOW_MINUTES};

use super::ContinuousVerificationService;

/// Levels that must be empty in a window before it can be analysed.
const UNCLUSTERED: [ClusterLevel; 4] = [ClusterLevel::L0, ClusterLevel::H0, ClusterLevel::L1, ClusterLevel::H1];

impl ContinuousVerificationService {
    /// Queue the next log-ML window for every log configuration.
    ///
    /// A workflow-scoped configuration that fails here is reported to its
    /// workflow and disabled.
    #[instrument(skip(self), err)]
    pub async fn trigger_log_data_analysis(&self, account_id: &str) -> Result<usize> {
        let configs = self.service_guard_configs(account_id, VerificationKind::Log).await?;
        let mut created = 0;
        for config in configs {
            match self.analyze_logs_for(&config).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(config_id = %config.id, error = ?e, "log analysis trigger failed");
                    if config.is_workflow_config() {
                        let message = format!("{e:#}");
                        if let Err(notify_err) = self
                            .finish_workflow_config(&config, WorkflowNotificationStatus::Error, Some(message))
                            .await
                        {
                            error!(config_id = %config.id, error = ?notify_err, "failed to report workflow error");
                        }
                    }
                }
            }
        }
        Ok(created)
    }

    async fn analyze_logs_for(&self, config: &MonitoredConfiguration) -> Result<bool> {
        let scope = LogScope::Configuration(config.id.clone());
        let baseline = config.baseline_or_unset();
        let duration = self.context_duration(config).await?;

        if let Some(duration) = duration {
            let final_minute = self.clustering.last_final_minute(&scope).await?;
            if final_minute.is_some_and(|hf| hf >= baseline.end_minute + duration) {
                info!(config_id = %config.id, "workflow log analysis complete");
                self.finish_workflow_config(config, WorkflowNotificationStatus::Success, None)
                    .await?;
                return Ok(false);
            }
        }

        let inputs = LogMlInputs {
            min_h2: self
                .logs
                .minute_for_level(&scope, ClusterLevel::H2, MinuteOrder::Earliest)
                .await
                .context("Failed to load earliest H2 minute")?,
            max_h2: self.latest_minute(&scope, ClusterLevel::H2).await?,
            last_analysis: self
                .records
                .last_minute(&config.id, RecordKind::LogMl)
                .await
                .context("Failed to load last log analysis minute")?,
        };

        if let (Some(duration), Some(last)) = (duration, inputs.last_analysis) {
            if last >= baseline.end_minute && last + 1 > baseline.end_minute + duration {
                info!(config_id = %config.id, last, "workflow analysed through its duration");
                self.finish_workflow_config(config, WorkflowNotificationStatus::Success, None)
                    .await?;
                return Ok(false);
            }
        }

        let Some(end_minute) = log_ml_analysis_end_minute(inputs, baseline, self.clock.now_minute()) else {
            return Ok(false);
        };
        let start_minute = end_minute - ANALYSIS_WINDOW_MINUTES + 1;
        if self
            .logs
            .any_in_range(&scope, start_minute, end_minute, &UNCLUSTERED)
            .await
            .context("Failed to check pending clustering")?
        {
            debug!(config_id = %config.id, end_minute, "window still clustering");
            return Ok(false);
        }

        let scope_key = scope_keys::log_analysis(&config.id, end_minute);
        let Some(backoff_count) = self
            .learning
            .prepare_window(&scope_key, end_minute, AnalysisType::LogMl)
            .await?
        else {
            return Ok(false);
        };

        let mut task = AnalysisTask::new(&config.account_id, &scope_key, AnalysisType::LogMl, end_minute)
            .with_config(&config.id, &config.app_id)
            .with_start_minute(start_minute)
            .with_hosts(vec![DUMMY_HOST.to_string()])
            .with_backoff_count(backoff_count)
            .with_alert_threshold(config.alert_threshold_for_minute(end_minute))
            .with_priority(1)
            .with_created_at(self.clock.now());
        task.urls = self.urls.log_analysis(
            task.id,
            &config.id,
            start_minute,
            end_minute,
            start_minute < baseline.end_minute,
            config.comparison_strategy == ComparisonStrategy::Predictive,
        );
        self.learning.add_task(&task).await
    }

    /// Report a workflow-scoped configuration's outcome and disable it.
    async fn finish_workflow_config(
        &self,
        config: &MonitoredConfiguration,
        status: WorkflowNotificationStatus,
        error_msg: Option<String>,
    ) -> Result<()> {
        if let Some(context) = self.workflow_context(config).await? {
            let mut notification = WorkflowNotification::new(&context, status);
            if let Some(message) = error_msg {
                notification = notification.with_error(message, None);
            }
            self.manager
                .notify_workflow(&notification)
                .await
                .context("Failed to notify workflow")?;
        } else {
            warn!(config_id = %config.id, "workflow context missing, disabling without notification");
        }
        self.configs
            .set_enabled(&config.id, false, self.clock.now())
            .await
            .context("Failed to disable workflow configuration")
    }

    async fn workflow_context(&self, config: &MonitoredConfiguration) -> Result<Option<AnalysisContext>> {
        match config.context_id.as_deref() {
            Some(id) => self.contexts.get(id).await.context("Failed to load analysis context"),
            None => Ok(None),
        }
    }

    /// Persist a log-ML result, finalise its minutes and raise alerts.
    ///
    /// Alerts fire here unless a user has given feedback on the
    /// configuration, in which case the feedback analysis raises them.
    /// Returns the number of alerts opened.
    #[instrument(skip(self, result), fields(minute = result.analysis_minute), err)]
    pub async fn save_log_analysis_result(&self, config_id: &str, result: &LogAnalysisResult) -> Result<usize> {
        let config = self.require_config(config_id).await?;
        let scope = LogScope::Configuration(config.id.clone());
        let minute = result.analysis_minute;

        let record = AnalysisRecord::new(&config.id, minute, RecordKind::LogMl)
            .with_risk(result.score)
            .with_created_at(self.clock.now());
        self.records
            .save(&record)
            .await
            .context("Failed to save log analysis result")?;

        let finalised = self
            .logs
            .bump_heartbeats_up_to(&scope, minute, ClusterLevel::H2, ClusterLevel::HF)
            .await
            .context("Failed to finalise analysed minutes")?;
        self.learning
            .mark_completed(&scope_keys::log_analysis(&config.id, minute), minute, AnalysisType::LogMl, None)
            .await?;
        info!(config_id = %config.id, finalised, "log analysis result saved");

        let neural_net_disabled = self
            .manager
            .is_feature_enabled(DISABLE_LOGML_NEURAL_NET, &config.account_id)
            .await
            .context("Failed to check feature flag")?;
        let alert_now = neural_net_disabled
            || config.is_workflow_config()
            || !self
                .manager
                .has_user_feedback(&config.id)
                .await
                .context("Failed to check user feedback")?;
        if !alert_now {
            return Ok(0);
        }
        self.alerts.log_alert(&config, result).await
    }
}
