//! Metric and log data collection.

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument};

use crate::domain::models::{
    AnalysisRecord, ComparisonStrategy, LogScope, MonitoredConfiguration, RecordKind, VerificationKind,
};
use crate::domain::ports::datetime_to_minute;
use crate::services::windowing::{log_collection_plan, metric_collection_window, CollectionWindow, LogCollectionPlan};

use super::ContinuousVerificationService;

impl ContinuousVerificationService {
    /// Collect the next metric window for every time-series configuration.
    #[instrument(skip(self), err)]
    pub async fn trigger_metric_data_collection(&self, account_id: &str) -> Result<usize> {
        let configs = self.service_guard_configs(account_id, VerificationKind::TimeSeries).await?;
        let mut collected = 0;
        for config in configs {
            match self.collect_metrics_for(&config).await {
                Ok(true) => collected += 1,
                Ok(false) => {}
                Err(e) => error!(config_id = %config.id, error = ?e, "metric collection failed"),
            }
        }
        Ok(collected)
    }

    async fn collect_metrics_for(&self, config: &MonitoredConfiguration) -> Result<bool> {
        let last_created = self
            .records
            .last_created_at(&config.id, RecordKind::Collected)
            .await
            .context("Failed to load last collection time")?;
        if !self.scheduler.should_collect_data(config, last_created).await? {
            return Ok(false);
        }

        let max_minute = self
            .records
            .last_minute(&config.id, RecordKind::Collected)
            .await
            .context("Failed to load last collected minute")?;
        let Some(window) = metric_collection_window(self.clock.now_minute(), max_minute) else {
            debug!(config_id = %config.id, "metric window not complete yet");
            return Ok(false);
        };

        if !self.dispatch_collection(config, window).await? {
            return Ok(false);
        }
        let record = AnalysisRecord::new(&config.id, datetime_to_minute(window.end), RecordKind::Collected)
            .with_created_at(self.clock.now());
        self.records
            .save(&record)
            .await
            .context("Failed to record metric collection")?;
        Ok(true)
    }

    /// Collect the next log window for every log configuration.
    #[instrument(skip(self), err)]
    pub async fn trigger_log_data_collection(&self, account_id: &str) -> Result<usize> {
        let configs = self.service_guard_configs(account_id, VerificationKind::Log).await?;
        let mut collected = 0;
        for config in configs {
            match self.collect_logs_for(&config).await {
                Ok(true) => collected += 1,
                Ok(false) => {}
                Err(e) => error!(config_id = %config.id, error = ?e, "log collection failed"),
            }
        }
        Ok(collected)
    }

    async fn collect_logs_for(&self, config: &MonitoredConfiguration) -> Result<bool> {
        if !config.has_baseline() {
            error!(config_id = %config.id, "log configuration has no baseline, skipping");
            return Ok(false);
        }
        let scope = LogScope::Configuration(config.id.clone());

        let last_created = self
            .logs
            .last_created_at(&scope)
            .await
            .context("Failed to load last log write time")?;
        if !self.scheduler.should_collect_data(config, last_created).await? {
            return Ok(false);
        }

        let max_minute = self
            .logs
            .max_minute(&scope)
            .await
            .context("Failed to load last collected log minute")?;
        let predictive = config.comparison_strategy == ComparisonStrategy::Predictive;
        let predictive_duration = if predictive {
            self.context_duration(config).await?
        } else {
            None
        };

        let plan = log_collection_plan(
            self.clock.now(),
            max_minute,
            config.baseline_or_unset(),
            predictive,
            predictive_duration,
        );
        match plan {
            LogCollectionPlan::Collect(window) => self.dispatch_collection(config, window).await,
            LogCollectionPlan::NotYet => Ok(false),
            LogCollectionPlan::Complete => {
                debug!(config_id = %config.id, "predictive collection complete");
                Ok(false)
            }
        }
    }

    /// Duration of the workflow context behind a configuration, if any.
    pub(super) async fn context_duration(&self, config: &MonitoredConfiguration) -> Result<Option<i64>> {
        let Some(context_id) = config.context_id.as_deref() else {
            return Ok(None);
        };
        let context = self
            .contexts
            .get(context_id)
            .await
            .context("Failed to load analysis context")?;
        Ok(context.map(|c| c.time_duration))
    }

    /// Hand a window to the collector, either directly or through the
    /// collection task queue. Returns whether the collection was accepted.
    async fn dispatch_collection(&self, config: &MonitoredConfiguration, window: CollectionWindow) -> Result<bool> {
        if config.task_based_collection {
            self.collection_tasks.create(config, window.start, window.end).await?;
            return Ok(true);
        }

        let accepted = self
            .manager
            .trigger_data_collection(&config.id, config.kind, &config.state_type, window.start, window.end)
            .await
            .context("Failed to trigger data collection")?;
        if accepted {
            info!(config_id = %config.id, start = %window.start, end = %window.end, "data collection triggered");
        }
        Ok(accepted)
    }
}
