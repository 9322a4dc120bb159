//! L1 and L2 log clustering triggers.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tracing::{debug, error, instrument};

use crate::domain::models::{
    scope_keys, AnalysisTask, AnalysisType, ClusterLevel, LogScope, MinuteOrder, MonitoredConfiguration,
    VerificationKind,
};
use crate::services::windowing::{
    is_l1_stale, l1_start_minute, l2_clustering_minute, L2Inputs, ANALYSIS_WINDOW_MINUTES,
};

use super::ContinuousVerificationService;

impl ContinuousVerificationService {
    /// Queue one L1 task per collected minute, listing the hosts that
    /// reported in that minute.
    #[instrument(skip(self), err)]
    pub async fn trigger_log_l1_clustering(&self, account_id: &str) -> Result<usize> {
        let configs = self.service_guard_configs(account_id, VerificationKind::Log).await?;
        let mut created = 0;
        for config in configs.iter().filter(|c| c.requires_clustering()) {
            match self.cluster_l1_for(config).await {
                Ok(n) => created += n,
                Err(e) => error!(config_id = %config.id, error = ?e, "L1 clustering trigger failed"),
            }
        }
        Ok(created)
    }

    async fn cluster_l1_for(&self, config: &MonitoredConfiguration) -> Result<usize> {
        let scope = LogScope::Configuration(config.id.clone());
        let baseline = config.baseline_or_unset();
        let now_minute = self.clock.now_minute();

        let Some(last_collection) = self
            .logs
            .max_minute(&scope)
            .await
            .context("Failed to load last collected log minute")?
        else {
            return Ok(0);
        };
        let Some(min_h0) = self
            .clustering
            .collection_minute_for_level(&scope, ClusterLevel::L1)
            .await?
        else {
            return Ok(0);
        };
        let max_h0 = self
            .logs
            .minute_for_level(&scope, ClusterLevel::H0, MinuteOrder::Latest)
            .await
            .context("Failed to load latest H0 minute")?
            .unwrap_or(min_h0);
        if is_l1_stale(last_collection, max_h0, baseline, now_minute) {
            debug!(config_id = %config.id, last_collection, max_h0, "no fresh logs to cluster");
            return Ok(0);
        }

        let mut created = 0;
        for minute in l1_start_minute(min_h0, baseline, now_minute)..=last_collection {
            let hosts = self
                .logs
                .hosts_for_minute(&scope, minute, &[ClusterLevel::H0])
                .await
                .context("Failed to load H0 hosts")?;
            if hosts.is_empty() {
                self.clustering
                    .save_clustered(&scope, ClusterLevel::L1, minute, None, &[])
                    .await?;
                continue;
            }

            let scope_key = scope_keys::cluster_l1(&config.id, minute);
            let Some(backoff_count) = self
                .learning
                .prepare_window(&scope_key, minute, AnalysisType::LogCluster)
                .await?
            else {
                continue;
            };
            let mut task = AnalysisTask::new(&config.account_id, &scope_key, AnalysisType::LogCluster, minute)
                .with_config(&config.id, &config.app_id)
                .with_start_minute(minute)
                .with_cluster_level(ClusterLevel::L1)
                .with_hosts(hosts)
                .with_backoff_count(backoff_count)
                .with_created_at(self.clock.now());
            task.urls = self
                .urls
                .log_cluster(task.id, &config.id, minute, minute, ClusterLevel::L1);
            if self.learning.add_task(&task).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Queue the next cross-host L2 window once every minute in it has
    /// cleared L1.
    #[instrument(skip(self), err)]
    pub async fn trigger_log_l2_clustering(&self, account_id: &str) -> Result<usize> {
        let configs = self.service_guard_configs(account_id, VerificationKind::Log).await?;
        let mut created = 0;
        for config in configs.iter().filter(|c| c.requires_clustering()) {
            match self.cluster_l2_for(config).await {
                Ok(true) => created += 1,
                Ok(false) => {}
                Err(e) => error!(config_id = %config.id, error = ?e, "L2 clustering trigger failed"),
            }
        }
        Ok(created)
    }

    async fn cluster_l2_for(&self, config: &MonitoredConfiguration) -> Result<bool> {
        let scope = LogScope::Configuration(config.id.clone());
        let inputs = L2Inputs {
            min_h1: self
                .clustering
                .collection_minute_for_level(&scope, ClusterLevel::L2)
                .await?,
            max_h1: self.latest_minute(&scope, ClusterLevel::H1).await?,
            last_h2: self.latest_minute(&scope, ClusterLevel::H2).await?,
            last_hf: self.clustering.last_final_minute(&scope).await?,
        };
        let Some(minute) = l2_clustering_minute(inputs, config.baseline_or_unset(), self.clock.now_minute()) else {
            return Ok(false);
        };
        if !self.clustering.is_ready_for_l2(&scope, minute).await? {
            return Ok(false);
        }

        let scope_key = scope_keys::cluster_l2(&config.id, minute);
        let Some(backoff_count) = self
            .learning
            .prepare_window(&scope_key, minute, AnalysisType::LogCluster)
            .await?
        else {
            return Ok(false);
        };

        let start_minute = minute - ANALYSIS_WINDOW_MINUTES + 1;
        let mut hosts = BTreeSet::new();
        for m in start_minute..=minute {
            hosts.extend(
                self.logs
                    .hosts_for_minute(&scope, m, &[ClusterLevel::H1])
                    .await
                    .context("Failed to load H1 hosts")?,
            );
        }

        let mut task = AnalysisTask::new(&config.account_id, &scope_key, AnalysisType::LogCluster, minute)
            .with_config(&config.id, &config.app_id)
            .with_start_minute(start_minute)
            .with_cluster_level(ClusterLevel::L2)
            .with_hosts(hosts.into_iter().collect())
            .with_backoff_count(backoff_count)
            .with_created_at(self.clock.now());
        task.urls = self
            .urls
            .log_cluster(task.id, &config.id, start_minute, minute, ClusterLevel::L2);
        self.learning.add_task(&task).await
    }

    pub(super) async fn latest_minute(&self, scope: &LogScope, level: ClusterLevel) -> Result<Option<i64>> {
        self.logs
            .minute_for_level(scope, level, MinuteOrder::Latest)
            .await
            .with_context(|| format!("Failed to load latest {level} minute"))
    }
}
