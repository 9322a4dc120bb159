//! Per-configuration "collect now?" decision.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

use crate::domain::models::MonitoredConfiguration;
use crate::domain::ports::{AnalysisTaskRepository, Clock, CvConfigurationRepository};
use crate::services::windowing::is_collection_due;

pub struct CollectionScheduler {
    configs: Arc<dyn CvConfigurationRepository>,
    tasks: Arc<dyn AnalysisTaskRepository>,
    clock: Arc<dyn Clock>,
    idle_disable_after: Duration,
}

impl CollectionScheduler {
    pub fn new(
        configs: Arc<dyn CvConfigurationRepository>,
        tasks: Arc<dyn AnalysisTaskRepository>,
        clock: Arc<dyn Clock>,
        idle_disable_days: i64,
    ) -> Self {
        Self {
            configs,
            tasks,
            clock,
            idle_disable_after: Duration::days(idle_disable_days),
        }
    }

    /// Whether `config` should collect data this tick.
    ///
    /// A configuration that never collected and has been idle past the
    /// disable horizon is disabled. Collection waits while any analysis task
    /// of the configuration is in flight, then follows the graduated
    /// collection grid.
    #[instrument(skip(self, config), fields(config_id = %config.id), err)]
    pub async fn should_collect_data(
        &self,
        config: &MonitoredConfiguration,
        last_collection: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let now = self.clock.now();
        let last_collection = last_collection.filter(|t| t.timestamp() > 0);

        if last_collection.is_none() && config.updated_at < now - self.idle_disable_after {
            self.configs
                .set_enabled(&config.id, false, now)
                .await
                .context("Failed to disable idle configuration")?;
            info!(updated_at = %config.updated_at, "disabled configuration that never collected data");
            return Ok(false);
        }

        if self
            .tasks
            .is_running_or_queued(&config.id, None)
            .await
            .context("Failed to check in-flight analysis tasks")?
        {
            debug!("analysis in flight, holding collection");
            return Ok(false);
        }

        Ok(last_collection.map_or(true, |last| is_collection_due(last, now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteAnalysisTaskRepository, SqliteCvConfigurationRepository,
    };
    use crate::domain::models::{scope_keys, AnalysisTask, AnalysisType, VerificationKind};
    use crate::domain::ports::{minute_to_datetime, ManualClock};

    const MINUTE: i64 = 29_000_000;

    struct Fixture {
        scheduler: CollectionScheduler,
        configs: Arc<SqliteCvConfigurationRepository>,
        tasks: Arc<SqliteAnalysisTaskRepository>,
        clock: ManualClock,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let configs = Arc::new(SqliteCvConfigurationRepository::new(pool.clone()));
        let tasks = Arc::new(SqliteAnalysisTaskRepository::new(pool));
        let clock = ManualClock::at_minute(MINUTE);
        let scheduler = CollectionScheduler::new(configs.clone(), tasks.clone(), Arc::new(clock.clone()), 30);
        Fixture {
            scheduler,
            configs,
            tasks,
            clock,
        }
    }

    fn config(updated_at: DateTime<Utc>) -> MonitoredConfiguration {
        let mut cfg = MonitoredConfiguration::new("cfg", "acct", VerificationKind::TimeSeries, "PROMETHEUS");
        cfg.updated_at = updated_at;
        cfg
    }

    #[tokio::test]
    async fn test_idle_config_without_collection_is_disabled() {
        let f = setup().await;
        let cfg = config(f.clock.now() - Duration::days(31));
        f.configs.upsert(&cfg).await.unwrap();

        assert!(!f.scheduler.should_collect_data(&cfg, None).await.unwrap());
        assert!(!f.configs.get("cfg").await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn test_first_collection_is_allowed() {
        let f = setup().await;
        let cfg = config(f.clock.now());
        assert!(f.scheduler.should_collect_data(&cfg, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_flight_analysis_blocks_collection() {
        let f = setup().await;
        let cfg = config(f.clock.now());
        let task = AnalysisTask::new("acct", scope_keys::time_series("cfg"), AnalysisType::TimeSeries, MINUTE)
            .with_config("cfg", "app");
        f.tasks.enqueue_if_absent(&task).await.unwrap();

        assert!(!f.scheduler.should_collect_data(&cfg, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_graduated_grid_after_last_collection() {
        let f = setup().await;
        let cfg = config(f.clock.now());
        let last = minute_to_datetime(MINUTE);

        // the tolerance admits a collection up to 150s after each grid point
        let expectations = [
            (9, true),
            (11, true),
            (13, false),
            (16, true),
            (18, false),
            (35, false),
            (40, true),
            (64, false),
            (75, true),
        ];
        for (elapsed, expected) in expectations {
            f.clock.set(last + Duration::minutes(elapsed));
            assert_eq!(
                f.scheduler.should_collect_data(&cfg, Some(last)).await.unwrap(),
                expected,
                "elapsed {elapsed} minutes"
            );
        }
    }
}
