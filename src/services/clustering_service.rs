//! Log clustering state machine.
//!
//! Raw records arrive at L0 with one H0 heartbeat per (minute, host). Saving
//! an L1 result deletes the host's L0 rows and bumps its heartbeat to H1;
//! saving an L2 result clears L1 up to the minute and bumps H1 to H2. Log-ML
//! analysis finally bumps H2 to HF. Anything arriving at or below the highest
//! HF minute is stale and discarded.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::domain::models::{
    scope_keys, AnalysisType, ClusterLevel, LogRecord, LogScope, MinuteOrder,
};
use crate::domain::ports::{AnalysisTaskRepository, Clock, LogRecordRepository, TaskWindow};
use crate::services::windowing::ANALYSIS_WINDOW_MINUTES;

const ALL_HEARTBEATS: [ClusterLevel; 4] = [ClusterLevel::H0, ClusterLevel::H1, ClusterLevel::H2, ClusterLevel::HF];

/// Provider that delivers pre-clustered L2 data with its own heartbeats.
const PRECLUSTERED_PROVIDER: &str = "SPLUNKV2";

/// Result of ingesting a batch of collected records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { inserted: u64, discarded: usize },
    /// Every minute in the batch was already clustered; nothing stored.
    AlreadyClustered,
    /// The batch carried no heartbeat and was rejected.
    MissingHeartbeat,
}

pub struct ClusteringService {
    logs: Arc<dyn LogRecordRepository>,
    tasks: Arc<dyn AnalysisTaskRepository>,
    clock: Arc<dyn Clock>,
}

impl ClusteringService {
    pub fn new(
        logs: Arc<dyn LogRecordRepository>,
        tasks: Arc<dyn AnalysisTaskRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { logs, tasks, clock }
    }

    /// Store collected records for `scope`.
    #[instrument(skip(self, scope, records), fields(%scope, count = records.len()), err)]
    pub async fn ingest(
        &self,
        scope: &LogScope,
        state_type: &str,
        level: ClusterLevel,
        records: Vec<LogRecord>,
    ) -> Result<IngestOutcome> {
        let needs_heartbeat = level == ClusterLevel::L0 || state_type.eq_ignore_ascii_case(PRECLUSTERED_PROVIDER);
        if needs_heartbeat && !records.iter().any(LogRecord::is_heartbeat) {
            warn!("rejecting log batch without heartbeat");
            return Ok(IngestOutcome::MissingHeartbeat);
        }

        if level == ClusterLevel::L0 && self.is_already_clustered(scope, &records).await? {
            debug!("log batch already clustered, skipping");
            return Ok(IngestOutcome::AlreadyClustered);
        }

        let final_minute = self.last_final_minute(scope).await?;
        let (fresh, stale): (Vec<LogRecord>, Vec<LogRecord>) = records
            .into_iter()
            .partition(|r| final_minute.map_or(true, |hf| r.minute > hf));

        let stale_minutes: BTreeSet<i64> = stale.iter().map(|r| r.minute).collect();
        for minute in &stale_minutes {
            self.discard_minute(scope, *minute).await?;
        }
        if !stale.is_empty() {
            info!(discarded = stale.len(), final_minute, "discarded stale log records");
        }

        let inserted = self
            .logs
            .insert_ignoring_duplicates(&fresh)
            .await
            .context("Failed to insert log records")?;
        Ok(IngestOutcome::Stored {
            inserted,
            discarded: stale.len(),
        })
    }

    async fn is_already_clustered(&self, scope: &LogScope, records: &[LogRecord]) -> Result<bool> {
        for record in records.iter().filter(|r| r.level == ClusterLevel::H0) {
            let hosts = self
                .logs
                .hosts_for_minute(scope, record.minute, &ALL_HEARTBEATS)
                .await
                .context("Failed to load heartbeat hosts")?;
            // Workflow scopes collect host by host; configurations collect a minute at once.
            let clustered = match scope {
                LogScope::StateExecution(_) => hosts.contains(&record.host),
                LogScope::Configuration(_) => !hosts.is_empty(),
            };
            if clustered {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Highest fully processed minute for the scope.
    pub async fn last_final_minute(&self, scope: &LogScope) -> Result<Option<i64>> {
        self.logs
            .minute_for_level(scope, ClusterLevel::FINAL, MinuteOrder::Latest)
            .await
            .context("Failed to load final heartbeat minute")
    }

    async fn discard_minute(&self, scope: &LogScope, minute: i64) -> Result<()> {
        for level in [ClusterLevel::L0, ClusterLevel::H0] {
            self.logs
                .delete_at_minute(scope, level, minute, None)
                .await
                .context("Failed to delete stale log records")?;
        }
        Ok(())
    }

    /// Apply a clustering result saved by a worker.
    ///
    /// L1 results are per host; once no host is left at L0 for the minute the
    /// L1 task is complete. L2 results cover every minute up to `minute`.
    #[instrument(skip(self, scope, records), fields(%scope), err)]
    pub async fn save_clustered(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        minute: i64,
        host: Option<&str>,
        records: &[LogRecord],
    ) -> Result<()> {
        self.logs
            .insert_ignoring_duplicates(records)
            .await
            .context("Failed to insert clustered records")?;

        match level {
            ClusterLevel::L1 => self.promote_to_l1(scope, minute, host).await,
            ClusterLevel::L2 => self.promote_to_l2(scope, minute).await,
            other => bail!("clustering results cannot be saved at level {other}"),
        }
    }

    async fn promote_to_l1(&self, scope: &LogScope, minute: i64, host: Option<&str>) -> Result<()> {
        self.logs
            .delete_at_minute(scope, ClusterLevel::L0, minute, host)
            .await
            .context("Failed to delete promoted L0 records")?;
        self.logs
            .bump_heartbeat(scope, minute, host, ClusterLevel::H0, ClusterLevel::H1)
            .await
            .context("Failed to bump H0 heartbeat")?;

        let raw_hosts = self
            .logs
            .hosts_for_minute(scope, minute, &[ClusterLevel::L0])
            .await
            .context("Failed to load L0 hosts")?;
        if raw_hosts.is_empty() {
            self.logs.delete_at_minute(scope, ClusterLevel::L0, minute, None).await?;
            self.logs
                .bump_heartbeat(scope, minute, None, ClusterLevel::H0, ClusterLevel::H1)
                .await
                .context("Failed to bump remaining H0 heartbeats")?;
        }

        let pending = self
            .logs
            .hosts_for_minute(scope, minute, &[ClusterLevel::L0, ClusterLevel::H0])
            .await
            .context("Failed to load pending L0 hosts")?;
        if pending.is_empty() {
            let key = scope_keys::cluster_l1(scope.id(), minute);
            self.complete_window(&key, minute, ClusterLevel::L1).await?;
        }
        Ok(())
    }

    async fn promote_to_l2(&self, scope: &LogScope, minute: i64) -> Result<()> {
        self.logs
            .delete_up_to_minute(scope, ClusterLevel::L1, minute)
            .await
            .context("Failed to delete promoted L1 records")?;
        self.logs
            .bump_heartbeats_up_to(scope, minute, ClusterLevel::H1, ClusterLevel::H2)
            .await
            .context("Failed to bump H1 heartbeats")?;
        let key = scope_keys::cluster_l2(scope.id(), minute);
        self.complete_window(&key, minute, ClusterLevel::L2).await
    }

    async fn complete_window(&self, scope_key: &str, minute: i64, level: ClusterLevel) -> Result<()> {
        let window = TaskWindow {
            scope_key,
            analysis_minute: minute,
            analysis_type: AnalysisType::LogCluster,
            cluster_level: Some(level),
        };
        self.tasks
            .mark_window_completed(&window, self.clock.now())
            .await
            .context("Failed to complete clustering task")?;
        Ok(())
    }

    /// Earliest minute waiting for clustering at `level`, dropping stale
    /// minutes on the way.
    pub async fn collection_minute_for_level(&self, scope: &LogScope, level: ClusterLevel) -> Result<Option<i64>> {
        let Some(source) = level.previous().map(|l| l.heartbeat()) else {
            bail!("no clustering pass produces level {level}");
        };
        let final_minute = self.last_final_minute(scope).await?;
        loop {
            let minute = self
                .logs
                .minute_for_level(scope, source, MinuteOrder::Earliest)
                .await
                .context("Failed to load earliest heartbeat minute")?;
            match (minute, final_minute) {
                (Some(m), Some(hf)) if m <= hf => {
                    info!(%scope, minute = m, final_minute = hf, "discarding stale minute");
                    self.discard_minute(scope, m).await?;
                    if source != ClusterLevel::H0 {
                        self.logs.delete_at_minute(scope, source, m, None).await?;
                    }
                }
                (m, _) => return Ok(m),
            }
        }
    }

    /// Whether every minute of the L2 window ending at `l2_minute` has left
    /// L0 and reached L1.
    pub async fn is_ready_for_l2(&self, scope: &LogScope, l2_minute: i64) -> Result<bool> {
        for minute in (l2_minute - ANALYSIS_WINDOW_MINUTES + 1)..=l2_minute {
            let raw = self
                .logs
                .hosts_for_minute(scope, minute, &[ClusterLevel::L0, ClusterLevel::H0])
                .await
                .context("Failed to load L0 hosts")?;
            if !raw.is_empty() {
                debug!(%scope, minute, "L2 deferred, L0 still pending");
                return Ok(false);
            }
            let clustered = self
                .logs
                .hosts_for_minute(scope, minute, &[ClusterLevel::L1, ClusterLevel::H1])
                .await
                .context("Failed to load L1 hosts")?;
            if clustered.is_empty() {
                debug!(%scope, minute, "L2 deferred, no L1 data yet");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
