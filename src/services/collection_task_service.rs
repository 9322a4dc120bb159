//! Task-based data collection queue.
//!
//! Configurations with task based collection enqueue a [`CollectionTask`]
//! instead of calling the collector directly. Each tick drains the queue
//! for an account, expires stuck tasks and requeues retryable ones.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::domain::models::{CollectionStatus, CollectionTask, MonitoredConfiguration};
use crate::domain::ports::{Clock, CollectionTaskRepository, VerificationManager};

pub struct CollectionTaskService {
    tasks: Arc<dyn CollectionTaskRepository>,
    manager: Arc<dyn VerificationManager>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    max_retries: u32,
}

impl CollectionTaskService {
    pub fn new(
        tasks: Arc<dyn CollectionTaskRepository>,
        manager: Arc<dyn VerificationManager>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            tasks,
            manager,
            clock,
            timeout,
            max_retries,
        }
    }

    /// Queue a collection of `[start, end]` for `config`.
    #[instrument(skip(self, config), fields(config_id = %config.id), err)]
    pub async fn create(
        &self,
        config: &MonitoredConfiguration,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CollectionTask> {
        let payload = json!({
            "cvConfigId": config.id,
            "accountId": config.account_id,
            "stateType": config.state_type,
            "verificationType": config.kind.as_str(),
            "query": config.query,
            "startTime": start.timestamp_millis(),
            "endTime": end.timestamp_millis(),
        });
        let task = CollectionTask::new(&config.account_id, &config.id, start, end)
            .with_payload(payload)
            .with_created_at(self.clock.now());
        self.tasks.insert(&task).await.context("Failed to queue collection task")?;
        info!(task_id = %task.id, "collection task queued");
        Ok(task)
    }

    /// Claim queued tasks for the account one by one and hand each to the
    /// collector. A rejected or failed hand-off marks the task FAILED so the
    /// retry pass can pick it up.
    #[instrument(skip(self), err)]
    pub async fn process_next_tasks(&self, account_id: &str) -> Result<usize> {
        let mut processed = 0;
        while let Some(task) = self
            .tasks
            .claim_next(account_id, self.clock.now())
            .await
            .context("Failed to claim collection task")?
        {
            processed += 1;
            match self.manager.collect_cv_data(task.id, &task.payload).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(task_id = %task.id, "collector declined collection task");
                    self.fail(&task, "collector declined task").await?;
                }
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "collection hand-off failed");
                    self.fail(&task, &e.to_string()).await?;
                }
            }
        }
        Ok(processed)
    }

    async fn fail(&self, task: &CollectionTask, reason: &str) -> Result<()> {
        self.tasks
            .update_status(task.id, CollectionStatus::Failed, Some(reason), self.clock.now())
            .await
            .context("Failed to mark collection task failed")
    }

    /// Mark tasks RUNNING for longer than the timeout as TIMEOUT.
    #[instrument(skip(self), err)]
    pub async fn expire_long_running_tasks(&self, account_id: &str) -> Result<u64> {
        let expired = self
            .tasks
            .expire_running_before(account_id, self.clock.now() - self.timeout)
            .await
            .context("Failed to expire collection tasks")?;
        if expired > 0 {
            warn!(expired, "collection tasks timed out");
        }
        Ok(expired)
    }

    /// Requeue FAILED or TIMEOUT tasks still under the retry limit.
    #[instrument(skip(self), err)]
    pub async fn retry_tasks(&self, account_id: &str) -> Result<u64> {
        let requeued = self
            .tasks
            .requeue_retryable(account_id, self.max_retries, self.clock.now())
            .await
            .context("Failed to requeue collection tasks")?;
        if requeued > 0 {
            info!(requeued, "collection tasks requeued");
        }
        Ok(requeued)
    }
}
