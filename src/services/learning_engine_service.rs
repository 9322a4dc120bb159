//! Queue operations for analysis tasks: the enqueue gate, worker claims,
//! completion, failure handling and the backoff that spaces out re-creation
//! of failed windows.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{
    AnalysisTask, AnalysisType, ClaimFilter, ClusterLevel, ExecutionStatus, LearningEngineError,
    WorkflowNotificationStatus,
};
use crate::domain::ports::{
    AnalysisContextRepository, AnalysisTaskRepository, Clock, TaskWindow, VerificationManager, WorkflowNotification,
};
use crate::services::backoff::{backoff_sequence, is_past_backoff, next_backoff_count};

/// Result of a failure report from a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back in the queue for another attempt.
    Requeued,
    /// Retries exhausted; the task is terminally failed.
    Failed,
}

pub struct LearningEngineService {
    tasks: Arc<dyn AnalysisTaskRepository>,
    contexts: Arc<dyn AnalysisContextRepository>,
    manager: Arc<dyn VerificationManager>,
    clock: Arc<dyn Clock>,
    visibility_timeout: Duration,
    max_retries: u32,
}

impl LearningEngineService {
    pub fn new(
        tasks: Arc<dyn AnalysisTaskRepository>,
        contexts: Arc<dyn AnalysisContextRepository>,
        manager: Arc<dyn VerificationManager>,
        clock: Arc<dyn Clock>,
        visibility_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            tasks,
            contexts,
            manager,
            clock,
            visibility_timeout,
            max_retries,
        }
    }

    /// Enqueue `task` unless another task already covers its window.
    ///
    /// A unique-key race with another scheduler counts as "not created".
    #[instrument(skip(self, task), fields(scope_key = %task.scope_key, minute = task.analysis_minute), err)]
    pub async fn add_task(&self, task: &AnalysisTask) -> Result<bool> {
        match self.tasks.enqueue_if_absent(task).await {
            Ok(true) => {
                info!(task_id = %task.id, analysis_type = %task.analysis_type, "analysis task queued");
                Ok(true)
            }
            Ok(false) => {
                debug!("window already covered by an existing task");
                Ok(false)
            }
            Err(DomainError::DuplicateKey(key)) => {
                warn!(key = %key, "lost enqueue race, task already present");
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to enqueue analysis task"),
        }
    }

    /// Claim the next runnable task for a worker.
    ///
    /// Tasks whose last lease expired without a report are failed first and
    /// their workflows told, the same as an exhausted failure report.
    #[instrument(skip(self), err)]
    pub async fn next_task(&self, filter: &ClaimFilter) -> Result<Option<AnalysisTask>> {
        let now = self.clock.now();
        let exhausted = self
            .tasks
            .fail_exhausted_leases(self.visibility_timeout, self.max_retries, now)
            .await
            .context("Failed to fail exhausted analysis tasks")?;
        for task in &exhausted {
            warn!(task_id = %task.id, retry = task.retry, "analysis task lease expired on its last attempt");
            let error_msg = format!("analysis task lease expired after {} attempts", task.retry);
            if let Err(e) = self.notify_workflow_of_failure(task, &error_msg, task.analysis_minute).await {
                error!(task_id = %task.id, error = ?e, "failed to notify workflow of expired task");
            }
        }

        self.tasks
            .claim_next(filter, self.visibility_timeout, self.max_retries, now)
            .await
            .context("Failed to claim analysis task")
    }

    pub async fn task(&self, task_id: Uuid) -> Result<Option<AnalysisTask>> {
        self.tasks.get(task_id).await.context("Failed to load analysis task")
    }

    /// Mark the window's task SUCCESS.
    #[instrument(skip(self), err)]
    pub async fn mark_completed(
        &self,
        scope_key: &str,
        analysis_minute: i64,
        analysis_type: AnalysisType,
        cluster_level: Option<ClusterLevel>,
    ) -> Result<u64> {
        let window = TaskWindow {
            scope_key,
            analysis_minute,
            analysis_type,
            cluster_level,
        };
        self.tasks
            .mark_window_completed(&window, self.clock.now())
            .await
            .context("Failed to mark analysis window completed")
    }

    /// Mark a single task SUCCESS by id.
    pub async fn mark_task_completed(&self, task_id: Uuid) -> Result<()> {
        self.tasks
            .update_status(task_id, ExecutionStatus::Success, self.clock.now())
            .await
            .with_context(|| format!("Failed to complete task {task_id}"))
    }

    /// Handle a worker's failure report.
    ///
    /// Below the retry ceiling the task is requeued. At the ceiling it is
    /// failed and, when it belongs to a workflow, that workflow is told.
    #[instrument(skip(self, error), fields(minute = error.analysis_minute), err)]
    pub async fn notify_failure(&self, task_id: Uuid, error: &LearningEngineError) -> Result<FailureOutcome> {
        let task = self
            .tasks
            .get(task_id)
            .await
            .context("Failed to load analysis task")?
            .ok_or(DomainError::TaskNotFound(task_id))?;
        let now = self.clock.now();

        if task.retry < self.max_retries {
            self.tasks
                .update_status(task_id, ExecutionStatus::Queued, now)
                .await
                .context("Failed to requeue analysis task")?;
            info!(retry = task.retry, error_msg = %error.error_msg, "analysis task requeued after failure");
            return Ok(FailureOutcome::Requeued);
        }

        self.tasks
            .update_status(task_id, ExecutionStatus::Failed, now)
            .await
            .context("Failed to fail analysis task")?;
        warn!(retry = task.retry, error_msg = %error.error_msg, "analysis task failed permanently");

        self.notify_workflow_of_failure(&task, &error.error_msg, error.analysis_minute)
            .await?;
        Ok(FailureOutcome::Failed)
    }

    /// Tell the owning workflow, if any, that `task` failed for good.
    async fn notify_workflow_of_failure(&self, task: &AnalysisTask, error_msg: &str, analysis_minute: i64) -> Result<()> {
        let Some(state_execution_id) = task.workflow_execution_id.as_deref() else {
            return Ok(());
        };
        let context = self
            .contexts
            .get_by_state_execution(state_execution_id)
            .await
            .context("Failed to load analysis context")?;
        if let Some(context) = context {
            let notification = WorkflowNotification::new(&context, WorkflowNotificationStatus::Error)
                .with_error(error_msg.to_string(), Some(analysis_minute));
            self.manager
                .notify_workflow(&notification)
                .await
                .context("Failed to notify workflow of task failure")?;
        }
        Ok(())
    }

    /// Fork any failed or stuck-retrying task for the window so a fresh one
    /// can be created.
    pub async fn check_and_update_failed(&self, scope_key: &str, analysis_minute: i64) -> Result<u64> {
        let forked = self
            .tasks
            .fork_failed(scope_key, analysis_minute, self.visibility_timeout, self.clock.now())
            .await
            .context("Failed to fork failed analysis tasks")?;
        if forked > 0 {
            info!(scope_key, analysis_minute, forked, "forked failed analysis task");
        }
        Ok(forked)
    }

    /// Backoff count for the next task of this window: one step past the
    /// latest fork, or the first step when the window never failed.
    pub async fn next_backoff_count(
        &self,
        scope_key: &str,
        analysis_minute: i64,
        analysis_type: AnalysisType,
    ) -> Result<u32> {
        let fork = self
            .tasks
            .latest_fork(scope_key, analysis_minute, analysis_type)
            .await
            .context("Failed to load latest fork")?;
        Ok(fork.map_or(backoff_sequence()[0], |f| next_backoff_count(f.backoff_count)))
    }

    /// Whether the backoff of the latest fork has elapsed.
    pub async fn is_eligible_to_create_task(
        &self,
        scope_key: &str,
        analysis_minute: i64,
        analysis_type: AnalysisType,
    ) -> Result<bool> {
        let fork = self
            .tasks
            .latest_fork(scope_key, analysis_minute, analysis_type)
            .await
            .context("Failed to load latest fork")?;
        Ok(fork.map_or(true, |f| is_past_backoff(f.updated_at, f.backoff_count, self.clock.now())))
    }

    /// Fork failures, then check backoff. Returns the backoff count for the
    /// new task, or `None` while the window is still backing off.
    pub async fn prepare_window(
        &self,
        scope_key: &str,
        analysis_minute: i64,
        analysis_type: AnalysisType,
    ) -> Result<Option<u32>> {
        self.check_and_update_failed(scope_key, analysis_minute).await?;
        if !self
            .is_eligible_to_create_task(scope_key, analysis_minute, analysis_type)
            .await?
        {
            debug!(scope_key, analysis_minute, "window still backing off");
            return Ok(None);
        }
        self.next_backoff_count(scope_key, analysis_minute, analysis_type)
            .await
            .map(Some)
    }

    pub async fn is_task_running_or_queued(&self, config_id: &str, since_minute: Option<i64>) -> Result<bool> {
        self.tasks
            .is_running_or_queued(config_id, since_minute)
            .await
            .context("Failed to check in-flight analysis tasks")
    }
}
