//! Per-minute data collection for workflow analysis contexts.

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument};

use crate::domain::models::{AnalysisContext, AnalysisRecord, LogScope, RecordKind, VerificationKind};

use super::ContinuousVerificationService;

impl ContinuousVerificationService {
    /// Trigger collection of the next minute for a workflow context.
    ///
    /// Returns false when the workflow state is gone or every minute of the
    /// context has been collected. Manager failures are logged and still
    /// count as triggered, so the workflow keeps polling.
    #[instrument(skip(self, context), fields(context_id = %context.id), err)]
    pub async fn trigger_workflow_data_collection(&self, context: &AnalysisContext) -> Result<bool> {
        let valid = self
            .manager
            .is_state_valid(&context.app_id, &context.state_execution_id)
            .await
            .context("Failed to check workflow state")?;
        if !valid {
            info!("workflow state no longer valid");
            return Ok(false);
        }

        let last_minute = match context.analysis_type {
            VerificationKind::Log => self
                .logs
                .max_minute(&LogScope::StateExecution(context.state_execution_id.clone()))
                .await
                .context("Failed to load last workflow log minute")?,
            VerificationKind::TimeSeries => self
                .records
                .last_minute(&context.state_execution_id, RecordKind::Collected)
                .await
                .context("Failed to load last workflow collection minute")?,
        };

        let start = context.start_data_collection_minute;
        let next_minute = match last_minute {
            None => start,
            Some(last) if last - start < context.time_duration - 1 => last + 1,
            Some(last) => {
                debug!(last, "workflow collection complete");
                return Ok(false);
            }
        };

        match self
            .manager
            .trigger_workflow_data_collection(&context.id, next_minute)
            .await
        {
            Ok(_) => {
                if context.analysis_type == VerificationKind::TimeSeries {
                    let record = AnalysisRecord::new(&context.state_execution_id, next_minute, RecordKind::Collected)
                        .with_created_at(self.clock.now());
                    self.records
                        .save(&record)
                        .await
                        .context("Failed to record workflow collection")?;
                }
                debug!(next_minute, "workflow collection triggered");
            }
            Err(e) => error!(next_minute, error = %e, "workflow collection trigger failed"),
        }
        Ok(true)
    }

    /// Mark a context's per-minute collection finished.
    #[instrument(skip(self), err)]
    pub async fn mark_workflow_data_collection_done(&self, context_id: &str) -> Result<()> {
        self.contexts
            .mark_collection_finished(context_id)
            .await
            .context("Failed to mark workflow collection finished")?;
        info!("workflow data collection done");
        Ok(())
    }

    /// Load a context by id for operator commands.
    pub async fn analysis_context(&self, context_id: &str) -> Result<AnalysisContext> {
        self.contexts
            .get(context_id)
            .await
            .context("Failed to load analysis context")?
            .ok_or_else(|| crate::domain::errors::DomainError::ContextNotFound(context_id.to_string()).into())
    }
}
