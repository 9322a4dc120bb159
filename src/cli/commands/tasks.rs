//! `vigil tasks list`

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::sqlite::SqliteAnalysisTaskRepository;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::types::TaskCommands;
use crate::domain::models::{AnalysisTask, Config, ExecutionStatus};
use crate::domain::ports::{AnalysisTaskFilters, AnalysisTaskRepository};

use super::open_database;

#[derive(Debug, Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<AnalysisTask>,
    pub total: usize,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }
        format!(
            "Found {} task(s):\n{}",
            self.total,
            TableFormatter::new().format_tasks(&self.tasks)
        )
    }
}

pub async fn execute(command: TaskCommands, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let repo = Arc::new(SqliteAnalysisTaskRepository::new(pool));

    match command {
        TaskCommands::List { status, config_id, limit } => {
            let status = status
                .map(|s| ExecutionStatus::from_str(&s).with_context(|| format!("Unknown task status: {s}")))
                .transpose()?;
            let filters = AnalysisTaskFilters {
                status,
                config_id,
                analysis_type: None,
                limit: Some(limit),
            };
            let tasks = repo.list(filters).await.context("Failed to list tasks")?;
            output(
                &TaskListOutput {
                    total: tasks.len(),
                    tasks,
                },
                json_mode,
            );
        }
    }
    Ok(())
}
