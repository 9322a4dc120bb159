//! `vigil workflow collect|done`

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::WorkflowCommands;
use crate::domain::models::Config;

use super::{build_service, open_database};

#[derive(Debug, Serialize)]
pub struct WorkflowOutput {
    pub context_id: String,
    pub action: &'static str,
    pub result: bool,
}

impl CommandOutput for WorkflowOutput {
    fn to_human(&self) -> String {
        match (self.action, self.result) {
            ("collect", true) => format!("Collection triggered for context {}", self.context_id),
            ("collect", false) => format!("Nothing left to collect for context {}", self.context_id),
            _ => format!("Context {} marked collected", self.context_id),
        }
    }
}

pub async fn execute(command: WorkflowCommands, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let service = build_service(config, pool)?;

    let out = match command {
        WorkflowCommands::Collect { context_id } => {
            let context = service.analysis_context(&context_id).await?;
            let result = service.trigger_workflow_data_collection(&context).await?;
            WorkflowOutput {
                context_id,
                action: "collect",
                result,
            }
        }
        WorkflowCommands::Done { context_id } => {
            service.mark_workflow_data_collection_done(&context_id).await?;
            WorkflowOutput {
                context_id,
                action: "done",
                result: true,
            }
        }
    };
    output(&out, json_mode);
    Ok(())
}
