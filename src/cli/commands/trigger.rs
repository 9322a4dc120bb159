//! `vigil trigger <entry-point> --account <id>`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::TriggerCommands;
use crate::domain::models::Config;

use super::{build_service, open_database};

#[derive(Debug, Serialize)]
pub struct TriggerOutput {
    pub trigger: String,
    pub account_id: String,
    pub produced: u64,
}

impl CommandOutput for TriggerOutput {
    fn to_human(&self) -> String {
        format!("{} for {}: {} produced", self.trigger, self.account_id, self.produced)
    }
}

pub async fn execute(entry: TriggerCommands, account: Option<String>, config: &Config, json_mode: bool) -> Result<()> {
    let account_id = account.context("--account is required")?;
    let pool = open_database(config).await?;
    let service = build_service(config, pool)?;

    let kind = entry.kind();
    let produced = service.run_trigger(kind, &account_id).await?;
    output(
        &TriggerOutput {
            trigger: kind.to_string(),
            account_id,
            produced,
        },
        json_mode,
    );
    Ok(())
}
