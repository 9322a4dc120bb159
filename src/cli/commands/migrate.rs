//! `vigil migrate`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::sqlite::Migrator;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

use super::open_database;

#[derive(Debug, Serialize)]
pub struct MigrateOutput {
    pub database: String,
    pub schema_version: i64,
}

impl CommandOutput for MigrateOutput {
    fn to_human(&self) -> String {
        format!("Database {} at schema version {}", self.database, self.schema_version)
    }
}

pub async fn execute(config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let schema_version = Migrator::new(pool)
        .get_current_version()
        .await
        .context("Failed to read schema version")?;
    output(
        &MigrateOutput {
            database: config.database.path.clone(),
            schema_version,
        },
        json_mode,
    );
    Ok(())
}
