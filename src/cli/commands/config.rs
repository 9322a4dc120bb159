//! `vigil config import|list`

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::sqlite::SqliteCvConfigurationRepository;
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::types::ConfigCommands;
use crate::domain::models::{Config, MonitoredConfiguration};
use crate::domain::ports::CvConfigurationRepository;

use super::open_database;

/// Shape of a configuration import file.
#[derive(Debug, Deserialize)]
pub struct ConfigurationFile {
    pub configurations: Vec<MonitoredConfiguration>,
}

impl ConfigurationFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub imported: usize,
    pub ids: Vec<String>,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        format!("Imported {} configuration(s): {}", self.imported, self.ids.join(", "))
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigListOutput {
    pub configurations: Vec<MonitoredConfiguration>,
    pub total: usize,
}

impl CommandOutput for ConfigListOutput {
    fn to_human(&self) -> String {
        if self.configurations.is_empty() {
            return "No configurations found.".to_string();
        }
        format!(
            "Found {} configuration(s):\n{}",
            self.total,
            TableFormatter::new().format_configurations(&self.configurations)
        )
    }
}

pub async fn execute(command: ConfigCommands, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let repo = Arc::new(SqliteCvConfigurationRepository::new(pool));

    match command {
        ConfigCommands::Import { file } => {
            let parsed = ConfigurationFile::from_path(&file)?;
            let mut ids = Vec::with_capacity(parsed.configurations.len());
            for configuration in &parsed.configurations {
                repo.upsert(configuration)
                    .await
                    .with_context(|| format!("Failed to import configuration {}", configuration.id))?;
                ids.push(configuration.id.clone());
            }
            output(&ImportOutput { imported: ids.len(), ids }, json_mode);
        }
        ConfigCommands::List { enabled_only } => {
            let mut configurations = repo.list_all().await.context("Failed to list configurations")?;
            if enabled_only {
                configurations.retain(|c| c.enabled);
            }
            output(
                &ConfigListOutput {
                    total: configurations.len(),
                    configurations,
                },
                json_mode,
            );
        }
    }
    Ok(())
}
