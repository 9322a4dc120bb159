//! CLI command implementations.

pub mod config;
pub mod migrate;
pub mod run;
pub mod tasks;
pub mod trigger;
pub mod workflow;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::adapters::manager::HttpVerificationManager;
use crate::adapters::sqlite::{
    database_url, initialize_database, PoolConfig, SqliteAnalysisContextRepository, SqliteAnalysisRecordRepository,
    SqliteAnalysisTaskRepository, SqliteCollectionTaskRepository, SqliteCvConfigurationRepository,
    SqliteLockRepository, SqliteLogRecordRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::SystemClock;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{ContinuousVerificationService, TaskUrlBuilder, VerificationRepositories};

/// Load configuration from an explicit file or the default search path.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open the task store, applying pending migrations.
pub async fn open_database(config: &Config) -> Result<SqlitePool> {
    let url = database_url(&config.database.path);
    initialize_database(&url, Some(PoolConfig::from(&config.database)))
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))
}

/// Wire the SQLite repositories, the HTTP manager and the system clock into
/// the scheduler.
pub fn build_service(config: &Config, pool: SqlitePool) -> Result<ContinuousVerificationService> {
    let repos = VerificationRepositories {
        configs: Arc::new(SqliteCvConfigurationRepository::new(pool.clone())),
        contexts: Arc::new(SqliteAnalysisContextRepository::new(pool.clone())),
        logs: Arc::new(SqliteLogRecordRepository::new(pool.clone())),
        records: Arc::new(SqliteAnalysisRecordRepository::new(pool.clone())),
        tasks: Arc::new(SqliteAnalysisTaskRepository::new(pool.clone())),
        collection_tasks: Arc::new(SqliteCollectionTaskRepository::new(pool.clone())),
        locks: Arc::new(SqliteLockRepository::new(pool)),
    };
    let manager = Arc::new(HttpVerificationManager::from_config(&config.manager)?);
    let urls = TaskUrlBuilder::new(&config.manager.base_url)?;
    Ok(ContinuousVerificationService::new(
        repos,
        manager,
        Arc::new(SystemClock),
        config.scheduler.clone(),
        urls,
    ))
}
