use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid tick_interval_secs: {0}. Must be at least 1")]
    InvalidTickInterval(u64),

    #[error("Invalid task_visibility_timeout_secs: {0}. Must be at least 1")]
    InvalidVisibilityTimeout(u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. vigil.yaml
    /// 3. vigil.local.yaml (optional overrides)
    /// 4. Environment variables (VIGIL_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("vigil.yaml"))
            .merge(Yaml::file("vigil.local.yaml"))
            .merge(Env::prefixed("VIGIL_").split("__"));

        Self::extract(&figment).context("Failed to extract configuration from figment")
    }

    /// Load configuration from a specific file. Environment variables still
    /// take precedence over the file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("VIGIL_").split("__"));

        Self::extract(&figment).with_context(|| format!("Failed to load config from {}", path.display()))
    }

    fn extract(figment: &Figment) -> Result<Config> {
        let config: Config = figment.extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let manager = &config.manager;
        if manager.base_url.is_empty() {
            return Err(ConfigError::ValidationFailed("manager.base_url cannot be empty".to_string()));
        }

        if manager.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(manager.requests_per_second));
        }

        if manager.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(manager.burst_size));
        }

        if manager.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(manager.max_retries));
        }

        if manager.initial_backoff_ms >= manager.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                manager.initial_backoff_ms,
                manager.max_backoff_ms,
            ));
        }

        let scheduler = &config.scheduler;
        if scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidTickInterval(scheduler.tick_interval_secs));
        }

        if scheduler.task_visibility_timeout_secs == 0 {
            return Err(ConfigError::InvalidVisibilityTimeout(
                scheduler.task_visibility_timeout_secs,
            ));
        }

        if scheduler.max_task_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(scheduler.max_task_retries));
        }

        if scheduler.idle_disable_days <= 0 {
            return Err(ConfigError::ValidationFailed(format!(
                "scheduler.idle_disable_days must be positive, got {}",
                scheduler.idle_disable_days
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!((config.manager.requests_per_second - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.database.path, ".vigil/vigil.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.scheduler.task_visibility_timeout_secs, 540);
        assert_eq!(config.scheduler.max_task_retries, 3);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 5
logging:
  level: debug
  format: pretty
manager:
  base_url: http://manager:8080/api
  requests_per_second: 15.0
  burst_size: 30
scheduler:
  tick_interval_secs: 30
  accounts: [acct-1, acct-2]
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.manager.base_url, "http://manager:8080/api");
        assert_eq!(config.manager.burst_size, 30);
        assert_eq!(config.scheduler.accounts, vec!["acct-1", "acct-2"]);
        assert_eq!(config.scheduler.lock_max_age_secs, 300);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_invalid_rotation() {
        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRotation(_)
        ));
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let mut config = Config::default();
        config.manager.requests_per_second = 0.0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRateLimit(_)
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDatabasePath
        ));
    }

    #[test]
    fn test_validate_zero_max_connections() {
        let mut config = Config::default();
        config.database.max_connections = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxConnections(0)
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.manager.initial_backoff_ms = 30000;
        config.manager.max_backoff_ms = 10000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30000, 10000)
        ));
    }

    #[test]
    fn test_validate_zero_tick_and_visibility() {
        let mut config = Config::default();
        config.scheduler.tick_interval_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidTickInterval(0)
        ));

        let mut config = Config::default();
        config.scheduler.task_visibility_timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidVisibilityTimeout(0)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "database:\n  path: /tmp/vigil-test.db\nscheduler:\n  accounts: [acct-9]\n"
        )
        .expect("write config");

        let config = temp_env::with_vars_unset(["VIGIL_DATABASE__PATH"], || {
            ConfigLoader::load_from_file(file.path())
        })
        .expect("config should load");
        assert_eq!(config.database.path, "/tmp/vigil-test.db");
        assert_eq!(config.scheduler.accounts, vec!["acct-9"]);
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = ConfigLoader::load_from_file("/definitely/not/here/vigil.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_override() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "logging:\n  level: warn\n").expect("write config");

        let config = temp_env::with_vars(
            [
                ("VIGIL_LOGGING__LEVEL", Some("debug")),
                ("VIGIL_MANAGER__REQUESTS_PER_SECOND", Some("20.0")),
                ("VIGIL_SCHEDULER__TICK_INTERVAL_SECS", Some("15")),
            ],
            || ConfigLoader::load_from_file(file.path()),
        )
        .expect("config should load");

        assert_eq!(config.logging.level, "debug");
        assert!((config.manager.requests_per_second - 20.0).abs() < f64::EPSILON);
        assert_eq!(config.scheduler.tick_interval_secs, 15);
    }

    #[test]
    fn test_env_override_rejected_by_validation() {
        let result = temp_env::with_var("VIGIL_LOGGING__FORMAT", Some("xml"), ConfigLoader::load);
        assert!(result.is_err());
    }
}
