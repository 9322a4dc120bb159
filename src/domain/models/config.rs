use serde::{Deserialize, Serialize};

/// Main configuration structure for Vigil
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Manager API client configuration
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Scheduler tick and queue configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".vigil/vigil.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Manager API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ManagerConfig {
    /// Base URL of the manager API
    #[serde(default = "default_manager_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_manager_timeout")]
    pub timeout_secs: u64,

    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Maximum number of retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_manager_url() -> String {
    "http://localhost:9090/api".to_string()
}

const fn default_manager_timeout() -> u64 {
    30
}

const fn default_requests_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    20
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            base_url: default_manager_url(),
            timeout_secs: default_manager_timeout(),
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Scheduler tick and queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Seconds between ticks of `vigil run`
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Accounts driven by `vigil run`
    #[serde(default)]
    pub accounts: Vec<String>,

    /// Lease after which a RUNNING analysis task becomes reclaimable
    #[serde(default = "default_visibility_timeout")]
    pub task_visibility_timeout_secs: u64,

    /// Worker attempts before an analysis task fails permanently
    #[serde(default = "default_max_task_retries")]
    pub max_task_retries: u32,

    /// Seconds a collection task may run before it is timed out
    #[serde(default = "default_collection_task_timeout")]
    pub collection_task_timeout_secs: u64,

    /// Age after which a distributed lock record is considered stuck
    #[serde(default = "default_lock_max_age")]
    pub lock_max_age_secs: u64,

    /// Days without collection before a configuration is disabled
    #[serde(default = "default_idle_disable_days")]
    pub idle_disable_days: i64,
}

const fn default_tick_interval() -> u64 {
    60
}

const fn default_visibility_timeout() -> u64 {
    9 * 60
}

const fn default_max_task_retries() -> u32 {
    super::MAX_TASK_RETRIES
}

const fn default_collection_task_timeout() -> u64 {
    30 * 60
}

const fn default_lock_max_age() -> u64 {
    5 * 60
}

const fn default_idle_disable_days() -> i64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            accounts: vec![],
            task_visibility_timeout_secs: default_visibility_timeout(),
            max_task_retries: default_max_task_retries(),
            collection_task_timeout_secs: default_collection_task_timeout(),
            lock_max_age_secs: default_lock_max_age(),
            idle_disable_days: default_idle_disable_days(),
        }
    }
}
