pub mod alert;
pub mod analysis_context;
pub mod analysis_record;
pub mod analysis_task;
pub mod cluster;
pub mod collection_task;
pub mod config;
pub mod cv_configuration;

pub use alert::{AlertData, AlertKind, LogAnalysisResult, TimeSeriesAnalysisResult, UnknownCluster};
pub use analysis_context::{AnalysisContext, WorkflowNotificationStatus};
pub use analysis_record::{AnalysisRecord, RecordKind};
pub use analysis_task::{
    scope_keys, AnalysisTask, AnalysisType, ClaimFilter, ExecutionStatus, LearningEngineError,
    TaskUrls, MAX_TASK_RETRIES,
};
pub use cluster::{ClusterLevel, LogRecord, LogScope, MinuteOrder, DUMMY_HOST, HEARTBEAT_LABEL};
pub use collection_task::{CollectionStatus, CollectionTask};
pub use config::{Config, DatabaseConfig, LoggingConfig, ManagerConfig, SchedulerConfig};
pub use cv_configuration::{
    should_perform_service_guard_tasks, AccountLicense, AccountStatus, AccountType,
    BaselineWindow, ComparisonStrategy, MonitoredConfiguration, VerificationKind,
};
