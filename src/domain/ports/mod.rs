//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - Repositories for configurations, contexts, log records, analysis tasks,
//!   analysis records, collection tasks and lock records
//! - VerificationManager: manager API operations
//! - Clock: injectable time source
//!
//! These traits keep the scheduling logic independent of the store and the
//! transport used to reach the manager.

pub mod analysis_context_repository;
pub mod analysis_record_repository;
pub mod analysis_task_repository;
pub mod clock;
pub mod collection_task_repository;
pub mod cv_configuration_repository;
pub mod lock_repository;
pub mod log_record_repository;
pub mod verification_manager;

pub use analysis_context_repository::AnalysisContextRepository;
pub use analysis_record_repository::AnalysisRecordRepository;
pub use analysis_task_repository::{AnalysisTaskFilters, AnalysisTaskRepository, TaskWindow};
pub use clock::{datetime_to_minute, minute_to_datetime, Clock, ManualClock, SystemClock};
pub use collection_task_repository::CollectionTaskRepository;
pub use cv_configuration_repository::CvConfigurationRepository;
pub use lock_repository::LockRepository;
pub use log_record_repository::LogRecordRepository;
pub use verification_manager::{VerificationManager, WorkflowNotification, DISABLE_LOGML_NEURAL_NET};
