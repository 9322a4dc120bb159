//! Scheduling services for continuous verification.
//!
//! Pure window arithmetic lives in `windowing` and `backoff`; the remaining
//! services wrap the repository and manager ports, and the
//! `continuous_verification` orchestrator composes them into the scheduler
//! entry points.

pub mod alert_service;
pub mod backoff;
pub mod clustering_service;
pub mod collection_scheduler;
pub mod collection_task_service;
pub mod continuous_verification;
pub mod learning_engine_service;
pub mod task_urls;
pub mod windowing;

#[cfg(test)]
pub(crate) mod test_support;

pub use alert_service::{AlertOutcome, AlertService};
pub use clustering_service::{ClusteringService, IngestOutcome};
pub use collection_scheduler::CollectionScheduler;
pub use collection_task_service::CollectionTaskService;
pub use continuous_verification::{ContinuousVerificationService, TriggerKind, VerificationRepositories};
pub use learning_engine_service::{FailureOutcome, LearningEngineService};
pub use task_urls::TaskUrlBuilder;
