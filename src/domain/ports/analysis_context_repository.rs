use crate::domain::errors::DomainResult;
use crate::domain::models::AnalysisContext;
use async_trait::async_trait;

/// Repository port for workflow-scoped analysis contexts
#[async_trait]
pub trait AnalysisContextRepository: Send + Sync {
    async fn insert(&self, context: &AnalysisContext) -> DomainResult<()>;

    async fn get(&self, id: &str) -> DomainResult<Option<AnalysisContext>>;

    async fn get_by_state_execution(&self, state_execution_id: &str) -> DomainResult<Option<AnalysisContext>>;

    /// Record that per-minute collection for the context has finished
    async fn mark_collection_finished(&self, id: &str) -> DomainResult<()>;
}
