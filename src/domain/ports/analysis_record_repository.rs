use crate::domain::errors::DomainResult;
use crate::domain::models::{AnalysisRecord, RecordKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository port for per-minute analysis outcomes
#[async_trait]
pub trait AnalysisRecordRepository: Send + Sync {
    /// Insert or overwrite the record for (owner, minute, kind, tag)
    async fn save(&self, record: &AnalysisRecord) -> DomainResult<()>;

    /// Latest analysed minute of a kind for an owner
    async fn last_minute(&self, owner_id: &str, kind: RecordKind) -> DomainResult<Option<i64>>;

    /// When the most recent record of a kind was written
    async fn last_created_at(&self, owner_id: &str, kind: RecordKind) -> DomainResult<Option<DateTime<Utc>>>;

    /// Whether a record exists for the exact minute
    async fn exists(&self, owner_id: &str, kind: RecordKind, analysis_minute: i64) -> DomainResult<bool>;

    /// Count records for one tag in `[from_minute, to_minute]` whose risk
    /// exceeds `threshold`
    async fn count_above_threshold(
        &self,
        owner_id: &str,
        kind: RecordKind,
        tag: Option<&str>,
        from_minute: i64,
        to_minute: i64,
        threshold: f64,
    ) -> DomainResult<i64>;
}
