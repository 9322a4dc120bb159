//! SQLite implementation of the AnalysisContextRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AnalysisContext, VerificationKind};
use crate::domain::ports::AnalysisContextRepository;

#[derive(Clone)]
pub struct SqliteAnalysisContextRepository {
    pool: SqlitePool,
}

impl SqliteAnalysisContextRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisContextRepository for SqliteAnalysisContextRepository {
    async fn insert(&self, context: &AnalysisContext) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO analysis_contexts (id, account_id, app_id, state_execution_id, correlation_id,
               analysis_type, state_type, query, start_data_collection_minute, time_duration,
               per_min_collection_finished, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&context.id)
        .bind(&context.account_id)
        .bind(&context.app_id)
        .bind(&context.state_execution_id)
        .bind(&context.correlation_id)
        .bind(context.analysis_type.as_str())
        .bind(&context.state_type)
        .bind(&context.query)
        .bind(context.start_data_collection_minute)
        .bind(context.time_duration)
        .bind(context.per_min_collection_finished)
        .bind(context.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<AnalysisContext>> {
        let row: Option<AnalysisContextRow> = sqlx::query_as("SELECT * FROM analysis_contexts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_state_execution(&self, state_execution_id: &str) -> DomainResult<Option<AnalysisContext>> {
        let row: Option<AnalysisContextRow> =
            sqlx::query_as("SELECT * FROM analysis_contexts WHERE state_execution_id = ?")
                .bind(state_execution_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn mark_collection_finished(&self, id: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE analysis_contexts SET per_min_collection_finished = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::ContextNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisContextRow {
    id: String,
    account_id: String,
    app_id: String,
    state_execution_id: String,
    correlation_id: String,
    analysis_type: String,
    state_type: String,
    query: Option<String>,
    start_data_collection_minute: i64,
    time_duration: i64,
    per_min_collection_finished: bool,
    created_at: String,
}

impl TryFrom<AnalysisContextRow> for AnalysisContext {
    type Error = DomainError;

    fn try_from(row: AnalysisContextRow) -> Result<Self, Self::Error> {
        let analysis_type = VerificationKind::from_str(&row.analysis_type).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid analysis type: {}", row.analysis_type))
        })?;
        Ok(AnalysisContext {
            id: row.id,
            account_id: row.account_id,
            app_id: row.app_id,
            state_execution_id: row.state_execution_id,
            correlation_id: row.correlation_id,
            analysis_type,
            state_type: row.state_type,
            query: row.query,
            start_data_collection_minute: row.start_data_collection_minute,
            time_duration: row.time_duration,
            per_min_collection_finished: row.per_min_collection_finished,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
