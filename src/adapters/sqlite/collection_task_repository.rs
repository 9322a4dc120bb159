//! SQLite implementation of the CollectionTaskRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CollectionStatus, CollectionTask};
use crate::domain::ports::CollectionTaskRepository;

#[derive(Clone)]
pub struct SqliteCollectionTaskRepository {
    pool: SqlitePool,
}

impl SqliteCollectionTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CollectionTaskRepository for SqliteCollectionTaskRepository {
    async fn insert(&self, task: &CollectionTask) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO collection_tasks (id, account_id, config_id, status, start_time, end_time,
               retry_count, exception, payload, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.account_id)
        .bind(&task.config_id)
        .bind(task.status.as_str())
        .bind(task.start_time.to_rfc3339())
        .bind(task.end_time.to_rfc3339())
        .bind(i64::from(task.retry_count))
        .bind(&task.exception)
        .bind(serde_json::to_string(&task.payload)?)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<CollectionTask>> {
        let row: Option<CollectionTaskRow> = sqlx::query_as("SELECT * FROM collection_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn claim_next(&self, account_id: &str, now: DateTime<Utc>) -> DomainResult<Option<CollectionTask>> {
        let row: Option<CollectionTaskRow> = sqlx::query_as(
            r#"UPDATE collection_tasks SET status = 'RUNNING', updated_at = ?
               WHERE id = (
                   SELECT id FROM collection_tasks
                   WHERE account_id = ? AND status = 'QUEUED'
                   ORDER BY created_at ASC
                   LIMIT 1
               )
               RETURNING *"#,
        )
        .bind(now.to_rfc3339())
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: CollectionStatus,
        exception: Option<&str>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query("UPDATE collection_tasks SET status = ?, exception = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(exception)
            .bind(at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::CollectionTaskNotFound(id));
        }
        Ok(())
    }

    async fn expire_running_before(&self, account_id: &str, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"UPDATE collection_tasks SET status = 'TIMEOUT', updated_at = ?
               WHERE account_id = ? AND status = 'RUNNING' AND updated_at < ?"#,
        )
        .bind(cutoff.to_rfc3339())
        .bind(account_id)
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn requeue_retryable(&self, account_id: &str, max_retries: u32, at: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"UPDATE collection_tasks SET status = 'QUEUED', retry_count = retry_count + 1, updated_at = ?
               WHERE account_id = ? AND status IN ('FAILED', 'TIMEOUT') AND retry_count < ?"#,
        )
        .bind(at.to_rfc3339())
        .bind(account_id)
        .bind(i64::from(max_retries))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct CollectionTaskRow {
    id: String,
    account_id: String,
    config_id: String,
    status: String,
    start_time: String,
    end_time: String,
    retry_count: i64,
    exception: Option<String>,
    payload: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<CollectionTaskRow> for CollectionTask {
    type Error = DomainError;

    fn try_from(row: CollectionTaskRow) -> Result<Self, Self::Error> {
        let status = CollectionStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid collection status: {}", row.status)))?;

        Ok(CollectionTask {
            id: parse_uuid(&row.id)?,
            account_id: row.account_id,
            config_id: row.config_id,
            status,
            start_time: parse_datetime(&row.start_time)?,
            end_time: parse_datetime(&row.end_time)?,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            exception: row.exception,
            payload: serde_json::from_str(&row.payload)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
