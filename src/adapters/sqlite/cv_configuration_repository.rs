//! SQLite implementation of the CvConfigurationRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{parse_datetime, parse_json_or_default, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BaselineWindow, ComparisonStrategy, MonitoredConfiguration, VerificationKind,
};
use crate::domain::ports::CvConfigurationRepository;

#[derive(Clone)]
pub struct SqliteCvConfigurationRepository {
    pool: SqlitePool,
}

impl SqliteCvConfigurationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CvConfigurationRepository for SqliteCvConfigurationRepository {
    async fn upsert(&self, config: &MonitoredConfiguration) -> DomainResult<()> {
        let tags_json = serde_json::to_string(&config.tags)?;
        let baseline = config.baseline_or_unset();

        sqlx::query(
            r#"INSERT OR REPLACE INTO cv_configurations (id, account_id, app_id, service_id, name,
               verification_kind, state_type, enabled, comparison_strategy, baseline_start_minute,
               baseline_end_minute, alert_enabled, alert_threshold, snooze_start, snooze_end,
               num_occurrences_for_alert, query, tags, context_id, task_based_collection,
               created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&config.id)
        .bind(&config.account_id)
        .bind(&config.app_id)
        .bind(&config.service_id)
        .bind(&config.name)
        .bind(config.kind.as_str())
        .bind(&config.state_type)
        .bind(config.enabled)
        .bind(config.comparison_strategy.as_str())
        .bind(baseline.start_minute)
        .bind(baseline.end_minute)
        .bind(config.alert_enabled)
        .bind(config.alert_threshold)
        .bind(config.snooze_start.map(|t| t.to_rfc3339()))
        .bind(config.snooze_end.map(|t| t.to_rfc3339()))
        .bind(i64::from(config.num_occurrences_for_alert))
        .bind(&config.query)
        .bind(&tags_json)
        .bind(&config.context_id)
        .bind(config.task_based_collection)
        .bind(config.created_at.to_rfc3339())
        .bind(config.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<MonitoredConfiguration>> {
        let row: Option<CvConfigurationRow> = sqlx::query_as("SELECT * FROM cv_configurations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_enabled(
        &self,
        account_id: &str,
        kind: Option<VerificationKind>,
    ) -> DomainResult<Vec<MonitoredConfiguration>> {
        let rows: Vec<CvConfigurationRow> = sqlx::query_as(
            r#"SELECT * FROM cv_configurations
               WHERE account_id = ? AND enabled = 1 AND (? IS NULL OR verification_kind = ?)
               ORDER BY created_at"#,
        )
        .bind(account_id)
        .bind(kind.map(|k| k.as_str()))
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_all(&self) -> DomainResult<Vec<MonitoredConfiguration>> {
        let rows: Vec<CvConfigurationRow> =
            sqlx::query_as("SELECT * FROM cv_configurations ORDER BY account_id, created_at")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_enabled(&self, id: &str, enabled: bool, at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE cv_configurations SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ConfigurationNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CvConfigurationRow {
    id: String,
    account_id: String,
    app_id: String,
    service_id: String,
    name: String,
    verification_kind: String,
    state_type: String,
    enabled: bool,
    comparison_strategy: String,
    baseline_start_minute: i64,
    baseline_end_minute: i64,
    alert_enabled: bool,
    alert_threshold: f64,
    snooze_start: Option<String>,
    snooze_end: Option<String>,
    num_occurrences_for_alert: i64,
    query: Option<String>,
    tags: Option<String>,
    context_id: Option<String>,
    task_based_collection: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<CvConfigurationRow> for MonitoredConfiguration {
    type Error = DomainError;

    fn try_from(row: CvConfigurationRow) -> Result<Self, Self::Error> {
        let kind = VerificationKind::from_str(&row.verification_kind).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid verification kind: {}", row.verification_kind))
        })?;
        let comparison_strategy = ComparisonStrategy::from_str(&row.comparison_strategy).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid comparison strategy: {}", row.comparison_strategy))
        })?;
        let baseline = (row.baseline_start_minute >= 0 && row.baseline_end_minute >= 0)
            .then(|| BaselineWindow::new(row.baseline_start_minute, row.baseline_end_minute));

        Ok(MonitoredConfiguration {
            id: row.id,
            account_id: row.account_id,
            app_id: row.app_id,
            service_id: row.service_id,
            name: row.name,
            kind,
            state_type: row.state_type,
            enabled: row.enabled,
            comparison_strategy,
            baseline,
            alert_enabled: row.alert_enabled,
            alert_threshold: row.alert_threshold,
            snooze_start: parse_optional_datetime(row.snooze_start)?,
            snooze_end: parse_optional_datetime(row.snooze_end)?,
            num_occurrences_for_alert: u32::try_from(row.num_occurrences_for_alert).unwrap_or(1),
            query: row.query,
            tags: parse_json_or_default(row.tags)?,
            context_id: row.context_id,
            task_based_collection: row.task_based_collection,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
