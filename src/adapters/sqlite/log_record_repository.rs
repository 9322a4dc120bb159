//! SQLite implementation of the LogRecordRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{parse_datetime, placeholders};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ClusterLevel, LogRecord, LogScope, MinuteOrder};
use crate::domain::ports::LogRecordRepository;

#[derive(Clone)]
pub struct SqliteLogRecordRepository {
    pool: SqlitePool,
}

impl SqliteLogRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn order_sql(order: MinuteOrder) -> &'static str {
    match order {
        MinuteOrder::Earliest => "ASC",
        MinuteOrder::Latest => "DESC",
    }
}

#[async_trait]
impl LogRecordRepository for SqliteLogRecordRepository {
    async fn insert_ignoring_duplicates(&self, records: &[LogRecord]) -> DomainResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for record in records {
            let result = sqlx::query(
                r#"INSERT OR IGNORE INTO log_records (scope_kind, scope_id, state_type, query, host,
                   minute, cluster_level, cluster_label, message, count, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(record.scope.kind_str())
            .bind(record.scope.id())
            .bind(&record.state_type)
            .bind(&record.query)
            .bind(&record.host)
            .bind(record.minute)
            .bind(record.level.as_str())
            .bind(&record.cluster_label)
            .bind(&record.message)
            .bind(record.count)
            .bind(record.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        let skipped = records.len() as u64 - inserted;
        if skipped > 0 {
            tracing::warn!(skipped, "duplicate log records ignored");
        }
        Ok(inserted)
    }

    async fn list(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        start_minute: i64,
        end_minute: i64,
        host: Option<&str>,
    ) -> DomainResult<Vec<LogRecord>> {
        let rows: Vec<LogRecordRow> = sqlx::query_as(
            r#"SELECT * FROM log_records
               WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ?
                 AND minute >= ? AND minute <= ? AND (? IS NULL OR host = ?)
               ORDER BY minute, host, cluster_label"#,
        )
        .bind(scope.kind_str())
        .bind(scope.id())
        .bind(level.as_str())
        .bind(start_minute)
        .bind(end_minute)
        .bind(host)
        .bind(host)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn hosts_for_minute(
        &self,
        scope: &LogScope,
        minute: i64,
        levels: &[ClusterLevel],
    ) -> DomainResult<Vec<String>> {
        if levels.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT host FROM log_records
             WHERE scope_kind = ? AND scope_id = ? AND minute = ? AND cluster_level IN ({})
             ORDER BY host",
            placeholders(levels.len())
        );
        let mut query = sqlx::query_as::<_, (String,)>(&sql)
            .bind(scope.kind_str())
            .bind(scope.id())
            .bind(minute);
        for level in levels {
            query = query.bind(level.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(host,)| host).collect())
    }

    async fn any_in_range(
        &self,
        scope: &LogScope,
        start_minute: i64,
        end_minute: i64,
        levels: &[ClusterLevel],
    ) -> DomainResult<bool> {
        if levels.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM log_records
             WHERE scope_kind = ? AND scope_id = ? AND minute >= ? AND minute <= ?
               AND cluster_level IN ({}))",
            placeholders(levels.len())
        );
        let mut query = sqlx::query_as::<_, (bool,)>(&sql)
            .bind(scope.kind_str())
            .bind(scope.id())
            .bind(start_minute)
            .bind(end_minute);
        for level in levels {
            query = query.bind(level.as_str());
        }
        let (exists,) = query.fetch_one(&self.pool).await?;
        Ok(exists)
    }

    async fn minute_for_level(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        order: MinuteOrder,
    ) -> DomainResult<Option<i64>> {
        let sql = format!(
            "SELECT minute FROM log_records
             WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ?
             ORDER BY minute {} LIMIT 1",
            order_sql(order)
        );
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(scope.kind_str())
            .bind(scope.id())
            .bind(level.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(minute,)| minute))
    }

    async fn max_minute(&self, scope: &LogScope) -> DomainResult<Option<i64>> {
        let (minute,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(minute) FROM log_records WHERE scope_kind = ? AND scope_id = ?")
                .bind(scope.kind_str())
                .bind(scope.id())
                .fetch_one(&self.pool)
                .await?;
        Ok(minute)
    }

    async fn last_created_at(&self, scope: &LogScope) -> DomainResult<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT created_at FROM log_records WHERE scope_kind = ? AND scope_id = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(scope.kind_str())
        .bind(scope.id())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(at,)| parse_datetime(&at)).transpose()
    }

    async fn minute_for_hosts(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        hosts: &[String],
        order: MinuteOrder,
    ) -> DomainResult<Option<i64>> {
        if hosts.is_empty() {
            return self.minute_for_level(scope, level, order).await;
        }
        let sql = format!(
            "SELECT minute FROM log_records
             WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ? AND host IN ({})
             ORDER BY minute {} LIMIT 1",
            placeholders(hosts.len()),
            order_sql(order)
        );
        let mut query = sqlx::query_as::<_, (i64,)>(&sql)
            .bind(scope.kind_str())
            .bind(scope.id())
            .bind(level.as_str());
        for host in hosts {
            query = query.bind(host);
        }
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|(minute,)| minute))
    }

    async fn delete_at_minute(
        &self,
        scope: &LogScope,
        level: ClusterLevel,
        minute: i64,
        host: Option<&str>,
    ) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM log_records
               WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ? AND minute = ?
                 AND (? IS NULL OR host = ?)"#,
        )
        .bind(scope.kind_str())
        .bind(scope.id())
        .bind(level.as_str())
        .bind(minute)
        .bind(host)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_up_to_minute(&self, scope: &LogScope, level: ClusterLevel, max_minute: i64) -> DomainResult<u64> {
        let result = sqlx::query(
            "DELETE FROM log_records WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ? AND minute <= ?",
        )
        .bind(scope.kind_str())
        .bind(scope.id())
        .bind(level.as_str())
        .bind(max_minute)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn bump_heartbeat(
        &self,
        scope: &LogScope,
        minute: i64,
        host: Option<&str>,
        from: ClusterLevel,
        to: ClusterLevel,
    ) -> DomainResult<u64> {
        ensure_heartbeats(from, to)?;
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"UPDATE OR IGNORE log_records SET cluster_level = ?
               WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ? AND minute = ?
                 AND (? IS NULL OR host = ?)"#,
        )
        .bind(to.as_str())
        .bind(scope.kind_str())
        .bind(scope.id())
        .bind(from.as_str())
        .bind(minute)
        .bind(host)
        .bind(host)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // Anything left at `from` collided with a marker already at `to`.
        let duplicates = sqlx::query(
            r#"DELETE FROM log_records
               WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ? AND minute = ?
                 AND (? IS NULL OR host = ?)"#,
        )
        .bind(scope.kind_str())
        .bind(scope.id())
        .bind(from.as_str())
        .bind(minute)
        .bind(host)
        .bind(host)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if duplicates > 0 {
            tracing::warn!(%scope, minute, %from, %to, duplicates, "duplicate heartbeats removed during bump");
        }
        Ok(moved)
    }

    async fn bump_heartbeats_up_to(
        &self,
        scope: &LogScope,
        max_minute: i64,
        from: ClusterLevel,
        to: ClusterLevel,
    ) -> DomainResult<u64> {
        ensure_heartbeats(from, to)?;
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r#"UPDATE OR IGNORE log_records SET cluster_level = ?
               WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ? AND minute <= ?"#,
        )
        .bind(to.as_str())
        .bind(scope.kind_str())
        .bind(scope.id())
        .bind(from.as_str())
        .bind(max_minute)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let duplicates = sqlx::query(
            "DELETE FROM log_records WHERE scope_kind = ? AND scope_id = ? AND cluster_level = ? AND minute <= ?",
        )
        .bind(scope.kind_str())
        .bind(scope.id())
        .bind(from.as_str())
        .bind(max_minute)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if duplicates > 0 {
            tracing::warn!(%scope, max_minute, %from, %to, duplicates, "duplicate heartbeats removed during bump");
        }
        Ok(moved)
    }
}

fn ensure_heartbeats(from: ClusterLevel, to: ClusterLevel) -> DomainResult<()> {
    if from.is_heartbeat() && to.is_heartbeat() {
        Ok(())
    } else {
        Err(DomainError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: "only heartbeat levels can be bumped".to_string(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct LogRecordRow {
    #[allow(dead_code)]
    id: i64,
    scope_kind: String,
    scope_id: String,
    state_type: String,
    query: String,
    host: String,
    minute: i64,
    cluster_level: String,
    cluster_label: String,
    message: String,
    count: i64,
    created_at: String,
}

impl TryFrom<LogRecordRow> for LogRecord {
    type Error = DomainError;

    fn try_from(row: LogRecordRow) -> Result<Self, Self::Error> {
        let scope = LogScope::from_parts(&row.scope_kind, row.scope_id)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid scope kind: {}", row.scope_kind)))?;
        let level = ClusterLevel::from_str(&row.cluster_level)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid cluster level: {}", row.cluster_level)))?;

        Ok(LogRecord {
            scope,
            state_type: row.state_type,
            query: row.query,
            host: row.host,
            minute: row.minute,
            level,
            cluster_label: row.cluster_label,
            message: row.message,
            count: row.count,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_test_repo() -> SqliteLogRecordRepository {
        SqliteLogRecordRepository::new(create_migrated_test_pool().await.unwrap())
    }

    fn scope() -> LogScope {
        LogScope::Configuration("cfg".into())
    }

    fn l0_with_heartbeat(host: &str, minute: i64) -> Vec<LogRecord> {
        vec![
            LogRecord::new(scope(), host, minute, ClusterLevel::L0, "0", "connection refused"),
            LogRecord::heartbeat(scope(), host, minute, ClusterLevel::L0),
        ]
    }

    #[tokio::test]
    async fn test_duplicate_inserts_are_ignored() {
        let repo = setup_test_repo().await;
        assert_eq!(repo.insert_ignoring_duplicates(&l0_with_heartbeat("a", 100)).await.unwrap(), 2);
        assert_eq!(repo.insert_ignoring_duplicates(&l0_with_heartbeat("a", 100)).await.unwrap(), 0);

        let hosts = repo.hosts_for_minute(&scope(), 100, &[ClusterLevel::H0]).await.unwrap();
        assert_eq!(hosts, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_minute_queries() {
        let repo = setup_test_repo().await;
        for (host, minute) in [("a", 100), ("b", 101), ("a", 105)] {
            repo.insert_ignoring_duplicates(&l0_with_heartbeat(host, minute)).await.unwrap();
        }

        assert_eq!(
            repo.minute_for_level(&scope(), ClusterLevel::H0, MinuteOrder::Earliest).await.unwrap(),
            Some(100)
        );
        assert_eq!(
            repo.minute_for_level(&scope(), ClusterLevel::H0, MinuteOrder::Latest).await.unwrap(),
            Some(105)
        );
        assert_eq!(
            repo.minute_for_hosts(&scope(), ClusterLevel::H0, &["b".to_string()], MinuteOrder::Earliest)
                .await
                .unwrap(),
            Some(101)
        );
        assert_eq!(repo.max_minute(&scope()).await.unwrap(), Some(105));
        assert!(repo.any_in_range(&scope(), 101, 104, &[ClusterLevel::L0]).await.unwrap());
        assert!(!repo.any_in_range(&scope(), 102, 104, &[ClusterLevel::L0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_bump_heartbeat_for_one_host() {
        let repo = setup_test_repo().await;
        repo.insert_ignoring_duplicates(&l0_with_heartbeat("a", 100)).await.unwrap();
        repo.insert_ignoring_duplicates(&l0_with_heartbeat("b", 100)).await.unwrap();

        let moved = repo
            .bump_heartbeat(&scope(), 100, Some("a"), ClusterLevel::H0, ClusterLevel::H1)
            .await
            .unwrap();
        assert_eq!(moved, 1);
        assert_eq!(
            repo.hosts_for_minute(&scope(), 100, &[ClusterLevel::H0]).await.unwrap(),
            vec!["b".to_string()]
        );
        assert_eq!(
            repo.hosts_for_minute(&scope(), 100, &[ClusterLevel::H1]).await.unwrap(),
            vec!["a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_bump_collision_drops_duplicate() {
        let repo = setup_test_repo().await;
        repo.insert_ignoring_duplicates(&[
            LogRecord::heartbeat(scope(), "a", 100, ClusterLevel::L0),
            LogRecord::heartbeat(scope(), "a", 100, ClusterLevel::L1),
        ])
        .await
        .unwrap();

        let moved = repo
            .bump_heartbeat(&scope(), 100, Some("a"), ClusterLevel::H0, ClusterLevel::H1)
            .await
            .unwrap();
        assert_eq!(moved, 0);
        assert!(repo.hosts_for_minute(&scope(), 100, &[ClusterLevel::H0]).await.unwrap().is_empty());
        assert_eq!(repo.list(&scope(), ClusterLevel::H1, 100, 100, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bump_rejects_data_levels() {
        let repo = setup_test_repo().await;
        let err = repo
            .bump_heartbeat(&scope(), 100, None, ClusterLevel::L0, ClusterLevel::L1)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn test_bump_and_delete_up_to_minute() {
        let repo = setup_test_repo().await;
        for minute in [100, 101, 120] {
            repo.insert_ignoring_duplicates(&[
                LogRecord::new(scope(), "a", minute, ClusterLevel::L1, "1", "m"),
                LogRecord::heartbeat(scope(), "a", minute, ClusterLevel::L1),
            ])
            .await
            .unwrap();
        }

        assert_eq!(
            repo.bump_heartbeats_up_to(&scope(), 114, ClusterLevel::H1, ClusterLevel::H2).await.unwrap(),
            2
        );
        assert_eq!(repo.delete_up_to_minute(&scope(), ClusterLevel::L1, 114).await.unwrap(), 2);
        assert_eq!(repo.list(&scope(), ClusterLevel::L1, 0, 200, None).await.unwrap().len(), 1);
        assert_eq!(repo.list(&scope(), ClusterLevel::H2, 0, 200, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let repo = setup_test_repo().await;
        repo.insert_ignoring_duplicates(&l0_with_heartbeat("a", 100)).await.unwrap();
        let other = LogScope::StateExecution("cfg".into());
        assert!(repo.hosts_for_minute(&other, 100, &[ClusterLevel::H0]).await.unwrap().is_empty());
        assert_eq!(repo.max_minute(&other).await.unwrap(), None);
    }
}
