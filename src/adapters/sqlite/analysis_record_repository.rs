//! SQLite implementation of the AnalysisRecordRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::parse_datetime;
use crate::domain::errors::DomainResult;
use crate::domain::models::{AnalysisRecord, RecordKind};
use crate::domain::ports::AnalysisRecordRepository;

#[derive(Clone)]
pub struct SqliteAnalysisRecordRepository {
    pool: SqlitePool,
}

impl SqliteAnalysisRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisRecordRepository for SqliteAnalysisRecordRepository {
    async fn save(&self, record: &AnalysisRecord) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT OR REPLACE INTO analysis_records (owner_id, analysis_minute, record_kind, tag,
               risk_score, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.owner_id)
        .bind(record.analysis_minute)
        .bind(record.kind.as_str())
        .bind(&record.tag)
        .bind(record.risk_score)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_minute(&self, owner_id: &str, kind: RecordKind) -> DomainResult<Option<i64>> {
        let (minute,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(analysis_minute) FROM analysis_records WHERE owner_id = ? AND record_kind = ?",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(minute)
    }

    async fn last_created_at(&self, owner_id: &str, kind: RecordKind) -> DomainResult<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT created_at FROM analysis_records WHERE owner_id = ? AND record_kind = ?
               ORDER BY created_at DESC LIMIT 1"#,
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(at,)| parse_datetime(&at)).transpose()
    }

    async fn exists(&self, owner_id: &str, kind: RecordKind, analysis_minute: i64) -> DomainResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"SELECT EXISTS(SELECT 1 FROM analysis_records
               WHERE owner_id = ? AND record_kind = ? AND analysis_minute = ?)"#,
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(analysis_minute)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count_above_threshold(
        &self,
        owner_id: &str,
        kind: RecordKind,
        tag: Option<&str>,
        from_minute: i64,
        to_minute: i64,
        threshold: f64,
    ) -> DomainResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM analysis_records
               WHERE owner_id = ? AND record_kind = ? AND tag = ?
                 AND analysis_minute >= ? AND analysis_minute <= ? AND risk_score > ?"#,
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(tag.unwrap_or_default())
        .bind(from_minute)
        .bind(to_minute)
        .bind(threshold)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_test_repo() -> SqliteAnalysisRecordRepository {
        SqliteAnalysisRecordRepository::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_save_overwrites_same_minute() {
        let repo = setup_test_repo().await;
        repo.save(&AnalysisRecord::new("cfg", 100, RecordKind::LogMl).with_risk(0.2)).await.unwrap();
        repo.save(&AnalysisRecord::new("cfg", 100, RecordKind::LogMl).with_risk(0.9)).await.unwrap();

        assert_eq!(repo.count_above_threshold("cfg", RecordKind::LogMl, None, 0, 200, 0.5).await.unwrap(), 1);
        assert!(repo.exists("cfg", RecordKind::LogMl, 100).await.unwrap());
        assert!(!repo.exists("cfg", RecordKind::TimeSeries, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_last_minute_per_kind() {
        let repo = setup_test_repo().await;
        assert_eq!(repo.last_minute("cfg", RecordKind::TimeSeries).await.unwrap(), None);
        assert!(repo.last_created_at("cfg", RecordKind::TimeSeries).await.unwrap().is_none());

        for minute in [100, 115, 130] {
            repo.save(&AnalysisRecord::new("cfg", minute, RecordKind::TimeSeries).with_tag(Some("web".into())))
                .await
                .unwrap();
        }
        repo.save(&AnalysisRecord::new("cfg", 500, RecordKind::Collected)).await.unwrap();

        assert_eq!(repo.last_minute("cfg", RecordKind::TimeSeries).await.unwrap(), Some(130));
        assert_eq!(repo.last_minute("cfg", RecordKind::Collected).await.unwrap(), Some(500));
        assert!(repo.last_created_at("cfg", RecordKind::Collected).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tags_are_distinct_records() {
        let repo = setup_test_repo().await;
        for tag in ["web", "db"] {
            repo.save(&AnalysisRecord::new("cfg", 100, RecordKind::TimeSeries).with_tag(Some(tag.into())).with_risk(1.0))
                .await
                .unwrap();
        }
        for tag in ["web", "db"] {
            let count = repo
                .count_above_threshold("cfg", RecordKind::TimeSeries, Some(tag), 100, 100, 0.5)
                .await
                .unwrap();
            assert_eq!(count, 1);
        }
        assert_eq!(repo.count_above_threshold("cfg", RecordKind::TimeSeries, None, 100, 100, 0.5).await.unwrap(), 0);
    }
}
