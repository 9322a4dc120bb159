//! SQLite implementation of the AnalysisTaskRepository.
//!
//! The enqueue gate is a single `INSERT ... SELECT ... WHERE NOT EXISTS`
//! statement and the claim is a single `UPDATE ... RETURNING`, so both are
//! atomic under SQLite's one-writer locking without an application lock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_json_or_default, parse_uuid, placeholders};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnalysisTask, AnalysisType, ClaimFilter, ClusterLevel, ExecutionStatus, TaskUrls,
};
use crate::domain::ports::{AnalysisTaskFilters, AnalysisTaskRepository, TaskWindow};

#[derive(Clone)]
pub struct SqliteAnalysisTaskRepository {
    pool: SqlitePool,
}

impl SqliteAnalysisTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisTaskRepository for SqliteAnalysisTaskRepository {
    async fn enqueue_if_absent(&self, task: &AnalysisTask) -> DomainResult<bool> {
        let hosts_json = serde_json::to_string(&task.hosts)?;
        let urls_json = serde_json::to_string(&task.urls)?;
        let cluster_level = task.cluster_level.map(|l| l.level());

        // The newest matching task blocks unless it is a SUCCESS for an earlier minute.
        let result = sqlx::query(
            r#"INSERT INTO analysis_tasks (id, account_id, app_id, config_id, workflow_execution_id,
               scope_key, attempt, analysis_minute, analysis_start_minute, analysis_type, cluster_level,
               status, retry, backoff_count, version, is_24x7, tag, hosts, alert_threshold, priority,
               urls, created_at, updated_at)
               SELECT ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, 'QUEUED', 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
               WHERE NOT EXISTS (
                   SELECT 1 FROM (
                       SELECT status, analysis_minute FROM analysis_tasks
                       WHERE scope_key = ? AND analysis_type = ? AND cluster_level IS ?
                         AND version = ? AND tag IS ? AND analysis_minute <= ?
                         AND status IN ('RUNNING', 'QUEUED', 'SUCCESS')
                       ORDER BY created_at DESC, rowid DESC
                       LIMIT 1
                   ) latest
                   WHERE NOT (latest.status = 'SUCCESS' AND latest.analysis_minute < ?)
               )"#,
        )
        .bind(task.id.to_string())
        .bind(&task.account_id)
        .bind(&task.app_id)
        .bind(&task.config_id)
        .bind(&task.workflow_execution_id)
        .bind(&task.scope_key)
        .bind(task.analysis_minute)
        .bind(task.analysis_start_minute)
        .bind(task.analysis_type.as_str())
        .bind(cluster_level)
        .bind(i64::from(task.backoff_count))
        .bind(task.version)
        .bind(task.is_24x7)
        .bind(&task.tag)
        .bind(&hosts_json)
        .bind(task.alert_threshold)
        .bind(task.priority)
        .bind(&urls_json)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(&task.scope_key)
        .bind(task.analysis_type.as_str())
        .bind(cluster_level)
        .bind(task.version)
        .bind(&task.tag)
        .bind(task.analysis_minute)
        .bind(task.analysis_minute)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_exhausted_leases(
        &self,
        visibility_timeout: Duration,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<AnalysisTask>> {
        let rows: Vec<AnalysisTaskRow> = sqlx::query_as(
            r#"UPDATE analysis_tasks SET status = 'FAILED', updated_at = ?
               WHERE status = 'RUNNING' AND updated_at < ? AND retry >= ?
               RETURNING *"#,
        )
        .bind(now.to_rfc3339())
        .bind((now - visibility_timeout).to_rfc3339())
        .bind(i64::from(max_retries))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn claim_next(
        &self,
        filter: &ClaimFilter,
        visibility_timeout: Duration,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<AnalysisTask>> {
        let lease_cutoff = (now - visibility_timeout).to_rfc3339();
        let now_str = now.to_rfc3339();

        let type_clause = if filter.analysis_types.is_empty() {
            String::new()
        } else {
            format!("AND analysis_type IN ({})", placeholders(filter.analysis_types.len()))
        };
        let sql = format!(
            r#"UPDATE analysis_tasks SET status = 'RUNNING', retry = retry + 1, updated_at = ?
               WHERE id = (
                   SELECT id FROM analysis_tasks
                   WHERE retry < ?
                     AND (status = 'QUEUED' OR (status = 'RUNNING' AND updated_at < ?))
                     AND (? IS NULL OR is_24x7 = ?)
                     {type_clause}
                   ORDER BY priority DESC, created_at ASC
                   LIMIT 1
               )
               RETURNING *"#
        );

        let mut query = sqlx::query_as::<_, AnalysisTaskRow>(&sql)
            .bind(&now_str)
            .bind(i64::from(max_retries))
            .bind(&lease_cutoff)
            .bind(filter.is_24x7)
            .bind(filter.is_24x7);
        for analysis_type in &filter.analysis_types {
            query = query.bind(analysis_type.as_str());
        }
        let row = query.fetch_optional(&self.pool).await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<AnalysisTask>> {
        let row: Option<AnalysisTaskRow> = sqlx::query_as("SELECT * FROM analysis_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filters: AnalysisTaskFilters) -> DomainResult<Vec<AnalysisTask>> {
        let rows: Vec<AnalysisTaskRow> = sqlx::query_as(
            r#"SELECT * FROM analysis_tasks
               WHERE (? IS NULL OR status = ?)
                 AND (? IS NULL OR config_id = ?)
                 AND (? IS NULL OR analysis_type = ?)
               ORDER BY created_at DESC
               LIMIT ?"#,
        )
        .bind(filters.status.map(|s| s.as_str()))
        .bind(filters.status.map(|s| s.as_str()))
        .bind(&filters.config_id)
        .bind(&filters.config_id)
        .bind(filters.analysis_type.map(|t| t.as_str()))
        .bind(filters.analysis_type.map(|t| t.as_str()))
        .bind(filters.limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_status(&self, id: Uuid, status: ExecutionStatus, at: DateTime<Utc>) -> DomainResult<()> {
        let current = self.get(id).await?.ok_or(DomainError::TaskNotFound(id))?;
        if current.status != status && !current.status.can_transition_to(status) {
            return Err(DomainError::InvalidStateTransition {
                from: current.status.to_string(),
                to: status.to_string(),
                reason: "transition not allowed".to_string(),
            });
        }

        sqlx::query("UPDATE analysis_tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_window_completed(&self, window: &TaskWindow<'_>, at: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"UPDATE analysis_tasks SET status = 'SUCCESS', updated_at = ?
               WHERE scope_key = ? AND analysis_minute = ? AND analysis_type = ?
                 AND cluster_level IS ? AND attempt = 0 AND status IN ('QUEUED', 'RUNNING')"#,
        )
        .bind(at.to_rfc3339())
        .bind(window.scope_key)
        .bind(window.analysis_minute)
        .bind(window.analysis_type.as_str())
        .bind(window.cluster_level.map(|l| l.level()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn fork_failed(
        &self,
        scope_key: &str,
        analysis_minute: i64,
        visibility_timeout: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<u64> {
        let lease_cutoff = (now - visibility_timeout).to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let candidates: Vec<(String,)> = sqlx::query_as(
            r#"SELECT id FROM analysis_tasks
               WHERE scope_key = ? AND analysis_minute = ? AND attempt = 0
                 AND (status = 'FAILED'
                      OR (status = 'RUNNING' AND retry >= 1 AND updated_at >= ?))
               ORDER BY created_at"#,
        )
        .bind(scope_key)
        .bind(analysis_minute)
        .bind(&lease_cutoff)
        .fetch_all(&mut *tx)
        .await?;

        for (id,) in &candidates {
            sqlx::query(
                r#"UPDATE analysis_tasks
                   SET attempt = (SELECT MAX(attempt) + 1 FROM analysis_tasks
                                  WHERE scope_key = ? AND analysis_minute = ?),
                       status = 'FAILED', updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(scope_key)
            .bind(analysis_minute)
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(candidates.len() as u64)
    }

    async fn latest_fork(
        &self,
        scope_key: &str,
        analysis_minute: i64,
        analysis_type: AnalysisType,
    ) -> DomainResult<Option<AnalysisTask>> {
        let row: Option<AnalysisTaskRow> = sqlx::query_as(
            r#"SELECT * FROM analysis_tasks
               WHERE scope_key = ? AND analysis_minute = ? AND analysis_type = ? AND attempt > 0
               ORDER BY attempt DESC
               LIMIT 1"#,
        )
        .bind(scope_key)
        .bind(analysis_minute)
        .bind(analysis_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn is_running_or_queued(&self, config_id: &str, since_minute: Option<i64>) -> DomainResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"SELECT EXISTS(SELECT 1 FROM analysis_tasks
               WHERE config_id = ? AND status IN ('QUEUED', 'RUNNING')
                 AND (? IS NULL OR analysis_minute >= ?))"#,
        )
        .bind(config_id)
        .bind(since_minute)
        .bind(since_minute)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count_for_scope(&self, scope_key: &str, status: Option<ExecutionStatus>) -> DomainResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM analysis_tasks WHERE scope_key = ? AND (? IS NULL OR status = ?)",
        )
        .bind(scope_key)
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisTaskRow {
    id: String,
    account_id: String,
    app_id: String,
    config_id: Option<String>,
    workflow_execution_id: Option<String>,
    scope_key: String,
    attempt: i64,
    analysis_minute: i64,
    analysis_start_minute: Option<i64>,
    analysis_type: String,
    cluster_level: Option<i32>,
    status: String,
    retry: i64,
    backoff_count: i64,
    version: i32,
    is_24x7: bool,
    tag: Option<String>,
    hosts: Option<String>,
    alert_threshold: Option<f64>,
    priority: i32,
    urls: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AnalysisTaskRow> for AnalysisTask {
    type Error = DomainError;

    fn try_from(row: AnalysisTaskRow) -> Result<Self, Self::Error> {
        let analysis_type = AnalysisType::from_str(&row.analysis_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid analysis type: {}", row.analysis_type)))?;
        let status = ExecutionStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let cluster_level = row
            .cluster_level
            .map(|level| {
                ClusterLevel::from_level(level)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid cluster level: {level}")))
            })
            .transpose()?;
        let urls: TaskUrls = parse_json_or_default(row.urls)?;

        Ok(AnalysisTask {
            id: parse_uuid(&row.id)?,
            account_id: row.account_id,
            app_id: row.app_id,
            config_id: row.config_id,
            workflow_execution_id: row.workflow_execution_id,
            scope_key: row.scope_key,
            attempt: u32::try_from(row.attempt).unwrap_or(0),
            analysis_minute: row.analysis_minute,
            analysis_start_minute: row.analysis_start_minute,
            analysis_type,
            cluster_level,
            status,
            retry: u32::try_from(row.retry).unwrap_or(0),
            backoff_count: u32::try_from(row.backoff_count).unwrap_or(0),
            version: row.version,
            is_24x7: row.is_24x7,
            tag: row.tag,
            hosts: parse_json_or_default(row.hosts)?,
            alert_threshold: row.alert_threshold,
            priority: row.priority,
            urls,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::scope_keys;

    async fn setup_test_repo() -> SqliteAnalysisTaskRepository {
        SqliteAnalysisTaskRepository::new(create_migrated_test_pool().await.unwrap())
    }

    fn time_series_task(minute: i64) -> AnalysisTask {
        AnalysisTask::new("acct", scope_keys::time_series("cfg"), AnalysisType::TimeSeries, minute)
            .with_config("cfg", "app")
    }

    fn lease() -> Duration {
        Duration::seconds(540)
    }

    #[tokio::test]
    async fn test_enqueue_twice_creates_one_task() {
        let repo = setup_test_repo().await;
        assert!(repo.enqueue_if_absent(&time_series_task(100)).await.unwrap());
        assert!(!repo.enqueue_if_absent(&time_series_task(100)).await.unwrap());
        assert_eq!(repo.count_for_scope(&scope_keys::time_series("cfg"), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_task_blocks_later_minutes() {
        let repo = setup_test_repo().await;
        assert!(repo.enqueue_if_absent(&time_series_task(100)).await.unwrap());
        assert!(!repo.enqueue_if_absent(&time_series_task(115)).await.unwrap());
    }

    #[tokio::test]
    async fn test_success_for_earlier_minute_does_not_block() {
        let repo = setup_test_repo().await;
        let first = time_series_task(100);
        repo.enqueue_if_absent(&first).await.unwrap();
        repo.update_status(first.id, ExecutionStatus::Success, Utc::now()).await.unwrap();

        assert!(!repo.enqueue_if_absent(&time_series_task(100)).await.unwrap());
        assert!(repo.enqueue_if_absent(&time_series_task(115)).await.unwrap());
    }

    #[tokio::test]
    async fn test_gate_separates_levels_and_tags() {
        let repo = setup_test_repo().await;
        let key = scope_keys::cluster_l1("cfg", 100);
        let l1 = AnalysisTask::new("acct", &key, AnalysisType::LogCluster, 100).with_cluster_level(ClusterLevel::L1);
        let l2 = AnalysisTask::new("acct", &key, AnalysisType::LogCluster, 100).with_cluster_level(ClusterLevel::L2);
        assert!(repo.enqueue_if_absent(&l1).await.unwrap());
        assert!(repo.enqueue_if_absent(&l2).await.unwrap());

        assert!(repo.enqueue_if_absent(&time_series_task(100).with_tag(Some("web".into()))).await.unwrap());
        assert!(repo.enqueue_if_absent(&time_series_task(100).with_tag(Some("db".into()))).await.unwrap());
        assert!(!repo.enqueue_if_absent(&time_series_task(100).with_tag(Some("db".into()))).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_sets_running_and_respects_filter() {
        let repo = setup_test_repo().await;
        repo.enqueue_if_absent(&time_series_task(100)).await.unwrap();
        let now = Utc::now();

        let none = repo
            .claim_next(&ClaimFilter::service_guard(vec![AnalysisType::LogMl]), lease(), 3, now)
            .await
            .unwrap();
        assert!(none.is_none());

        let claimed = repo
            .claim_next(&ClaimFilter::service_guard(vec![]), lease(), 3, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.status, ExecutionStatus::Running);
        assert_eq!(claimed.retry, 1);

        // Lease still valid, nothing left to claim.
        assert!(repo.claim_next(&ClaimFilter::default(), lease(), 3, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed_then_failed() {
        let repo = setup_test_repo().await;
        let task = time_series_task(100);
        repo.enqueue_if_absent(&task).await.unwrap();
        let mut now = Utc::now();

        for expected_retry in 1..=3 {
            let claimed = repo.claim_next(&ClaimFilter::default(), lease(), 3, now).await.unwrap().unwrap();
            assert_eq!(claimed.id, task.id);
            assert_eq!(claimed.retry, expected_retry);
            now += Duration::seconds(600);
        }

        // the last lease expired with no retries left
        assert!(repo.claim_next(&ClaimFilter::default(), lease(), 3, now).await.unwrap().is_none());
        let failed = repo.fail_exhausted_leases(lease(), 3, now).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, task.id);
        assert_eq!(failed[0].status, ExecutionStatus::Failed);
        assert!(repo.fail_exhausted_leases(lease(), 3, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fork_failed_frees_the_window() {
        let repo = setup_test_repo().await;
        let key = scope_keys::log_analysis("cfg", 100);
        let task = AnalysisTask::new("acct", &key, AnalysisType::LogMl, 100).with_backoff_count(2);
        repo.enqueue_if_absent(&task).await.unwrap();
        repo.update_status(task.id, ExecutionStatus::Failed, Utc::now()).await.unwrap();

        assert_eq!(repo.fork_failed(&key, 100, lease(), Utc::now()).await.unwrap(), 1);
        let fork = repo.latest_fork(&key, 100, AnalysisType::LogMl).await.unwrap().unwrap();
        assert_eq!(fork.attempt, 1);
        assert_eq!(fork.backoff_count, 2);
        assert_eq!(fork.status, ExecutionStatus::Failed);

        let retry = AnalysisTask::new("acct", &key, AnalysisType::LogMl, 100);
        assert!(repo.enqueue_if_absent(&retry).await.unwrap());
        repo.update_status(retry.id, ExecutionStatus::Failed, Utc::now()).await.unwrap();
        repo.fork_failed(&key, 100, lease(), Utc::now()).await.unwrap();
        let second = repo.latest_fork(&key, 100, AnalysisType::LogMl).await.unwrap().unwrap();
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn test_fork_ignores_fresh_running_task() {
        let repo = setup_test_repo().await;
        let key = scope_keys::log_analysis("cfg", 100);
        repo.enqueue_if_absent(&AnalysisTask::new("acct", &key, AnalysisType::LogMl, 100)).await.unwrap();
        assert_eq!(repo.fork_failed(&key, 100, lease(), Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_window_completed_and_running_checks() {
        let repo = setup_test_repo().await;
        repo.enqueue_if_absent(&time_series_task(100)).await.unwrap();
        assert!(repo.is_running_or_queued("cfg", None).await.unwrap());
        assert!(repo.is_running_or_queued("cfg", Some(90)).await.unwrap());
        assert!(!repo.is_running_or_queued("cfg", Some(101)).await.unwrap());

        let key = scope_keys::time_series("cfg");
        let window = TaskWindow {
            scope_key: &key,
            analysis_minute: 100,
            analysis_type: AnalysisType::TimeSeries,
            cluster_level: None,
        };
        assert_eq!(repo.mark_window_completed(&window, Utc::now()).await.unwrap(), 1);
        assert!(!repo.is_running_or_queued("cfg", None).await.unwrap());

        let done = repo
            .list(AnalysisTaskFilters { status: Some(ExecutionStatus::Success), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
    }

    #[tokio::test]
    async fn test_update_status_rejects_terminal_transition() {
        let repo = setup_test_repo().await;
        let task = time_series_task(100);
        repo.enqueue_if_absent(&task).await.unwrap();
        repo.update_status(task.id, ExecutionStatus::Success, Utc::now()).await.unwrap();

        let err = repo.update_status(task.id, ExecutionStatus::Running, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        let err = repo.update_status(Uuid::new_v4(), ExecutionStatus::Running, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DomainError::TaskNotFound(_)));
    }
}
