//! SQLite implementation of the LockRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::ports::LockRepository;

#[derive(Clone)]
pub struct SqliteLockRepository {
    pool: SqlitePool,
}

impl SqliteLockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockRepository for SqliteLockRepository {
    async fn acquire(&self, id: &str, holder: &str, at: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO verification_locks (id, holder, acquired_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(holder)
            .bind(at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM verification_locks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_acquired_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM verification_locks WHERE acquired_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn test_acquire_release_and_expire() {
        let repo = SqliteLockRepository::new(create_migrated_test_pool().await.unwrap());
        let now = Utc::now();

        assert!(repo.acquire("cv-tick-acct", "worker-1", now - Duration::minutes(10)).await.unwrap());
        assert!(!repo.acquire("cv-tick-acct", "worker-2", now).await.unwrap());

        repo.release("cv-tick-acct").await.unwrap();
        assert!(repo.acquire("cv-tick-acct", "worker-2", now - Duration::minutes(10)).await.unwrap());
        assert!(repo.acquire("fresh", "worker-3", now).await.unwrap());

        assert_eq!(repo.delete_acquired_before(now - Duration::minutes(5)).await.unwrap(), 1);
        assert!(!repo.acquire("fresh", "worker-4", now).await.unwrap());
    }
}
