//! Usage-log repository

use crate::db::DatabasePool;
use crate::models::{NewUsageLog, UsageLogEntry};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mailrotor_common::types::{CustomerId, ServerId};
use mailrotor_common::{Error, Result};
use uuid::Uuid;

/// Usage-log repository trait
#[async_trait]
pub trait UsageLogRepository: Send + Sync {
    /// Append a usage row.
    async fn append(&self, entry: NewUsageLog) -> Result<UsageLogEntry>;

    /// Countable sends through the server since the window start.
    async fn count_for_server_since(
        &self,
        server_id: ServerId,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    /// Countable sends attributed to the customer since the window start,
    /// across all servers.
    async fn count_for_customer_since(
        &self,
        customer_id: CustomerId,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    /// Drop rows older than the retention period. Returns rows removed.
    async fn prune(&self, retention_days: i64) -> Result<u64>;
}

/// Database usage-log repository
#[derive(Clone)]
pub struct DbUsageLogRepository {
    pool: DatabasePool,
}

impl DbUsageLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLogRepository for DbUsageLogRepository {
    async fn append(&self, entry: NewUsageLog) -> Result<UsageLogEntry> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, UsageLogEntry>(
            r#"
            INSERT INTO usage_logs (id, server_id, customer_id, delivery_for, countable, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(entry.server_id)
        .bind(entry.customer_id)
        .bind(entry.delivery_for.to_string())
        .bind(entry.countable)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_for_server_since(
        &self,
        server_id: ServerId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM usage_logs
            WHERE server_id = $1 AND countable = TRUE AND created_at >= $2
            "#,
        )
        .bind(server_id)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count.0)
    }

    async fn count_for_customer_since(
        &self,
        customer_id: CustomerId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM usage_logs
            WHERE customer_id = $1 AND countable = TRUE AND created_at >= $2
            "#,
        )
        .bind(customer_id)
        .bind(since)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count.0)
    }

    async fn prune(&self, retention_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days);

        let result = sqlx::query("DELETE FROM usage_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
