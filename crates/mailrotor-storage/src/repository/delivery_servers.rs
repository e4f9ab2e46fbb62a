//! Delivery server repository

use crate::db::DatabasePool;
use crate::models::DeliveryServer;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use mailrotor_common::types::{CustomerId, DeliveryFor, GroupId, ServerId};
use mailrotor_common::{Error, Result};

/// Delivery server repository trait
#[async_trait]
pub trait DeliveryServerRepository: Send + Sync {
    async fn get(&self, id: ServerId) -> Result<Option<DeliveryServer>>;

    /// Sendable servers owned by the customer, matching the category and
    /// not in the exclusion list.
    async fn find_for_customer(
        &self,
        customer_id: CustomerId,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>>;

    /// Sendable shared servers assigned to the group (no owning customer).
    async fn find_for_group(
        &self,
        group_id: GroupId,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>>;

    /// Sendable system-wide servers (no owning customer, no group).
    async fn find_system(
        &self,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>>;

    /// Transition active -> in-use. Returns false when the server was not
    /// active, so concurrent campaign runners cannot both claim it.
    async fn mark_in_use(&self, id: ServerId) -> Result<bool>;

    /// Transition in-use -> active.
    async fn release_in_use(&self, id: ServerId) -> Result<bool>;

    /// Soft delete: any status -> pending-delete.
    async fn mark_pending_delete(&self, id: ServerId) -> Result<bool>;

    /// Hard-delete pending-delete servers with no usage rows newer than
    /// the retention cutoff. Returns the number of servers removed.
    async fn purge_deletable(&self, retention_days: i64) -> Result<u64>;
}

const SENDABLE: &str = "('active', 'in-use')";

/// Database delivery server repository
#[derive(Clone)]
pub struct DbDeliveryServerRepository {
    pool: DatabasePool,
}

impl DbDeliveryServerRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryServerRepository for DbDeliveryServerRepository {
    async fn get(&self, id: ServerId) -> Result<Option<DeliveryServer>> {
        sqlx::query_as::<_, DeliveryServer>("SELECT * FROM delivery_servers WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_for_customer(
        &self,
        customer_id: CustomerId,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>> {
        sqlx::query_as::<_, DeliveryServer>(&format!(
            r#"
            SELECT * FROM delivery_servers
            WHERE customer_id = $1
              AND status IN {SENDABLE}
              AND (use_for = 'all' OR use_for = $2)
              AND id <> ALL($3)
            ORDER BY probability DESC, name ASC
            "#
        ))
        .bind(customer_id)
        .bind(delivery_for.to_string())
        .bind(exclude)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_for_group(
        &self,
        group_id: GroupId,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>> {
        sqlx::query_as::<_, DeliveryServer>(&format!(
            r#"
            SELECT * FROM delivery_servers
            WHERE customer_id IS NULL
              AND group_id = $1
              AND status IN {SENDABLE}
              AND (use_for = 'all' OR use_for = $2)
              AND id <> ALL($3)
            ORDER BY probability DESC, name ASC
            "#
        ))
        .bind(group_id)
        .bind(delivery_for.to_string())
        .bind(exclude)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_system(
        &self,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>> {
        sqlx::query_as::<_, DeliveryServer>(&format!(
            r#"
            SELECT * FROM delivery_servers
            WHERE customer_id IS NULL
              AND group_id IS NULL
              AND status IN {SENDABLE}
              AND (use_for = 'all' OR use_for = $1)
              AND id <> ALL($2)
            ORDER BY probability DESC, name ASC
            "#
        ))
        .bind(delivery_for.to_string())
        .bind(exclude)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_in_use(&self, id: ServerId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_servers SET status = 'in-use', updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_in_use(&self, id: ServerId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_servers SET status = 'active', updated_at = NOW()
            WHERE id = $1 AND status = 'in-use'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_pending_delete(&self, id: ServerId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_servers SET status = 'pending-delete', updated_at = NOW()
            WHERE id = $1 AND status <> 'pending-delete'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_deletable(&self, retention_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days);

        let result = sqlx::query(
            r#"
            DELETE FROM delivery_servers
            WHERE status = 'pending-delete'
              AND NOT EXISTS (
                  SELECT 1 FROM usage_logs
                  WHERE usage_logs.server_id = delivery_servers.id
                    AND usage_logs.created_at > $1
              )
            "#,
        )
        .bind(cutoff)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
