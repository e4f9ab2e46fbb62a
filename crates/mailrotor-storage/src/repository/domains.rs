//! Sending-domain and tracking-domain repositories

use crate::db::DatabasePool;
use crate::models::{SendingDomain, TrackingDomain};
use async_trait::async_trait;
use mailrotor_common::types::{CustomerId, TrackingDomainId};
use mailrotor_common::{Error, Result};

/// Sending-domain repository trait
#[async_trait]
pub trait SendingDomainRepository: Send + Sync {
    /// Verified signing domain matching the given email domain, preferring
    /// the customer's own over a system-wide one.
    async fn find_verified(
        &self,
        domain: &str,
        customer_id: Option<CustomerId>,
    ) -> Result<Option<SendingDomain>>;
}

/// Tracking-domain repository trait
#[async_trait]
pub trait TrackingDomainRepository: Send + Sync {
    async fn get_verified(&self, id: TrackingDomainId) -> Result<Option<TrackingDomain>>;
}

/// Database sending-domain repository
#[derive(Clone)]
pub struct DbSendingDomainRepository {
    pool: DatabasePool,
}

impl DbSendingDomainRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SendingDomainRepository for DbSendingDomainRepository {
    async fn find_verified(
        &self,
        domain: &str,
        customer_id: Option<CustomerId>,
    ) -> Result<Option<SendingDomain>> {
        sqlx::query_as::<_, SendingDomain>(
            r#"
            SELECT * FROM sending_domains
            WHERE name = $1
              AND verified = TRUE
              AND (customer_id = $2 OR customer_id IS NULL)
            ORDER BY customer_id NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(domain)
        .bind(customer_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Database tracking-domain repository
#[derive(Clone)]
pub struct DbTrackingDomainRepository {
    pool: DatabasePool,
}

impl DbTrackingDomainRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackingDomainRepository for DbTrackingDomainRepository {
    async fn get_verified(&self, id: TrackingDomainId) -> Result<Option<TrackingDomain>> {
        sqlx::query_as::<_, TrackingDomain>(
            "SELECT * FROM tracking_domains WHERE id = $1 AND verified = TRUE",
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
