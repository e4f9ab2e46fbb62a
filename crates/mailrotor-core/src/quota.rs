//! Quota counting over the usage log
//!
//! Counters are derived: the append-only usage log is the source of
//! truth, and per-owner+period values are cached with a short TTL behind
//! a per-key lock. Lock-acquisition timeout is treated as zero remaining
//! (fail closed) so contention can never cause over-sending.

use crate::cache::{Cache, LockRegistry};
use chrono::Utc;
use mailrotor_common::types::QuotaPeriod;
use mailrotor_common::Result;
use mailrotor_storage::models::{Customer, DeliveryServer};
use mailrotor_storage::repository::UsageLogRepositoryTrait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Sentinel for a ceiling of 0 (no limit configured).
pub const UNLIMITED: i64 = i64::MAX;

/// The entity a counter belongs to.
enum Owner<'a> {
    Server(&'a DeliveryServer),
    Customer(&'a Customer),
}

impl Owner<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Owner::Server(_) => "server",
            Owner::Customer(_) => "customer",
        }
    }

    fn id(&self) -> Uuid {
        match self {
            Owner::Server(s) => s.id,
            Owner::Customer(c) => c.id,
        }
    }

    fn ceiling(&self, period: QuotaPeriod) -> i64 {
        match self {
            Owner::Server(s) => s.quota_ceiling(period),
            Owner::Customer(c) => c.quota_ceiling(period),
        }
    }
}

/// Hourly/daily/monthly send counters per server and per customer.
pub struct QuotaCounter {
    usage: Arc<dyn UsageLogRepositoryTrait>,
    cache: Arc<dyn Cache>,
    locks: LockRegistry,
    ttl: Duration,
    lock_timeout: Duration,
}

impl QuotaCounter {
    pub fn new(
        usage: Arc<dyn UsageLogRepositoryTrait>,
        cache: Arc<dyn Cache>,
        ttl: Duration,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            usage,
            cache,
            locks: LockRegistry::new(),
            ttl,
            lock_timeout,
        }
    }

    /// Remaining sends for the server in the given period. `UNLIMITED`
    /// when no ceiling is configured; 0 when the lock cannot be acquired
    /// in time.
    pub async fn remaining(&self, server: &DeliveryServer, period: QuotaPeriod) -> Result<i64> {
        self.remaining_for(Owner::Server(server), period).await
    }

    /// Remaining sends for the customer's own overall quota.
    pub async fn customer_remaining(
        &self,
        customer: &Customer,
        period: QuotaPeriod,
    ) -> Result<i64> {
        self.remaining_for(Owner::Customer(customer), period).await
    }

    /// Consume `by` sends from the server's counter for one period.
    /// Returns the new remaining value.
    pub async fn decrement(
        &self,
        server: &DeliveryServer,
        period: QuotaPeriod,
        by: i64,
    ) -> Result<i64> {
        self.decrement_for(Owner::Server(server), period, by).await
    }

    /// Consume one send from every period counter of the server.
    pub async fn register_send(&self, server: &DeliveryServer) -> Result<()> {
        for period in QuotaPeriod::ALL {
            self.decrement(server, period, 1).await?;
        }
        Ok(())
    }

    /// Consume one send from every period counter of the customer.
    pub async fn register_customer_send(&self, customer: &Customer) -> Result<()> {
        for period in QuotaPeriod::ALL {
            self.decrement_for(Owner::Customer(customer), period, 1)
                .await?;
        }
        Ok(())
    }

    /// A server is over-quota as soon as ANY period is exhausted.
    pub async fn is_over_quota(&self, server: &DeliveryServer) -> Result<bool> {
        for period in QuotaPeriod::ALL {
            if self.remaining(server, period).await? <= 0 {
                debug!(
                    server_id = %server.id,
                    %period,
                    "server quota exhausted"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A customer is over-quota as soon as ANY period is exhausted.
    pub async fn customer_over_quota(&self, customer: &Customer) -> Result<bool> {
        for period in QuotaPeriod::ALL {
            if self.customer_remaining(customer, period).await? <= 0 {
                debug!(
                    customer_id = %customer.id,
                    %period,
                    "customer quota exhausted"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Retain only servers with remaining quota in every period.
    pub async fn filter_available(
        &self,
        servers: Vec<DeliveryServer>,
    ) -> Result<Vec<DeliveryServer>> {
        let mut available = Vec::with_capacity(servers.len());
        for server in servers {
            if !self.is_over_quota(&server).await? {
                available.push(server);
            }
        }
        Ok(available)
    }

    async fn remaining_for(&self, owner: Owner<'_>, period: QuotaPeriod) -> Result<i64> {
        let ceiling = owner.ceiling(period);
        if ceiling == 0 {
            return Ok(UNLIMITED);
        }

        let key = counter_key(&owner, period);
        let Some(_guard) = self.locks.acquire(&key, self.lock_timeout).await else {
            warn!(%key, "quota lock acquisition timed out, failing closed");
            return Ok(0);
        };

        self.remaining_locked(&owner, period, ceiling, &key).await
    }

    async fn decrement_for(&self, owner: Owner<'_>, period: QuotaPeriod, by: i64) -> Result<i64> {
        let ceiling = owner.ceiling(period);
        if ceiling == 0 {
            return Ok(UNLIMITED);
        }

        let key = counter_key(&owner, period);
        let Some(_guard) = self.locks.acquire(&key, self.lock_timeout).await else {
            warn!(%key, "quota lock acquisition timed out, failing closed");
            return Ok(0);
        };

        let current = self.remaining_locked(&owner, period, ceiling, &key).await?;
        let updated = current.saturating_sub(by).max(0);
        self.cache.set(&key, updated, self.ttl).await?;
        Ok(updated)
    }

    /// Cached remaining value, recomputed from the usage log on miss.
    /// Must be called with the key's lock held.
    async fn remaining_locked(
        &self,
        owner: &Owner<'_>,
        period: QuotaPeriod,
        ceiling: i64,
        key: &str,
    ) -> Result<i64> {
        if let Some(cached) = self.cache.get(key).await? {
            return Ok(cached);
        }

        let since = period.window_start(Utc::now());
        let used = match owner {
            Owner::Server(s) => self.usage.count_for_server_since(s.id, since).await?,
            Owner::Customer(c) => self.usage.count_for_customer_since(c.id, since).await?,
        };

        let remaining = (ceiling - used).max(0);
        self.cache.set(key, remaining, self.ttl).await?;
        Ok(remaining)
    }
}

/// Counter key; the window start keeps entries from a previous window
/// from being read across a boundary before their TTL lapses.
fn counter_key(owner: &Owner<'_>, period: QuotaPeriod) -> String {
    let window = period.window_start(Utc::now());
    format!(
        "quota:{}:{}:{}:{}",
        owner.kind(),
        owner.id(),
        period,
        window.timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::test_support::{customer, server, MemoryUsageLog};
    use mailrotor_common::types::DeliveryFor;
    use mailrotor_storage::models::NewUsageLog;
    use mailrotor_storage::repository::UsageLogRepositoryTrait as _;

    fn counter(usage: Arc<MemoryUsageLog>) -> QuotaCounter {
        QuotaCounter::new(
            usage,
            Arc::new(MemoryCache::new()),
            Duration::from_secs(300),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_zero_ceiling_is_unlimited() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = counter(usage.clone());

        let mut s = server("a", 100);
        s.hourly_quota = 0;

        for _ in 0..10 {
            usage
                .append(NewUsageLog {
                    server_id: s.id,
                    customer_id: None,
                    delivery_for: DeliveryFor::Campaigns,
                    countable: true,
                })
                .await
                .unwrap();
        }

        assert_eq!(quota.remaining(&s, QuotaPeriod::Hourly).await.unwrap(), UNLIMITED);
        assert_eq!(quota.decrement(&s, QuotaPeriod::Hourly, 1).await.unwrap(), UNLIMITED);
    }

    #[tokio::test]
    async fn test_remaining_is_ceiling_minus_used_clamped() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = counter(usage.clone());

        let mut s = server("a", 100);
        s.hourly_quota = 5;

        for _ in 0..3 {
            usage
                .append(NewUsageLog {
                    server_id: s.id,
                    customer_id: None,
                    delivery_for: DeliveryFor::Campaigns,
                    countable: true,
                })
                .await
                .unwrap();
        }

        assert_eq!(quota.remaining(&s, QuotaPeriod::Hourly).await.unwrap(), 2);

        // Over-used windows clamp at zero, never negative.
        let mut t = server("b", 100);
        t.hourly_quota = 2;
        for _ in 0..7 {
            usage
                .append(NewUsageLog {
                    server_id: t.id,
                    customer_id: None,
                    delivery_for: DeliveryFor::Campaigns,
                    countable: true,
                })
                .await
                .unwrap();
        }
        assert_eq!(quota.remaining(&t, QuotaPeriod::Hourly).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_countable_rows_are_ignored() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = counter(usage.clone());

        let mut s = server("a", 100);
        s.daily_quota = 10;

        usage
            .append(NewUsageLog {
                server_id: s.id,
                customer_id: None,
                delivery_for: DeliveryFor::Tests,
                countable: false,
            })
            .await
            .unwrap();

        assert_eq!(quota.remaining(&s, QuotaPeriod::Daily).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_decrement_reduces_by_exactly_n() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = counter(usage);

        let mut s = server("a", 100);
        s.daily_quota = 10;

        assert_eq!(quota.remaining(&s, QuotaPeriod::Daily).await.unwrap(), 10);
        assert_eq!(quota.decrement(&s, QuotaPeriod::Daily, 3).await.unwrap(), 7);
        assert_eq!(quota.remaining(&s, QuotaPeriod::Daily).await.unwrap(), 7);

        // Clamped at zero.
        assert_eq!(quota.decrement(&s, QuotaPeriod::Daily, 100).await.unwrap(), 0);
        assert_eq!(quota.remaining(&s, QuotaPeriod::Daily).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_periods_are_independent() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = counter(usage);

        let mut s = server("a", 100);
        s.hourly_quota = 1;
        s.daily_quota = 100;

        assert_eq!(quota.decrement(&s, QuotaPeriod::Hourly, 1).await.unwrap(), 0);
        assert_eq!(quota.remaining(&s, QuotaPeriod::Daily).await.unwrap(), 100);
        assert!(quota.is_over_quota(&s).await.unwrap());
    }

    #[tokio::test]
    async fn test_register_send_touches_all_periods() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = counter(usage);

        let mut s = server("a", 100);
        s.hourly_quota = 10;
        s.daily_quota = 20;
        s.monthly_quota = 30;

        quota.register_send(&s).await.unwrap();

        assert_eq!(quota.remaining(&s, QuotaPeriod::Hourly).await.unwrap(), 9);
        assert_eq!(quota.remaining(&s, QuotaPeriod::Daily).await.unwrap(), 19);
        assert_eq!(quota.remaining(&s, QuotaPeriod::Monthly).await.unwrap(), 29);
    }

    #[tokio::test]
    async fn test_lock_contention_fails_closed() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = QuotaCounter::new(
            usage,
            Arc::new(MemoryCache::new()),
            Duration::from_secs(300),
            Duration::from_millis(20),
        );

        let mut s = server("a", 100);
        s.hourly_quota = 10;

        let key = counter_key(&Owner::Server(&s), QuotaPeriod::Hourly);
        let _held = quota.locks.acquire(&key, Duration::from_millis(50)).await;

        assert_eq!(quota.remaining(&s, QuotaPeriod::Hourly).await.unwrap(), 0);
        assert_eq!(quota.decrement(&s, QuotaPeriod::Hourly, 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_customer_quota() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = counter(usage.clone());

        let mut c = customer();
        c.monthly_quota = 2;

        let s = server("a", 100);
        usage
            .append(NewUsageLog {
                server_id: s.id,
                customer_id: Some(c.id),
                delivery_for: DeliveryFor::Campaigns,
                countable: true,
            })
            .await
            .unwrap();

        assert_eq!(
            quota.customer_remaining(&c, QuotaPeriod::Monthly).await.unwrap(),
            1
        );
        assert!(!quota.customer_over_quota(&c).await.unwrap());

        quota.register_customer_send(&c).await.unwrap();
        assert!(quota.customer_over_quota(&c).await.unwrap());
    }

    #[tokio::test]
    async fn test_filter_available() {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = counter(usage.clone());

        // A: unlimited. B: ceiling 5, already used 5.
        let a = server("a", 100);
        let mut b = server("b", 100);
        b.hourly_quota = 5;
        for _ in 0..5 {
            usage
                .append(NewUsageLog {
                    server_id: b.id,
                    customer_id: None,
                    delivery_for: DeliveryFor::Campaigns,
                    countable: true,
                })
                .await
                .unwrap();
        }

        let available = quota.filter_available(vec![a.clone(), b]).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, a.id);
    }
}
