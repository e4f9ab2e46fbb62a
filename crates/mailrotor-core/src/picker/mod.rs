//! Delivery-server selection
//!
//! Scope resolution walks customer-owned servers, then the customer
//! group's shared servers, then system-wide servers, and draws from the
//! first non-empty tier by weight. Servers found over quota are set
//! aside and the draw repeats; once every candidate has been set aside
//! the picker clears its own exclusions a single time and retries, so a
//! counter that lapsed mid-pick gets a second look. Caller-supplied
//! exclusions survive that reset.

mod weighted;

pub use weighted::{weighted_index, weighted_pick};

use crate::quota::QuotaCounter;
use mailrotor_common::types::{DeliveryObject, ServerId};
use mailrotor_common::Result;
use mailrotor_storage::models::{Customer, DeliveryServer};
use mailrotor_storage::repository::{CustomerRepositoryTrait, DeliveryServerRepositoryTrait};
use std::sync::Arc;
use tracing::{debug, warn};

/// Picker tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct PickerConfig {
    /// Upper bound on draw attempts per pick call.
    pub max_attempts: usize,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self { max_attempts: 10 }
    }
}

/// Selects a delivery server for an outbound send.
pub struct ServerPicker {
    servers: Arc<dyn DeliveryServerRepositoryTrait>,
    customers: Arc<dyn CustomerRepositoryTrait>,
    quota: Arc<QuotaCounter>,
    config: PickerConfig,
}

impl ServerPicker {
    pub fn new(
        servers: Arc<dyn DeliveryServerRepositoryTrait>,
        customers: Arc<dyn CustomerRepositoryTrait>,
        quota: Arc<QuotaCounter>,
        config: PickerConfig,
    ) -> Self {
        Self {
            servers,
            customers,
            quota,
            config,
        }
    }

    /// Pick a server for `delivery`, never returning one listed in
    /// `exclude`. `None` means no server can carry this send right now.
    pub async fn pick(
        &self,
        delivery: &DeliveryObject,
        exclude: &[ServerId],
    ) -> Result<Option<DeliveryServer>> {
        let customer = match delivery.customer_id() {
            Some(id) => match self.customers.get(id).await? {
                Some(customer) => Some(customer),
                None => {
                    warn!(customer_id = %id, "delivery references unknown customer");
                    return Ok(None);
                }
            },
            None => None,
        };

        if let Some(customer) = &customer {
            if !customer.is_active() {
                debug!(customer_id = %customer.id, "customer not active, refusing to pick");
                return Ok(None);
            }
            if self.quota.customer_over_quota(customer).await? {
                debug!(customer_id = %customer.id, "customer over quota, refusing to pick");
                return Ok(None);
            }
        }

        let mut tried: Vec<ServerId> = exclude.to_vec();
        let mut reset_spent = false;

        for _ in 0..self.config.max_attempts {
            let mut candidates = self.candidates(delivery, customer.as_ref(), &tried).await?;

            if let Some(allowed) = delivery.allowed_server_ids() {
                if customer.as_ref().is_some_and(|c| c.can_select_servers) {
                    candidates.retain(|s| allowed.contains(&s.id));
                    if candidates.is_empty() {
                        debug!("no sendable server in the campaign allow-list");
                        return Ok(None);
                    }
                }
            }

            if candidates.is_empty() {
                if reset_spent {
                    return Ok(None);
                }
                // Every candidate was set aside as over quota; a window
                // may have rolled over in the meantime, so look once more.
                reset_spent = true;
                tried = exclude.to_vec();
                continue;
            }

            // Drop the ThreadRng before awaiting so the future stays Send.
            let drawn = weighted_pick(candidates, &mut rand::thread_rng());
            match drawn {
                Some(server) if self.quota.is_over_quota(&server).await? => {
                    debug!(server_id = %server.id, "picked server over quota, drawing again");
                    tried.push(server.id);
                }
                Some(server) => return Ok(Some(server)),
                None => return Ok(None),
            }
        }

        warn!(max_attempts = self.config.max_attempts, "picker gave up");
        Ok(None)
    }

    /// First non-empty tier: customer-owned, group-shared, system-wide.
    /// Deliveries without a customer only ever see system servers.
    async fn candidates(
        &self,
        delivery: &DeliveryObject,
        customer: Option<&Customer>,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>> {
        let delivery_for = delivery.delivery_for();

        let Some(customer) = customer else {
            return self.servers.find_system(delivery_for, exclude).await;
        };

        let own = self
            .servers
            .find_for_customer(customer.id, delivery_for, exclude)
            .await?;
        if !own.is_empty() {
            return Ok(own);
        }

        if let Some(group_id) = customer.group_id {
            let shared = self
                .servers
                .find_for_group(group_id, delivery_for, exclude)
                .await?;
            if !shared.is_empty() {
                return Ok(shared);
            }
        }

        if customer.can_use_system_servers {
            return self.servers.find_system(delivery_for, exclude).await;
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::test_support::{customer, server, MemoryCustomerRepo, MemoryServerRepo, MemoryUsageLog};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use mailrotor_storage::models::{NewUsageLog, UsageLogEntry};
    use mailrotor_common::types::DeliveryFor;
    use mailrotor_storage::repository::UsageLogRepositoryTrait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        usage: Arc<MemoryUsageLog>,
        picker: ServerPicker,
    }

    fn fixture(servers: Vec<DeliveryServer>, customers: Vec<Customer>) -> Fixture {
        let usage = Arc::new(MemoryUsageLog::new());
        let quota = Arc::new(QuotaCounter::new(
            usage.clone(),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(300),
            Duration::from_millis(100),
        ));
        let picker = ServerPicker::new(
            Arc::new(MemoryServerRepo::new(servers)),
            Arc::new(MemoryCustomerRepo::new(customers)),
            quota,
            PickerConfig::default(),
        );
        Fixture { usage, picker }
    }

    fn campaign(customer_id: Uuid) -> DeliveryObject {
        DeliveryObject::Campaign {
            campaign_id: Uuid::new_v4(),
            customer_id,
            server_ids: vec![],
        }
    }

    async fn exhaust(usage: &MemoryUsageLog, server: &DeliveryServer) {
        for _ in 0..server.hourly_quota {
            usage
                .append(NewUsageLog {
                    server_id: server.id,
                    customer_id: None,
                    delivery_for: DeliveryFor::Campaigns,
                    countable: true,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_customer_servers_win_over_system() {
        let c = customer();
        let mut own = server("own", 100);
        own.customer_id = Some(c.id);
        let system = server("system", 100);

        let fx = fixture(vec![own.clone(), system], vec![c.clone()]);
        let picked = fx.picker.pick(&campaign(c.id), &[]).await.unwrap().unwrap();
        assert_eq!(picked.id, own.id);
    }

    #[tokio::test]
    async fn test_falls_back_to_group_then_system() {
        let group_id = Uuid::new_v4();
        let mut c = customer();
        c.group_id = Some(group_id);

        let mut shared = server("shared", 100);
        shared.group_id = Some(group_id);
        let system = server("system", 100);

        let fx = fixture(vec![shared.clone(), system.clone()], vec![c.clone()]);
        let picked = fx.picker.pick(&campaign(c.id), &[]).await.unwrap().unwrap();
        assert_eq!(picked.id, shared.id);

        // Without the group server only the system one remains.
        let fx = fixture(vec![system.clone()], vec![c.clone()]);
        let picked = fx.picker.pick(&campaign(c.id), &[]).await.unwrap().unwrap();
        assert_eq!(picked.id, system.id);
    }

    #[tokio::test]
    async fn test_system_fallback_requires_permission() {
        let mut c = customer();
        c.can_use_system_servers = false;

        let system = server("system", 100);
        let fx = fixture(vec![system], vec![c.clone()]);

        assert!(fx.picker.pick(&campaign(c.id), &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_customer_gets_nothing() {
        let mut c = customer();
        c.status = "inactive".into();

        let mut own = server("own", 100);
        own.customer_id = Some(c.id);

        let fx = fixture(vec![own], vec![c.clone()]);
        assert!(fx.picker.pick(&campaign(c.id), &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_customer_over_quota_gets_nothing() {
        let mut c = customer();
        c.hourly_quota = 1;

        let mut own = server("own", 100);
        own.customer_id = Some(c.id);

        let fx = fixture(vec![own.clone()], vec![c.clone()]);
        fx.usage
            .append(NewUsageLog {
                server_id: own.id,
                customer_id: Some(c.id),
                delivery_for: DeliveryFor::Campaigns,
                countable: true,
            })
            .await
            .unwrap();

        assert!(fx.picker.pick(&campaign(c.id), &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_allow_list_restricts_candidates() {
        let c = customer();
        let mut a = server("a", 100);
        a.customer_id = Some(c.id);
        let mut b = server("b", 100);
        b.customer_id = Some(c.id);

        let fx = fixture(vec![a.clone(), b.clone()], vec![c.clone()]);

        let delivery = DeliveryObject::Campaign {
            campaign_id: Uuid::new_v4(),
            customer_id: c.id,
            server_ids: vec![b.id],
        };
        let picked = fx.picker.pick(&delivery, &[]).await.unwrap().unwrap();
        assert_eq!(picked.id, b.id);

        // Allow-list pointing at nothing sendable is terminal.
        let delivery = DeliveryObject::Campaign {
            campaign_id: Uuid::new_v4(),
            customer_id: c.id,
            server_ids: vec![Uuid::new_v4()],
        };
        assert!(fx.picker.pick(&delivery, &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_allow_list_member_over_quota_is_terminal() {
        let c = customer();
        let mut listed = server("listed", 100);
        listed.customer_id = Some(c.id);
        listed.hourly_quota = 1;
        let mut other = server("other", 100);
        other.customer_id = Some(c.id);

        let fx = fixture(vec![listed.clone(), other], vec![c.clone()]);
        exhaust(&fx.usage, &listed).await;

        // The eligible server outside the allow-list must not be used.
        let delivery = DeliveryObject::Campaign {
            campaign_id: Uuid::new_v4(),
            customer_id: c.id,
            server_ids: vec![listed.id],
        };
        assert!(fx.picker.pick(&delivery, &[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_allow_list_ignored_without_permission() {
        let mut c = customer();
        c.can_select_servers = false;

        let mut a = server("a", 100);
        a.customer_id = Some(c.id);

        let fx = fixture(vec![a.clone()], vec![c.clone()]);

        // The list names a bogus server but the permission gate means it
        // is not applied.
        let delivery = DeliveryObject::Campaign {
            campaign_id: Uuid::new_v4(),
            customer_id: c.id,
            server_ids: vec![Uuid::new_v4()],
        };
        let picked = fx.picker.pick(&delivery, &[]).await.unwrap().unwrap();
        assert_eq!(picked.id, a.id);
    }

    #[tokio::test]
    async fn test_over_quota_server_is_skipped() {
        let c = customer();
        let mut spent = server("spent", 100);
        spent.customer_id = Some(c.id);
        spent.hourly_quota = 2;
        let mut fresh = server("fresh", 100);
        fresh.customer_id = Some(c.id);

        let fx = fixture(vec![spent.clone(), fresh.clone()], vec![c.clone()]);
        exhaust(&fx.usage, &spent).await;

        for _ in 0..20 {
            let picked = fx.picker.pick(&campaign(c.id), &[]).await.unwrap().unwrap();
            assert_eq!(picked.id, fresh.id);
        }
    }

    #[tokio::test]
    async fn test_caller_exclusions_survive_the_reset() {
        let c = customer();
        let mut excluded = server("excluded", 100);
        excluded.customer_id = Some(c.id);
        let mut spent = server("spent", 100);
        spent.customer_id = Some(c.id);
        spent.hourly_quota = 1;

        let fx = fixture(vec![excluded.clone(), spent.clone()], vec![c.clone()]);
        exhaust(&fx.usage, &spent).await;

        // The only healthy server is caller-excluded; the internal reset
        // must not bring it back.
        let picked = fx.picker.pick(&campaign(c.id), &[excluded.id]).await.unwrap();
        assert!(picked.is_none());
    }

    /// Usage log whose first count reports the window as full; later
    /// counts see it empty, as if the window rolled over mid-pick.
    #[derive(Default)]
    struct LapsingUsage {
        counts: AtomicUsize,
    }

    #[async_trait]
    impl UsageLogRepositoryTrait for LapsingUsage {
        async fn append(&self, entry: NewUsageLog) -> Result<UsageLogEntry> {
            Ok(UsageLogEntry {
                id: Uuid::now_v7(),
                server_id: entry.server_id,
                customer_id: entry.customer_id,
                delivery_for: entry.delivery_for.to_string(),
                countable: entry.countable,
                created_at: Utc::now(),
            })
        }

        async fn count_for_server_since(
            &self,
            _server_id: ServerId,
            _since: DateTime<Utc>,
        ) -> Result<i64> {
            Ok(if self.counts.fetch_add(1, Ordering::SeqCst) == 0 {
                1_000
            } else {
                0
            })
        }

        async fn count_for_customer_since(
            &self,
            _customer_id: Uuid,
            _since: DateTime<Utc>,
        ) -> Result<i64> {
            Ok(0)
        }

        async fn prune(&self, _retention_days: i64) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_reset_retries_a_counter_that_lapsed_mid_pick() {
        let c = customer();
        let mut s = server("a", 100);
        s.customer_id = Some(c.id);
        s.hourly_quota = 5;

        // Zero TTL so every quota check recounts from the usage log.
        let quota = Arc::new(QuotaCounter::new(
            Arc::new(LapsingUsage::default()),
            Arc::new(MemoryCache::new()),
            Duration::ZERO,
            Duration::from_millis(100),
        ));
        let picker = ServerPicker::new(
            Arc::new(MemoryServerRepo::new(vec![s.clone()])),
            Arc::new(MemoryCustomerRepo::new(vec![c.clone()])),
            quota,
            PickerConfig::default(),
        );

        // The first draw sets the only server aside as over quota; the
        // recount after the reset finds the window empty and the pick
        // lands instead of giving up.
        let picked = picker.pick(&campaign(c.id), &[]).await.unwrap().unwrap();
        assert_eq!(picked.id, s.id);
    }

    #[tokio::test]
    async fn test_no_customer_uses_system_servers_only() {
        let c = customer();
        let mut owned = server("owned", 100);
        owned.customer_id = Some(c.id);
        let system = server("system", 100);

        let fx = fixture(vec![owned, system.clone()], vec![c]);
        let delivery = DeliveryObject::Report { customer_id: None };
        let picked = fx.picker.pick(&delivery, &[]).await.unwrap().unwrap();
        assert_eq!(picked.id, system.id);
    }

    #[tokio::test]
    async fn test_unknown_customer_gets_nothing() {
        let fx = fixture(vec![server("system", 100)], vec![]);
        assert!(fx
            .picker
            .pick(&campaign(Uuid::new_v4()), &[])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_inactive_servers_are_not_candidates() {
        let c = customer();
        let mut disabled = server("disabled", 100);
        disabled.customer_id = Some(c.id);
        disabled.status = "inactive".into();

        let fx = fixture(vec![disabled], vec![c.clone()]);
        // Fixture has no sendable servers; pick must terminate with None.
        assert!(fx.picker.pick(&campaign(c.id), &[]).await.unwrap().is_none());
    }
}
