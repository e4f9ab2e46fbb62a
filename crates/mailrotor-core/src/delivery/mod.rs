//! Delivery orchestration
//!
//! Ties the picker, parameter assembly, transport registry and quota
//! accounting together. A provider failure is an ordinary outcome here:
//! it is logged, the server is excluded, and the next attempt picks a
//! different one.

mod transactional;

pub use transactional::TransactionalWorker;

use crate::hooks::HookBus;
use crate::params::{ParamsAssembler, SendOverrides};
use crate::picker::ServerPicker;
use crate::quota::QuotaCounter;
use crate::transport::AdapterRegistry;
use mailrotor_common::types::{DeliveryFor, DeliveryObject, ServerId};
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::{DeliveryServer, NewUsageLog};
use mailrotor_storage::repository::{
    CustomerRepositoryTrait, DeliveryServerRepositoryTrait, UsageLogRepositoryTrait,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub server_id: ServerId,
    pub transport: String,
    pub message_id: String,
    pub to_email: String,
}

pub struct DeliveryService {
    picker: ServerPicker,
    quota: Arc<QuotaCounter>,
    adapters: Arc<AdapterRegistry>,
    assembler: ParamsAssembler,
    usage: Arc<dyn UsageLogRepositoryTrait>,
    customers: Arc<dyn CustomerRepositoryTrait>,
    servers: Arc<dyn DeliveryServerRepositoryTrait>,
    hooks: HookBus,
}

impl DeliveryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        picker: ServerPicker,
        quota: Arc<QuotaCounter>,
        adapters: Arc<AdapterRegistry>,
        assembler: ParamsAssembler,
        usage: Arc<dyn UsageLogRepositoryTrait>,
        customers: Arc<dyn CustomerRepositoryTrait>,
        servers: Arc<dyn DeliveryServerRepositoryTrait>,
        hooks: HookBus,
    ) -> Self {
        Self {
            picker,
            quota,
            adapters,
            assembler,
            usage,
            customers,
            servers,
            hooks,
        }
    }

    /// Deliver one message. `Ok(None)` means no server could carry it,
    /// either because none was eligible or because the send failed.
    pub async fn deliver(
        &self,
        delivery: &DeliveryObject,
        overrides: &SendOverrides,
    ) -> Result<Option<SendReport>> {
        self.deliver_with_retry(delivery, overrides, 1).await
    }

    /// Deliver with up to `attempts` picks; each failed server is
    /// excluded from the next pick.
    pub async fn deliver_with_retry(
        &self,
        delivery: &DeliveryObject,
        overrides: &SendOverrides,
        attempts: u32,
    ) -> Result<Option<SendReport>> {
        let mut exclude: Vec<ServerId> = Vec::new();

        for attempt in 1..=attempts.max(1) {
            let Some(server) = self.picker.pick(delivery, &exclude).await? else {
                debug!(attempt, "no delivery server available");
                return Ok(None);
            };

            match self.send_via(&server, delivery, overrides).await {
                Ok(report) => return Ok(Some(report)),
                // Only transport failures can get better on another
                // server; validation and infrastructure errors surface.
                Err(e) if e.is_retryable() => {
                    warn!(
                        server_id = %server.id,
                        server = %server.name,
                        attempt,
                        error = %e,
                        "send failed, excluding server"
                    );
                    exclude.push(server.id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    async fn send_via(
        &self,
        server: &DeliveryServer,
        delivery: &DeliveryObject,
        overrides: &SendOverrides,
    ) -> Result<SendReport> {
        let kind = server.transport_kind().ok_or_else(|| {
            Error::Transport(format!(
                "server '{}' has unknown transport '{}'",
                server.name, server.transport
            ))
        })?;
        let adapter = self
            .adapters
            .get(kind)
            .ok_or_else(|| Error::Transport(format!("transport {kind} is not available")))?;

        let customer_id = delivery.customer_id();
        let mut params = self.assembler.assemble(server, customer_id, overrides).await?;
        self.hooks.run_pre_send(server, &mut params);

        let receipt = adapter.send(server, &params).await?;

        let delivery_for = delivery.delivery_for();
        let countable = is_countable(delivery_for);
        self.usage
            .append(NewUsageLog {
                server_id: server.id,
                customer_id,
                delivery_for,
                countable,
            })
            .await?;

        if countable {
            self.quota.register_send(server).await?;
            if let Some(customer_id) = customer_id {
                if let Some(customer) = self.customers.get(customer_id).await? {
                    self.quota.register_customer_send(&customer).await?;
                }
            }
        }

        let report = SendReport {
            server_id: server.id,
            transport: server.transport.clone(),
            message_id: receipt.message_id,
            to_email: params.to_email.clone(),
        };
        self.hooks.run_post_send(&report);

        info!(
            server_id = %server.id,
            transport = %server.transport,
            message_id = %report.message_id,
            "message delivered"
        );
        Ok(report)
    }

    /// Claim the server for a campaign run. Returns false when another
    /// runner already holds it.
    pub async fn claim_for_campaign(&self, server_id: ServerId) -> Result<bool> {
        self.servers.mark_in_use(server_id).await
    }

    /// Hand the server back after a campaign run.
    pub async fn release_after_campaign(&self, server_id: ServerId) -> Result<bool> {
        self.servers.release_in_use(server_id).await
    }
}

/// Test and report sends go through the same pipeline but do not consume
/// quota.
fn is_countable(delivery_for: DeliveryFor) -> bool {
    !matches!(delivery_for, DeliveryFor::Tests | DeliveryFor::Reports)
}
