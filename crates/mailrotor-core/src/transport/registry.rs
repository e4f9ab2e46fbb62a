//! Transport registry
//!
//! Fixed table from transport kind to adapter, built once at startup.
//! Adapters that fail their requirements check are dropped from the
//! table, so a misconfigured transport surfaces as a pick-time miss
//! rather than a per-send failure.

use super::{
    ElasticEmailAdapter, MailgunAdapter, PostalAdapter, PostmarkAdapter, ProviderAdapter,
    SmtpAdapter, SparkpostAdapter,
};
use mailrotor_common::config::TransportsConfig;
use mailrotor_common::types::TransportKind;
use mailrotor_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct AdapterRegistry {
    adapters: HashMap<TransportKind, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Build the registry with every built-in adapter that passes its
    /// requirements check.
    pub fn builtin(config: &TransportsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| Error::Transport(format!("http client build failed: {e}")))?;

        let adapters: Vec<Arc<dyn ProviderAdapter>> = vec![
            Arc::new(SmtpAdapter::new(config.smtp_enabled)),
            Arc::new(MailgunAdapter::new(
                client.clone(),
                config.mailgun_enabled,
                config.mailgun_api_url.clone(),
            )),
            Arc::new(PostalAdapter::new(client.clone(), config.postal_enabled)),
            Arc::new(SparkpostAdapter::new(
                client.clone(),
                config.sparkpost_enabled,
                config.sparkpost_api_url.clone(),
            )),
            Arc::new(PostmarkAdapter::new(
                client.clone(),
                config.postmark_enabled,
                config.postmark_api_url.clone(),
            )),
            Arc::new(ElasticEmailAdapter::new(
                client,
                config.elasticemail_enabled,
                config.elasticemail_api_url.clone(),
            )),
        ];

        let registry = Self::from_adapters(adapters);
        info!(
            available = ?registry
                .available()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "transport registry built"
        );
        Ok(registry)
    }

    /// Build a registry from explicit adapters. The same requirements
    /// gate applies as for the built-in set.
    pub fn from_adapters(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        let mut table = HashMap::new();
        for adapter in adapters {
            let kind = adapter.kind();
            match adapter.check_requirements() {
                Ok(()) => {
                    table.insert(kind, adapter);
                }
                Err(e) => {
                    warn!(transport = %kind, error = %e, "transport unavailable, removed from registry");
                }
            }
        }
        Self { adapters: table }
    }

    pub fn get(&self, kind: TransportKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// Available kinds, in declaration order.
    pub fn available(&self) -> Vec<TransportKind> {
        TransportKind::ALL
            .into_iter()
            .filter(|kind| self.adapters.contains_key(kind))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
