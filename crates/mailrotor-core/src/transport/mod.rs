//! Provider transport adapters
//!
//! One adapter per transport kind, all consuming the same canonical
//! `SendParams`. Adapters translate to the provider wire format and hand
//! back the provider's message id; they do not retry or pick servers.

mod elasticemail;
mod mailgun;
mod postal;
mod postmark;
mod registry;
mod smtp;
mod sparkpost;

pub use elasticemail::ElasticEmailAdapter;
pub use mailgun::MailgunAdapter;
pub use postal::PostalAdapter;
pub use postmark::PostmarkAdapter;
pub use registry::AdapterRegistry;
pub use smtp::SmtpAdapter;
pub use sparkpost::SparkpostAdapter;

use crate::params::SendParams;
use async_trait::async_trait;
use mailrotor_common::types::TransportKind;
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::DeliveryServer;

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
}

/// A single outbound transport.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Startup gate: a failing adapter is removed from the registry and
    /// never called per-send.
    fn check_requirements(&self) -> Result<()>;

    async fn send(&self, server: &DeliveryServer, params: &SendParams) -> Result<SendReceipt>;
}

/// The server's API key, required by every web-API transport.
fn api_key(server: &DeliveryServer) -> Result<&str> {
    server
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            Error::Transport(format!("server '{}' has no API key configured", server.name))
        })
}

/// Web-API adapters here only carry inline bodies; attachments need the
/// SMTP transport.
fn reject_attachments(params: &SendParams, kind: TransportKind) -> Result<()> {
    if params.attachments.is_empty() {
        Ok(())
    } else {
        Err(Error::Transport(format!(
            "{kind} transport does not carry attachments"
        )))
    }
}

/// Per-server endpoint override, falling back to the configured base.
fn base_url<'a>(server: &'a DeliveryServer, configured: &'a str) -> &'a str {
    server
        .api_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(configured)
        .trim_end_matches('/')
}

/// RFC 5322 display form: `Name <addr>` when a display name exists.
fn address_with_name(email: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => format!("{name} <{email}>"),
        _ => email.to_string(),
    }
}
