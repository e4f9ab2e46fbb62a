//! SMTP relay transport
//!
//! Builds the raw MIME message and hands it to the server's relay over
//! lettre. Port 465 gets implicit TLS, anything else STARTTLS.

use super::{ProviderAdapter, SendReceipt};
use crate::params::SendParams;
use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use mail_builder::headers::raw::Raw;
use mail_builder::MessageBuilder;
use mailrotor_common::types::TransportKind;
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::DeliveryServer;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub struct SmtpAdapter {
    enabled: bool,
}

impl SmtpAdapter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn relay(&self, server: &DeliveryServer) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if server.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&server.hostname)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server.hostname)
        }
        .map_err(|e| Error::Transport(format!("smtp relay setup failed: {e}")))?;

        let mut builder = builder
            .port(server.port as u16)
            .timeout(Some(Duration::from_secs(server.timeout_secs.max(1) as u64)));

        if let (Some(username), Some(password)) = (&server.username, &server.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

/// Raw RFC 5322 message for the given params; returns the generated
/// message id alongside the bytes.
fn build_mime(server: &DeliveryServer, params: &SendParams) -> Result<(String, Vec<u8>)> {
    let message_id = format!("{}@{}", Uuid::new_v4(), server.hostname);

    let mut builder = MessageBuilder::new()
        .to(params.to_email.as_str())
        .subject(params.subject.as_str())
        .header("Message-ID", Raw::new(format!("<{message_id}>")));

    builder = match params.from_name.as_deref() {
        Some(name) if !name.is_empty() => {
            builder.from((name, params.from_email.as_str()))
        }
        _ => builder.from(params.from_email.as_str()),
    };

    if let Some(reply_to) = &params.reply_to_email {
        builder = builder.reply_to(reply_to.as_str());
    }
    if let Some(html) = &params.html_body {
        builder = builder.html_body(html.as_str());
    }
    if let Some(text) = &params.text_body {
        builder = builder.text_body(text.as_str());
    }
    for header in &params.headers {
        builder = builder.header(header.name.as_str(), Raw::new(header.value.as_str()));
    }
    for attachment in &params.attachments {
        builder = builder.attachment(
            attachment.content_type.as_str(),
            attachment.file_name.as_str(),
            attachment.data.as_slice(),
        );
    }

    let raw = builder
        .write_to_vec()
        .map_err(|e| Error::Transport(format!("mime build failed: {e}")))?;

    Ok((message_id, raw))
}

#[async_trait]
impl ProviderAdapter for SmtpAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Smtp
    }

    fn check_requirements(&self) -> Result<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(Error::Config("smtp transport is disabled".into()))
        }
    }

    async fn send(&self, server: &DeliveryServer, params: &SendParams) -> Result<SendReceipt> {
        let (message_id, raw) = build_mime(server, params)?;

        let sender = params
            .return_path
            .parse::<Address>()
            .map_err(|e| Error::Validation(format!("bad return path: {e}")))?;
        let recipient = params
            .to_email
            .parse::<Address>()
            .map_err(|e| Error::Validation(format!("bad recipient: {e}")))?;
        let envelope = Envelope::new(Some(sender), vec![recipient])
            .map_err(|e| Error::Transport(format!("bad envelope: {e}")))?;

        let relay = self.relay(server)?;
        relay
            .send_raw(&envelope, &raw)
            .await
            .map_err(|e| Error::Transport(format!("smtp send failed: {e}")))?;

        debug!(server = %server.name, %message_id, "message relayed over smtp");
        Ok(SendReceipt { message_id })
    }
}
