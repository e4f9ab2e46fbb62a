//! Mailgun web-API transport
//!
//! Form-encoded POST to `/{domain}/messages`; the server's hostname
//! field carries the Mailgun sending domain.

use super::{
    address_with_name, api_key, base_url, reject_attachments, ProviderAdapter, SendReceipt,
};
use crate::params::SendParams;
use async_trait::async_trait;
use mailrotor_common::types::TransportKind;
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::DeliveryServer;
use serde::Deserialize;
use tracing::debug;

pub struct MailgunAdapter {
    client: reqwest::Client,
    enabled: bool,
    api_url: String,
}

#[derive(Deserialize)]
struct MailgunResponse {
    id: String,
}

impl MailgunAdapter {
    pub fn new(client: reqwest::Client, enabled: bool, api_url: String) -> Self {
        Self {
            client,
            enabled,
            api_url,
        }
    }
}

#[async_trait]
impl ProviderAdapter for MailgunAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::MailgunWebApi
    }

    fn check_requirements(&self) -> Result<()> {
        if !self.enabled {
            return Err(Error::Config("mailgun transport is disabled".into()));
        }
        if self.api_url.is_empty() {
            return Err(Error::Config("mailgun api url is not configured".into()));
        }
        Ok(())
    }

    async fn send(&self, server: &DeliveryServer, params: &SendParams) -> Result<SendReceipt> {
        reject_attachments(params, self.kind())?;
        let key = api_key(server)?;

        let mut form: Vec<(String, String)> = vec![
            (
                "from".into(),
                address_with_name(&params.from_email, params.from_name.as_deref()),
            ),
            (
                "to".into(),
                address_with_name(&params.to_email, params.to_name.as_deref()),
            ),
            ("subject".into(), params.subject.clone()),
        ];
        if let Some(html) = &params.html_body {
            form.push(("html".into(), html.clone()));
        }
        if let Some(text) = &params.text_body {
            form.push(("text".into(), text.clone()));
        }
        if let Some(reply_to) = &params.reply_to_email {
            form.push(("h:Reply-To".into(), reply_to.clone()));
        }
        for header in &params.headers {
            form.push((format!("h:{}", header.name), header.value.clone()));
        }

        let url = format!(
            "{}/{}/messages",
            base_url(server, &self.api_url),
            server.hostname
        );
        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(key))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("mailgun request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "mailgun rejected the message: {status} {body}"
            )));
        }

        let body: MailgunResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("mailgun response unreadable: {e}")))?;

        let message_id = body.id.trim_matches(['<', '>']).to_string();
        debug!(server = %server.name, %message_id, "message accepted by mailgun");
        Ok(SendReceipt { message_id })
    }
}
