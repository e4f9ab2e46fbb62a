//! Postmark web-API transport

use super::{
    address_with_name, api_key, base_url, reject_attachments, ProviderAdapter, SendReceipt,
};
use crate::params::SendParams;
use async_trait::async_trait;
use mailrotor_common::types::TransportKind;
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::DeliveryServer;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub struct PostmarkAdapter {
    client: reqwest::Client,
    enabled: bool,
    api_url: String,
}

#[derive(Deserialize)]
struct PostmarkResponse {
    #[serde(rename = "MessageID")]
    message_id: String,
}

impl PostmarkAdapter {
    pub fn new(client: reqwest::Client, enabled: bool, api_url: String) -> Self {
        Self {
            client,
            enabled,
            api_url,
        }
    }
}

#[async_trait]
impl ProviderAdapter for PostmarkAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::PostmarkWebApi
    }

    fn check_requirements(&self) -> Result<()> {
        if !self.enabled {
            return Err(Error::Config("postmark transport is disabled".into()));
        }
        if self.api_url.is_empty() {
            return Err(Error::Config("postmark api url is not configured".into()));
        }
        Ok(())
    }

    async fn send(&self, server: &DeliveryServer, params: &SendParams) -> Result<SendReceipt> {
        reject_attachments(params, self.kind())?;
        let key = api_key(server)?;

        let headers: Vec<_> = params
            .headers
            .iter()
            .map(|h| json!({"Name": h.name, "Value": h.value}))
            .collect();

        let body = json!({
            "From": address_with_name(&params.from_email, params.from_name.as_deref()),
            "To": address_with_name(&params.to_email, params.to_name.as_deref()),
            "ReplyTo": params.reply_to_email,
            "Subject": params.subject,
            "HtmlBody": params.html_body,
            "TextBody": params.text_body,
            "Headers": headers,
        });

        let url = format!("{}/email", base_url(server, &self.api_url));
        let response = self
            .client
            .post(&url)
            .header("X-Postmark-Server-Token", key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("postmark request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "postmark rejected the message: {status} {body}"
            )));
        }

        let body: PostmarkResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("postmark response unreadable: {e}")))?;

        debug!(server = %server.name, message_id = %body.message_id, "message accepted by postmark");
        Ok(SendReceipt {
            message_id: body.message_id,
        })
    }
}
