//! Postal web-API transport
//!
//! Postal installs are self-hosted, so the endpoint comes from the
//! server row rather than global configuration.

use super::{address_with_name, api_key, reject_attachments, ProviderAdapter, SendReceipt};
use crate::params::{parse_headers_into_key_value, SendParams};
use async_trait::async_trait;
use mailrotor_common::types::TransportKind;
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::DeliveryServer;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

pub struct PostalAdapter {
    client: reqwest::Client,
    enabled: bool,
}

#[derive(Deserialize)]
struct PostalResponse {
    status: String,
    data: PostalData,
}

#[derive(Deserialize)]
struct PostalData {
    #[serde(default)]
    message_id: Option<String>,
}

impl PostalAdapter {
    pub fn new(client: reqwest::Client, enabled: bool) -> Self {
        Self { client, enabled }
    }
}

#[async_trait]
impl ProviderAdapter for PostalAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::PostalWebApi
    }

    fn check_requirements(&self) -> Result<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(Error::Config("postal transport is disabled".into()))
        }
    }

    async fn send(&self, server: &DeliveryServer, params: &SendParams) -> Result<SendReceipt> {
        reject_attachments(params, self.kind())?;
        let key = api_key(server)?;
        let endpoint = server
            .api_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                Error::Transport(format!("postal server '{}' has no API URL", server.name))
            })?;

        let headers: BTreeMap<String, String> =
            parse_headers_into_key_value(&params.headers).into_iter().collect();

        let body = json!({
            "to": [address_with_name(&params.to_email, params.to_name.as_deref())],
            "from": address_with_name(&params.from_email, params.from_name.as_deref()),
            "reply_to": params.reply_to_email,
            "subject": params.subject,
            "html_body": params.html_body,
            "plain_body": params.text_body,
            "headers": headers,
        });

        let url = format!("{}/api/v1/send/message", endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("X-Server-API-Key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("postal request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "postal rejected the message: {status} {body}"
            )));
        }

        let body: PostalResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("postal response unreadable: {e}")))?;

        // Postal reports API-level failures inside a 200 response.
        if body.status != "success" {
            return Err(Error::Transport(format!(
                "postal reported status '{}'",
                body.status
            )));
        }

        let message_id = body.data.message_id.unwrap_or_default();
        debug!(server = %server.name, %message_id, "message accepted by postal");
        Ok(SendReceipt { message_id })
    }
}
