//! SparkPost web-API transport

use super::{api_key, base_url, reject_attachments, ProviderAdapter, SendReceipt};
use crate::params::{parse_headers_into_key_value, SendParams};
use async_trait::async_trait;
use mailrotor_common::types::TransportKind;
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::DeliveryServer;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

pub struct SparkpostAdapter {
    client: reqwest::Client,
    enabled: bool,
    api_url: String,
}

#[derive(Deserialize)]
struct SparkpostResponse {
    results: SparkpostResults,
}

#[derive(Deserialize)]
struct SparkpostResults {
    id: String,
}

impl SparkpostAdapter {
    pub fn new(client: reqwest::Client, enabled: bool, api_url: String) -> Self {
        Self {
            client,
            enabled,
            api_url,
        }
    }
}

#[async_trait]
impl ProviderAdapter for SparkpostAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::SparkpostWebApi
    }

    fn check_requirements(&self) -> Result<()> {
        if !self.enabled {
            return Err(Error::Config("sparkpost transport is disabled".into()));
        }
        if self.api_url.is_empty() {
            return Err(Error::Config("sparkpost api url is not configured".into()));
        }
        Ok(())
    }

    async fn send(&self, server: &DeliveryServer, params: &SendParams) -> Result<SendReceipt> {
        reject_attachments(params, self.kind())?;
        let key = api_key(server)?;

        let headers: BTreeMap<String, String> =
            parse_headers_into_key_value(&params.headers).into_iter().collect();

        let body = json!({
            "options": {"transactional": true},
            "recipients": [{
                "address": {"email": params.to_email, "name": params.to_name},
            }],
            "content": {
                "from": {"email": params.from_email, "name": params.from_name},
                "reply_to": params.reply_to_email,
                "subject": params.subject,
                "html": params.html_body,
                "text": params.text_body,
                "headers": headers,
            },
        });

        let url = format!("{}/transmissions", base_url(server, &self.api_url));
        let response = self
            .client
            .post(&url)
            .header("Authorization", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("sparkpost request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "sparkpost rejected the message: {status} {body}"
            )));
        }

        let body: SparkpostResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("sparkpost response unreadable: {e}")))?;

        debug!(server = %server.name, message_id = %body.results.id, "message accepted by sparkpost");
        Ok(SendReceipt {
            message_id: body.results.id,
        })
    }
}
