//! Elastic Email web-API transport

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

pub struct ElasticEmailAdapter {
    client: reqwest::Client,
    enabled: bool,
    api_url: String,
}

#[derive(Deserialize)]
struct ElasticEmailResponse {
    #[serde(rename = "MessageID", default)]
    message_id: Option<String>,
    #[serde(rename = "TransactionID", default)]
    transaction_id: Option<String>,
}

impl ElasticEmailAdapter {
    pub fn new(client: reqwest::Client, enabled: bool, api_url: String) -> Self {
        Self {
            client,
            enabled,
            api_url,
        }
    }
}

#[async_trait]
impl ProviderAdapter for ElasticEmailAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::ElasticEmailWebApi
    }

    fn check_requirements(&self) -> Result<()> {
        if !self.enabled {
            return Err(Error::Config("elasticemail transport is disabled".into()));
        }
        if self.api_url.is_empty() {
            return Err(Error::Config(
                "elasticemail api url is not configured".into(),
            ));
        }
        Ok(())
    }

    async fn send(&self, server: &DeliveryServer, params: &SendParams) -> Result<SendReceipt> {
        reject_attachments(params, self.kind())?;
        let key = api_key(server)?;

        let headers: BTreeMap<String, String> =
            parse_headers_into_key_value(&params.headers).into_iter().collect();

        let mut body_parts = Vec::new();
        if let Some(html) = &params.html_body {
            body_parts.push(json!({"ContentType": "HTML", "Content": html}));
        }
        if let Some(text) = &params.text_body {
            body_parts.push(json!({"ContentType": "PlainText", "Content": text}));
        }

        let body = json!({
            "Recipients": [{"Email": params.to_email}],
            "Content": {
                "From": params.from_email,
                "ReplyTo": params.reply_to_email,
                "Subject": params.subject,
                "Body": body_parts,
                "Headers": headers,
            },
        });

        let url = format!("{}/emails", base_url(server, &self.api_url));
        let response = self
            .client
            .post(&url)
            .header("X-ElasticEmail-ApiKey", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("elasticemail request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "elasticemail rejected the message: {status} {body}"
            )));
        }

        let body: ElasticEmailResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("elasticemail response unreadable: {e}")))?;

        let message_id = body
            .message_id
            .or(body.transaction_id)
            .unwrap_or_default();
        debug!(server = %server.name, %message_id, "message accepted by elasticemail");
        Ok(SendReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::server;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> SendParams {
        SendParams {
            to_email: "rcpt@example.org".into(),
            to_name: None,
            from_email: "noreply@example.com".into(),
            from_name: None,
            reply_to_email: None,
            return_path: "noreply@example.com".into(),
            subject: "hello".into(),
            html_body: Some("<p>hi</p>".into()),
            text_body: Some("hi".into()),
            headers: vec![],
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_posts_to_emails_endpoint() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("X-ElasticEmail-ApiKey", "key-123"))
            .and(body_partial_json(serde_json::json!({
                "Recipients": [{"Email": "rcpt@example.org"}],
                "Content": {"Subject": "hello"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "TransactionID": "tx-1",
                "MessageID": "ee-77",
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let mut s = server("ee", 100);
        s.api_key = Some("key-123".into());
        s.api_url = Some(mock.uri());

        let adapter = ElasticEmailAdapter::new(reqwest::Client::new(), true, String::new());
        let receipt = adapter.send(&s, &params()).await.unwrap();
        assert_eq!(receipt.message_id, "ee-77");
    }

    #[tokio::test]
    async fn test_rejection_is_a_transport_error() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&mock)
            .await;

        let mut s = server("ee", 100);
        s.api_key = Some("key-123".into());
        s.api_url = Some(mock.uri());

        let adapter = ElasticEmailAdapter::new(reqwest::Client::new(), true, String::new());
        let err = adapter.send(&s, &params()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
