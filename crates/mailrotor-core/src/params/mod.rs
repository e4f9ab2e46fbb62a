//! Canonical send-parameter assembly
//!
//! Every transport adapter consumes the same `SendParams`. The assembler
//! layers caller overrides over the server's own defaults; the server's
//! force-from/reply-to policy can push the server default over a caller
//! address whose domain has no verified signing domain. Signing
//! resolution also decides the return path: a verified signing domain
//! aligns it with the from address, otherwise bounces go back to the
//! server default.

mod headers;

pub use headers::{parse_headers_format, parse_headers_into_key_value, Header};

use mailrotor_common::types::{CustomerId, ForcePolicy};
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::DeliveryServer;
use mailrotor_storage::repository::{SendingDomainRepositoryTrait, TrackingDomainRepositoryTrait};
use std::sync::Arc;
use tracing::debug;

/// File attachment carried through to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Caller-supplied message content and overrides. Anything left `None`
/// falls through to the lower-precedence sources.
#[derive(Debug, Clone, Default)]
pub struct SendOverrides {
    pub to_email: Option<String>,
    pub to_name: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub reply_to_email: Option<String>,
    pub return_path: Option<String>,
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub headers: Vec<Header>,
    pub attachments: Vec<Attachment>,
}

/// Fully assembled parameters handed to a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendParams {
    pub to_email: String,
    pub to_name: Option<String>,
    pub from_email: String,
    pub from_name: Option<String>,
    pub reply_to_email: Option<String>,
    pub return_path: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub headers: Vec<Header>,
    pub attachments: Vec<Attachment>,
}

/// Merges server defaults, signing/tracking domain lookups and caller
/// overrides into canonical `SendParams`.
pub struct ParamsAssembler {
    signing_domains: Arc<dyn SendingDomainRepositoryTrait>,
    tracking_domains: Arc<dyn TrackingDomainRepositoryTrait>,
    app_host: String,
}

impl ParamsAssembler {
    pub fn new(
        signing_domains: Arc<dyn SendingDomainRepositoryTrait>,
        tracking_domains: Arc<dyn TrackingDomainRepositoryTrait>,
        app_url: &str,
    ) -> Self {
        Self {
            signing_domains,
            tracking_domains,
            app_host: host_of(app_url).to_string(),
        }
    }

    pub async fn assemble(
        &self,
        server: &DeliveryServer,
        customer_id: Option<CustomerId>,
        overrides: &SendOverrides,
    ) -> Result<SendParams> {
        let to_email = overrides
            .to_email
            .clone()
            .ok_or_else(|| Error::Validation("send is missing a recipient address".into()))?;

        let from_email = self.resolve_from(server, customer_id, overrides).await?;

        let signing = self
            .signing_domains
            .find_verified(email_domain(&from_email), customer_id)
            .await?;
        let return_path = match &overrides.return_path {
            Some(path) => path.clone(),
            None if signing.is_some() => from_email.clone(),
            None => server.from_email.clone(),
        };

        let reply_to_email = self.resolve_reply_to(server, customer_id, overrides).await?;

        let headers = merge_headers(
            parse_headers_format(&server.custom_headers),
            &overrides.headers,
        );

        let mut params = SendParams {
            to_email,
            to_name: overrides.to_name.clone(),
            from_email,
            from_name: overrides
                .from_name
                .clone()
                .or_else(|| server.from_name.clone()),
            reply_to_email,
            return_path,
            subject: overrides.subject.clone().unwrap_or_default(),
            html_body: overrides.html_body.clone(),
            text_body: overrides.text_body.clone(),
            headers,
            attachments: overrides.attachments.clone(),
        };

        self.rewrite_tracking_urls(server, &mut params).await?;

        Ok(params)
    }

    /// From-address resolution. An unset slot always takes the server
    /// default. A caller-supplied from is kept, except under the
    /// `when-no-signing-domain` policy, which forces the server default
    /// when the caller's from domain carries no verified signing domain.
    async fn resolve_from(
        &self,
        server: &DeliveryServer,
        customer_id: Option<CustomerId>,
        overrides: &SendOverrides,
    ) -> Result<String> {
        let Some(from) = &overrides.from_email else {
            return Ok(server.from_email.clone());
        };

        if server.force_from_policy() == ForcePolicy::WhenNoSigningDomain
            && !self.is_signed(from, customer_id).await?
        {
            debug!(from = %from, "no verified signing domain, forcing server from");
            return Ok(server.from_email.clone());
        }

        Ok(from.clone())
    }

    /// Reply-to resolution, mirroring `resolve_from` under the server's
    /// force-reply-to policy.
    async fn resolve_reply_to(
        &self,
        server: &DeliveryServer,
        customer_id: Option<CustomerId>,
        overrides: &SendOverrides,
    ) -> Result<Option<String>> {
        let Some(reply_to) = &overrides.reply_to_email else {
            return Ok(server.reply_to_email.clone());
        };

        if server.force_reply_to_policy() == ForcePolicy::WhenNoSigningDomain
            && !self.is_signed(reply_to, customer_id).await?
        {
            debug!(reply_to = %reply_to, "no verified signing domain, forcing server reply-to");
            return Ok(server.reply_to_email.clone());
        }

        Ok(Some(reply_to.clone()))
    }

    async fn is_signed(&self, address: &str, customer_id: Option<CustomerId>) -> Result<bool> {
        Ok(self
            .signing_domains
            .find_verified(email_domain(address), customer_id)
            .await?
            .is_some())
    }

    /// Substitute the server's verified tracking host for the application
    /// host in bodies and header values, keeping the scheme.
    async fn rewrite_tracking_urls(
        &self,
        server: &DeliveryServer,
        params: &mut SendParams,
    ) -> Result<()> {
        let Some(tracking_id) = server.tracking_domain_id else {
            return Ok(());
        };
        let Some(tracking) = self.tracking_domains.get_verified(tracking_id).await? else {
            debug!(%tracking_id, "tracking domain missing or unverified, leaving URLs");
            return Ok(());
        };

        let swap = |text: &str| swap_host(text, &self.app_host, &tracking.name);

        if let Some(html) = &params.html_body {
            params.html_body = Some(swap(html));
        }
        if let Some(text) = &params.text_body {
            params.text_body = Some(swap(text));
        }
        for header in &mut params.headers {
            header.value = swap(&header.value);
        }

        Ok(())
    }
}

/// Server headers first, caller headers appended; a caller header wins a
/// case-insensitive name collision.
fn merge_headers(server_headers: Vec<Header>, caller_headers: &[Header]) -> Vec<Header> {
    let mut merged: Vec<Header> = server_headers
        .into_iter()
        .filter(|h| {
            !caller_headers
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&h.name))
        })
        .collect();
    merged.extend(caller_headers.iter().cloned());
    merged
}

/// Replace `http(s)://old_host` with the same scheme on `new_host`.
fn swap_host(text: &str, old_host: &str, new_host: &str) -> String {
    let mut out = text.to_string();
    for scheme in ["https", "http"] {
        out = out.replace(
            &format!("{scheme}://{old_host}"),
            &format!("{scheme}://{new_host}"),
        );
    }
    out
}

/// Host portion of a URL, with any scheme and path stripped.
fn host_of(url: &str) -> &str {
    let rest = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#'])
        .next()
        .unwrap_or(rest)
}

/// Domain part of an email address; the whole string when there is no
/// `@`, so bare domains work too.
fn email_domain(address: &str) -> &str {
    address.rsplit('@').next().unwrap_or(address)
}
