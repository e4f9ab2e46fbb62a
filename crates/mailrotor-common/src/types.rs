//! Common types for mailrotor

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for delivery servers
pub type ServerId = Uuid;

/// Unique identifier for customers
pub type CustomerId = Uuid;

/// Unique identifier for customer groups
pub type GroupId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for usage-log entries
pub type UsageLogId = Uuid;

/// Unique identifier for sending domains
pub type SendingDomainId = Uuid;

/// Unique identifier for tracking domains
pub type TrackingDomainId = Uuid;

/// Unique identifier for transactional emails
pub type TransactionalEmailId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Delivery server status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerStatus {
    Active,
    InUse,
    Inactive,
    PendingDelete,
    Hidden,
}

impl ServerStatus {
    /// Statuses under which a server may be handed out by the picker.
    pub fn is_sendable(self) -> bool {
        matches!(self, ServerStatus::Active | ServerStatus::InUse)
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerStatus::Active => "active",
            ServerStatus::InUse => "in-use",
            ServerStatus::Inactive => "inactive",
            ServerStatus::PendingDelete => "pending-delete",
            ServerStatus::Hidden => "hidden",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ServerStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ServerStatus::Active),
            "in-use" => Ok(ServerStatus::InUse),
            "inactive" => Ok(ServerStatus::Inactive),
            "pending-delete" => Ok(ServerStatus::PendingDelete),
            "hidden" => Ok(ServerStatus::Hidden),
            other => Err(crate::Error::Validation(format!(
                "Unknown server status: {}",
                other
            ))),
        }
    }
}

/// Outbound transport kind, one per provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Smtp,
    MailgunWebApi,
    PostalWebApi,
    SparkpostWebApi,
    PostmarkWebApi,
    ElasticEmailWebApi,
}

impl TransportKind {
    /// All known transport kinds, in registry order.
    pub const ALL: [TransportKind; 6] = [
        TransportKind::Smtp,
        TransportKind::MailgunWebApi,
        TransportKind::PostalWebApi,
        TransportKind::SparkpostWebApi,
        TransportKind::PostmarkWebApi,
        TransportKind::ElasticEmailWebApi,
    ];
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Smtp => "smtp",
            TransportKind::MailgunWebApi => "mailgun-web-api",
            TransportKind::PostalWebApi => "postal-web-api",
            TransportKind::SparkpostWebApi => "sparkpost-web-api",
            TransportKind::PostmarkWebApi => "postmark-web-api",
            TransportKind::ElasticEmailWebApi => "elasticemail-web-api",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TransportKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smtp" => Ok(TransportKind::Smtp),
            "mailgun-web-api" => Ok(TransportKind::MailgunWebApi),
            "postal-web-api" => Ok(TransportKind::PostalWebApi),
            "sparkpost-web-api" => Ok(TransportKind::SparkpostWebApi),
            "postmark-web-api" => Ok(TransportKind::PostmarkWebApi),
            "elasticemail-web-api" => Ok(TransportKind::ElasticEmailWebApi),
            other => Err(crate::Error::Validation(format!(
                "Unknown transport kind: {}",
                other
            ))),
        }
    }
}

/// Category of mail a delivery is for; servers restrict themselves to
/// one category or accept all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryFor {
    All,
    Campaigns,
    Transactional,
    ListEmails,
    Tests,
    Reports,
}

impl std::fmt::Display for DeliveryFor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeliveryFor::All => "all",
            DeliveryFor::Campaigns => "campaigns",
            DeliveryFor::Transactional => "transactional",
            DeliveryFor::ListEmails => "list-emails",
            DeliveryFor::Tests => "tests",
            DeliveryFor::Reports => "reports",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for DeliveryFor {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(DeliveryFor::All),
            "campaigns" => Ok(DeliveryFor::Campaigns),
            "transactional" => Ok(DeliveryFor::Transactional),
            "list-emails" => Ok(DeliveryFor::ListEmails),
            "tests" => Ok(DeliveryFor::Tests),
            "reports" => Ok(DeliveryFor::Reports),
            other => Err(crate::Error::Validation(format!(
                "Unknown delivery category: {}",
                other
            ))),
        }
    }
}

/// Policy controlling when a server's own from/reply-to address replaces
/// the one supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForcePolicy {
    Never,
    Always,
    WhenNoSigningDomain,
}

impl Default for ForcePolicy {
    fn default() -> Self {
        ForcePolicy::Never
    }
}

impl std::fmt::Display for ForcePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ForcePolicy::Never => "never",
            ForcePolicy::Always => "always",
            ForcePolicy::WhenNoSigningDomain => "when-no-signing-domain",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ForcePolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(ForcePolicy::Never),
            "always" => Ok(ForcePolicy::Always),
            "when-no-signing-domain" => Ok(ForcePolicy::WhenNoSigningDomain),
            other => Err(crate::Error::Validation(format!(
                "Unknown force policy: {}",
                other
            ))),
        }
    }
}

/// Quota accounting period. Windows are calendar-aligned in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    Hourly,
    Daily,
    Monthly,
}

impl QuotaPeriod {
    /// All periods, checked independently; any exhausted period makes the
    /// owner over-quota.
    pub const ALL: [QuotaPeriod; 3] = [
        QuotaPeriod::Hourly,
        QuotaPeriod::Daily,
        QuotaPeriod::Monthly,
    ];

    /// Start of the window containing `now`.
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            QuotaPeriod::Hourly => Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
                .single()
                .unwrap_or(now),
            QuotaPeriod::Daily => Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
                .single()
                .unwrap_or(now),
            QuotaPeriod::Monthly => Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(now),
        }
    }
}

impl std::fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuotaPeriod::Hourly => "hourly",
            QuotaPeriod::Daily => "daily",
            QuotaPeriod::Monthly => "monthly",
        };
        write!(f, "{}", s)
    }
}

/// Customer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Inactive,
    PendingDelete,
}

impl std::str::FromStr for CustomerStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CustomerStatus::Active),
            "inactive" => Ok(CustomerStatus::Inactive),
            "pending-delete" => Ok(CustomerStatus::PendingDelete),
            other => Err(crate::Error::Validation(format!(
                "Unknown customer status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CustomerStatus::Active => "active",
            CustomerStatus::Inactive => "inactive",
            CustomerStatus::PendingDelete => "pending-delete",
        };
        write!(f, "{}", s)
    }
}

/// The entity a send is performed on behalf of. Determines the owning
/// customer, the server category filter, and (for campaigns) an optional
/// admin-selected server allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryObject {
    Campaign {
        campaign_id: CampaignId,
        customer_id: CustomerId,
        /// Admin-restricted server allow-list; empty means unrestricted.
        #[serde(default)]
        server_ids: Vec<ServerId>,
    },
    Transactional {
        customer_id: Option<CustomerId>,
    },
    ListEmail {
        customer_id: CustomerId,
    },
    TemplateTest {
        customer_id: CustomerId,
    },
    Report {
        customer_id: Option<CustomerId>,
    },
}

impl DeliveryObject {
    /// The owning customer, if any. `None` means a system-level send that
    /// only system-wide servers may carry.
    pub fn customer_id(&self) -> Option<CustomerId> {
        match self {
            DeliveryObject::Campaign { customer_id, .. } => Some(*customer_id),
            DeliveryObject::Transactional { customer_id } => *customer_id,
            DeliveryObject::ListEmail { customer_id } => Some(*customer_id),
            DeliveryObject::TemplateTest { customer_id } => Some(*customer_id),
            DeliveryObject::Report { customer_id } => *customer_id,
        }
    }

    /// The server category this delivery falls under.
    pub fn delivery_for(&self) -> DeliveryFor {
        match self {
            DeliveryObject::Campaign { .. } => DeliveryFor::Campaigns,
            DeliveryObject::Transactional { .. } => DeliveryFor::Transactional,
            DeliveryObject::ListEmail { .. } => DeliveryFor::ListEmails,
            DeliveryObject::TemplateTest { .. } => DeliveryFor::Tests,
            DeliveryObject::Report { .. } => DeliveryFor::Reports,
        }
    }

    /// Admin-selected allow-list, when present and non-empty.
    pub fn allowed_server_ids(&self) -> Option<&[ServerId]> {
        match self {
            DeliveryObject::Campaign { server_ids, .. } if !server_ids.is_empty() => {
                Some(server_ids)
            }
            _ => None,
        }
    }
}
