//! Database models

use chrono::{DateTime, Utc};
use mailrotor_common::types::{
    CustomerId, CustomerStatus, DeliveryFor, ForcePolicy, GroupId, QuotaPeriod, SendingDomainId,
    ServerId, ServerStatus, TrackingDomainId, TransactionalEmailId, TransportKind, UsageLogId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Delivery server model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryServer {
    pub id: ServerId,
    /// Owning customer; NULL means a shared (group or system-wide) server
    pub customer_id: Option<CustomerId>,
    /// Group the server is shared with, when customer_id is NULL
    pub group_id: Option<GroupId>,
    pub name: String,
    pub transport: String,
    pub hostname: String,
    pub port: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub from_email: String,
    pub from_name: Option<String>,
    pub reply_to_email: Option<String>,
    /// Operator-assigned weight, 0-100
    pub probability: i32,
    /// 0 means unlimited
    pub hourly_quota: i64,
    pub daily_quota: i64,
    pub monthly_quota: i64,
    pub timeout_secs: i32,
    pub use_for: String,
    pub force_from: String,
    pub force_reply_to: String,
    pub custom_headers: serde_json::Value,
    pub tracking_domain_id: Option<TrackingDomainId>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryServer {
    /// Parsed transport kind
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.transport.parse().ok()
    }

    /// Parsed status; unknown strings are treated as hidden
    pub fn status_enum(&self) -> ServerStatus {
        self.status.parse().unwrap_or(ServerStatus::Hidden)
    }

    /// Parsed use-for scope; unknown strings are treated as all
    pub fn use_for_enum(&self) -> DeliveryFor {
        self.use_for.parse().unwrap_or(DeliveryFor::All)
    }

    /// Parsed force-from policy
    pub fn force_from_policy(&self) -> ForcePolicy {
        self.force_from.parse().unwrap_or_default()
    }

    /// Parsed force-reply-to policy
    pub fn force_reply_to_policy(&self) -> ForcePolicy {
        self.force_reply_to.parse().unwrap_or_default()
    }

    /// Quota ceiling for the given period; 0 means unlimited
    pub fn quota_ceiling(&self, period: QuotaPeriod) -> i64 {
        match period {
            QuotaPeriod::Hourly => self.hourly_quota,
            QuotaPeriod::Daily => self.daily_quota,
            QuotaPeriod::Monthly => self.monthly_quota,
        }
    }

    /// Whether the server accepts mail of the given category
    pub fn can_send_for(&self, delivery_for: DeliveryFor) -> bool {
        let own = self.use_for_enum();
        own == DeliveryFor::All || own == delivery_for
    }
}

/// Append-only usage-log entry; the source of truth quota counters are
/// rebuilt from on cache miss.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub id: UsageLogId,
    pub server_id: ServerId,
    pub customer_id: Option<CustomerId>,
    pub delivery_for: String,
    pub countable: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a usage-log row
#[derive(Debug, Clone)]
pub struct NewUsageLog {
    pub server_id: ServerId,
    pub customer_id: Option<CustomerId>,
    pub delivery_for: DeliveryFor,
    pub countable: bool,
}

/// Customer model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub group_id: Option<GroupId>,
    pub name: String,
    pub status: String,
    /// 0 means unlimited
    pub hourly_quota: i64,
    pub daily_quota: i64,
    pub monthly_quota: i64,
    /// May honor a campaign's admin-selected server allow-list
    pub can_select_servers: bool,
    /// May fall back to system-wide servers
    pub can_use_system_servers: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Parsed status; unknown strings are treated as inactive
    pub fn status_enum(&self) -> CustomerStatus {
        self.status.parse().unwrap_or(CustomerStatus::Inactive)
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == CustomerStatus::Active
    }

    /// Quota ceiling for the given period; 0 means unlimited
    pub fn quota_ceiling(&self, period: QuotaPeriod) -> i64 {
        match period {
            QuotaPeriod::Hourly => self.hourly_quota,
            QuotaPeriod::Daily => self.daily_quota,
            QuotaPeriod::Monthly => self.monthly_quota,
        }
    }
}

/// Verified DKIM signing domain. Resolution gates the force-from policy;
/// actual signing happens at the provider or relay.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SendingDomain {
    pub id: SendingDomainId,
    pub customer_id: Option<CustomerId>,
    pub name: String,
    pub dkim_selector: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tracking CNAME substituted for the application host in message bodies
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackingDomain {
    pub id: TrackingDomainId,
    pub customer_id: Option<CustomerId>,
    pub name: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Queued transactional email
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransactionalEmail {
    pub id: TransactionalEmailId,
    pub customer_id: Option<CustomerId>,
    pub to_email: String,
    pub to_name: Option<String>,
    pub from_email: String,
    pub from_name: Option<String>,
    pub reply_to_email: Option<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub headers: serde_json::Value,
    pub status: String,
    pub priority: i32,
    pub retries: i32,
    pub max_retries: i32,
    pub send_at: DateTime<Utc>,
    pub sent_message_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionalEmail {
    pub fn retries_exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }
}

/// Input for enqueueing a transactional email
#[derive(Debug, Clone)]
pub struct NewTransactionalEmail {
    pub customer_id: Option<CustomerId>,
    pub to_email: String,
    pub to_name: Option<String>,
    pub from_email: String,
    pub from_name: Option<String>,
    pub reply_to_email: Option<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub headers: serde_json::Value,
    pub send_at: Option<DateTime<Utc>>,
    pub max_retries: Option<i32>,
}
