//! In-memory repository fakes and model builders for tests

use crate::params::SendParams;
use crate::transport::{ProviderAdapter, SendReceipt};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mailrotor_common::types::{
    CustomerId, DeliveryFor, GroupId, ServerId, TrackingDomainId, TransactionalEmailId,
    TransportKind,
};
use mailrotor_common::{Error, Result};
use mailrotor_storage::models::{
    Customer, DeliveryServer, NewTransactionalEmail, NewUsageLog, SendingDomain, TrackingDomain,
    TransactionalEmail, UsageLogEntry,
};
use mailrotor_storage::repository::{
    CustomerRepositoryTrait, DeliveryServerRepositoryTrait, SendingDomainRepositoryTrait,
    TrackingDomainRepositoryTrait, TransactionalEmailRepositoryTrait, UsageLogRepositoryTrait,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

pub fn server(name: &str, probability: i32) -> DeliveryServer {
    DeliveryServer {
        id: Uuid::new_v4(),
        customer_id: None,
        group_id: None,
        name: name.to_string(),
        transport: "smtp".into(),
        hostname: "smtp.example.com".into(),
        port: 587,
        username: None,
        password: None,
        api_key: None,
        api_url: None,
        from_email: "noreply@example.com".into(),
        from_name: Some("Example".into()),
        reply_to_email: None,
        probability,
        hourly_quota: 0,
        daily_quota: 0,
        monthly_quota: 0,
        timeout_secs: 30,
        use_for: "all".into(),
        force_from: "never".into(),
        force_reply_to: "never".into(),
        custom_headers: serde_json::json!([]),
        tracking_domain_id: None,
        status: "active".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn customer() -> Customer {
    Customer {
        id: Uuid::new_v4(),
        group_id: None,
        name: "acme".into(),
        status: "active".into(),
        hourly_quota: 0,
        daily_quota: 0,
        monthly_quota: 0,
        can_select_servers: true,
        can_use_system_servers: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// In-memory usage log
#[derive(Default)]
pub struct MemoryUsageLog {
    entries: RwLock<Vec<UsageLogEntry>>,
}

impl MemoryUsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl UsageLogRepositoryTrait for MemoryUsageLog {
    async fn append(&self, entry: NewUsageLog) -> Result<UsageLogEntry> {
        let row = UsageLogEntry {
            id: Uuid::now_v7(),
            server_id: entry.server_id,
            customer_id: entry.customer_id,
            delivery_for: entry.delivery_for.to_string(),
            countable: entry.countable,
            created_at: Utc::now(),
        };
        self.entries.write().await.push(row.clone());
        Ok(row)
    }

    async fn count_for_server_since(
        &self,
        server_id: ServerId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.server_id == server_id && e.countable && e.created_at >= since)
            .count() as i64)
    }

    async fn count_for_customer_since(
        &self,
        customer_id: CustomerId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| {
                e.customer_id == Some(customer_id) && e.countable && e.created_at >= since
            })
            .count() as i64)
    }

    async fn prune(&self, retention_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.created_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

/// In-memory delivery server store
#[derive(Default)]
pub struct MemoryServerRepo {
    servers: RwLock<Vec<DeliveryServer>>,
}

impl MemoryServerRepo {
    pub fn new(servers: Vec<DeliveryServer>) -> Self {
        Self {
            servers: RwLock::new(servers),
        }
    }

    pub async fn push(&self, server: DeliveryServer) {
        self.servers.write().await.push(server);
    }

    fn matches(
        server: &DeliveryServer,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> bool {
        server.status_enum().is_sendable()
            && server.can_send_for(delivery_for)
            && !exclude.contains(&server.id)
    }
}

#[async_trait]
impl DeliveryServerRepositoryTrait for MemoryServerRepo {
    async fn get(&self, id: ServerId) -> Result<Option<DeliveryServer>> {
        Ok(self.servers.read().await.iter().find(|s| s.id == id).cloned())
    }

    async fn find_for_customer(
        &self,
        customer_id: CustomerId,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>> {
        Ok(self
            .servers
            .read()
            .await
            .iter()
            .filter(|s| {
                s.customer_id == Some(customer_id) && Self::matches(s, delivery_for, exclude)
            })
            .cloned()
            .collect())
    }

    async fn find_for_group(
        &self,
        group_id: GroupId,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>> {
        Ok(self
            .servers
            .read()
            .await
            .iter()
            .filter(|s| {
                s.customer_id.is_none()
                    && s.group_id == Some(group_id)
                    && Self::matches(s, delivery_for, exclude)
            })
            .cloned()
            .collect())
    }

    async fn find_system(
        &self,
        delivery_for: DeliveryFor,
        exclude: &[ServerId],
    ) -> Result<Vec<DeliveryServer>> {
        Ok(self
            .servers
            .read()
            .await
            .iter()
            .filter(|s| {
                s.customer_id.is_none()
                    && s.group_id.is_none()
                    && Self::matches(s, delivery_for, exclude)
            })
            .cloned()
            .collect())
    }

    async fn mark_in_use(&self, id: ServerId) -> Result<bool> {
        let mut servers = self.servers.write().await;
        match servers.iter_mut().find(|s| s.id == id && s.status == "active") {
            Some(s) => {
                s.status = "in-use".into();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_in_use(&self, id: ServerId) -> Result<bool> {
        let mut servers = self.servers.write().await;
        match servers.iter_mut().find(|s| s.id == id && s.status == "in-use") {
            Some(s) => {
                s.status = "active".into();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_pending_delete(&self, id: ServerId) -> Result<bool> {
        let mut servers = self.servers.write().await;
        match servers
            .iter_mut()
            .find(|s| s.id == id && s.status != "pending-delete")
        {
            Some(s) => {
                s.status = "pending-delete".into();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_deletable(&self, _retention_days: i64) -> Result<u64> {
        let mut servers = self.servers.write().await;
        let before = servers.len();
        servers.retain(|s| s.status != "pending-delete");
        Ok((before - servers.len()) as u64)
    }
}

/// In-memory customer store
#[derive(Default)]
pub struct MemoryCustomerRepo {
    customers: RwLock<Vec<Customer>>,
}

impl MemoryCustomerRepo {
    pub fn new(customers: Vec<Customer>) -> Self {
        Self {
            customers: RwLock::new(customers),
        }
    }
}

#[async_trait]
impl CustomerRepositoryTrait for MemoryCustomerRepo {
    async fn get(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self
            .customers
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }
}

/// Domain resolver that never finds anything.
pub struct NoDomains;

#[async_trait]
impl SendingDomainRepositoryTrait for NoDomains {
    async fn find_verified(
        &self,
        _domain: &str,
        _customer_id: Option<CustomerId>,
    ) -> Result<Option<SendingDomain>> {
        Ok(None)
    }
}

#[async_trait]
impl TrackingDomainRepositoryTrait for NoDomains {
    async fn get_verified(&self, _id: TrackingDomainId) -> Result<Option<TrackingDomain>> {
        Ok(None)
    }
}

/// Adapter that records what it was asked to send, optionally failing
/// every call.
pub struct FakeAdapter {
    kind: TransportKind,
    fail: Option<fn() -> Error>,
    sent: Mutex<Vec<SendParams>>,
    counter: AtomicUsize,
}

impl FakeAdapter {
    pub fn succeeding(kind: TransportKind) -> Self {
        Self {
            kind,
            fail: None,
            sent: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn failing(kind: TransportKind) -> Self {
        Self::failing_with(kind, || Error::Transport("fake adapter told to fail".into()))
    }

    pub fn failing_with(kind: TransportKind, make_error: fn() -> Error) -> Self {
        Self {
            fail: Some(make_error),
            ..Self::succeeding(kind)
        }
    }

    pub fn sent(&self) -> Vec<SendParams> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for FakeAdapter {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn check_requirements(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, _server: &DeliveryServer, params: &SendParams) -> Result<SendReceipt> {
        if let Some(make_error) = self.fail {
            return Err(make_error());
        }
        self.sent.lock().unwrap().push(params.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(SendReceipt {
            message_id: format!("fake-{n}"),
        })
    }
}

/// In-memory transactional-email queue
#[derive(Default)]
pub struct MemoryTransactionalQueue {
    rows: RwLock<Vec<TransactionalEmail>>,
}

impl MemoryTransactionalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self) -> Vec<TransactionalEmail> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl TransactionalEmailRepositoryTrait for MemoryTransactionalQueue {
    async fn enqueue(&self, input: NewTransactionalEmail) -> Result<TransactionalEmail> {
        let now = Utc::now();
        let row = TransactionalEmail {
            id: Uuid::now_v7(),
            customer_id: input.customer_id,
            to_email: input.to_email,
            to_name: input.to_name,
            from_email: input.from_email,
            from_name: input.from_name,
            reply_to_email: input.reply_to_email,
            subject: input.subject,
            html_body: input.html_body,
            text_body: input.text_body,
            headers: input.headers,
            status: "unsent".into(),
            priority: 0,
            retries: 0,
            max_retries: input.max_retries.unwrap_or(3),
            send_at: input.send_at.unwrap_or(now),
            sent_message_id: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: TransactionalEmailId) -> Result<Option<TransactionalEmail>> {
        Ok(self.rows.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn fetch_due(&self, limit: i64) -> Result<Vec<TransactionalEmail>> {
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        let mut indices: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == "unsent" && r.send_at <= now && r.retries < r.max_retries)
            .map(|(i, _)| i)
            .collect();
        indices.sort_by(|&a, &b| {
            rows[b]
                .priority
                .cmp(&rows[a].priority)
                .then(rows[a].send_at.cmp(&rows[b].send_at))
        });
        indices.truncate(limit.max(0) as usize);

        // Claimed rows move out of unsent so a second fetch skips them.
        let mut due = Vec::with_capacity(indices.len());
        for i in indices {
            rows[i].status = "sending".into();
            rows[i].updated_at = now;
            due.push(rows[i].clone());
        }
        Ok(due)
    }

    async fn mark_sent(&self, id: TransactionalEmailId, message_id: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.status = "sent".into();
            row.sent_message_id = Some(message_id.to_string());
            row.last_error = None;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_failure(&self, id: TransactionalEmailId, error: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.retries += 1;
            row.priority += 1;
            row.last_error = Some(error.to_string());
            row.send_at = Utc::now() + Duration::minutes(5);
            row.status = if row.retries >= row.max_retries {
                "failed"
            } else {
                "unsent"
            }
            .into();
            row.updated_at = Utc::now();
        }
        Ok(())
    }
}
