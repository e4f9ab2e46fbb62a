//! Transactional-email worker
//!
//! Interval loop draining the transactional queue: due rows are
//! delivered highest priority first; a failed row gets its retry count
//! and priority bumped and is rescheduled until its retries run out.

use super::DeliveryService;
use crate::params::{parse_headers_format, SendOverrides};
use mailrotor_common::types::DeliveryObject;
use mailrotor_common::Result;
use mailrotor_storage::models::TransactionalEmail;
use mailrotor_storage::repository::TransactionalEmailRepositoryTrait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

pub struct TransactionalWorker {
    service: Arc<DeliveryService>,
    queue: Arc<dyn TransactionalEmailRepositoryTrait>,
    poll_interval: Duration,
    batch_size: i64,
    send_attempts: u32,
}

impl TransactionalWorker {
    pub fn new(
        service: Arc<DeliveryService>,
        queue: Arc<dyn TransactionalEmailRepositoryTrait>,
        poll_interval: Duration,
        batch_size: i64,
        send_attempts: u32,
    ) -> Self {
        Self {
            service,
            queue,
            poll_interval,
            batch_size,
            send_attempts,
        }
    }

    /// Run the worker loop.
    pub async fn run(&self) {
        let mut ticker = interval(self.poll_interval);

        info!("transactional worker started");

        loop {
            ticker.tick().await;

            if let Err(e) = self.drain_due().await {
                error!(error = %e, "error draining transactional queue");
            }
        }
    }

    /// Process one batch of due emails. Public so tests and one-shot
    /// invocations can drive the worker without the loop.
    pub async fn drain_due(&self) -> Result<usize> {
        let due = self.queue.fetch_due(self.batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }

        debug!(count = due.len(), "processing due transactional emails");

        let mut delivered = 0;
        for email in due {
            if self.process(&email).await? {
                delivered += 1;
            }
        }

        Ok(delivered)
    }

    async fn process(&self, email: &TransactionalEmail) -> Result<bool> {
        let delivery = DeliveryObject::Transactional {
            customer_id: email.customer_id,
        };
        let overrides = overrides_from(email);

        match self
            .service
            .deliver_with_retry(&delivery, &overrides, self.send_attempts)
            .await
        {
            Ok(Some(report)) => {
                self.queue.mark_sent(email.id, &report.message_id).await?;
                Ok(true)
            }
            Ok(None) => {
                warn!(email_id = %email.id, retries = email.retries, "transactional send failed");
                self.queue
                    .record_failure(email.id, "no delivery server accepted the message")
                    .await?;
                Ok(false)
            }
            Err(e) => {
                warn!(email_id = %email.id, error = %e, "transactional send errored");
                self.queue.record_failure(email.id, &e.to_string()).await?;
                Ok(false)
            }
        }
    }
}

fn overrides_from(email: &TransactionalEmail) -> SendOverrides {
    SendOverrides {
        to_email: Some(email.to_email.clone()),
        to_name: email.to_name.clone(),
        from_email: Some(email.from_email.clone()),
        from_name: email.from_name.clone(),
        reply_to_email: email.reply_to_email.clone(),
        return_path: None,
        subject: Some(email.subject.clone()),
        html_body: email.html_body.clone(),
        text_body: email.text_body.clone(),
        headers: parse_headers_format(&email.headers),
        attachments: Vec::new(),
    }
}
