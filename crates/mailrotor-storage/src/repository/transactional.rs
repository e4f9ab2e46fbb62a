//! Transactional-email queue repository

use crate::db::DatabasePool;
use crate::models::{NewTransactionalEmail, TransactionalEmail};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use mailrotor_common::types::TransactionalEmailId;
use mailrotor_common::{Error, Result};
use uuid::Uuid;

/// Transactional-email repository trait
#[async_trait]
pub trait TransactionalEmailRepository: Send + Sync {
    async fn enqueue(&self, input: NewTransactionalEmail) -> Result<TransactionalEmail>;

    async fn get(&self, id: TransactionalEmailId) -> Result<Option<TransactionalEmail>>;

    /// Claim a batch of unsent emails due for delivery, highest priority
    /// first. Claimed rows move to `sending` so concurrent workers cannot
    /// pick up the same email; a claim left sitting for fifteen minutes
    /// is treated as abandoned and handed out again.
    async fn fetch_due(&self, limit: i64) -> Result<Vec<TransactionalEmail>>;

    async fn mark_sent(&self, id: TransactionalEmailId, message_id: &str) -> Result<()>;

    /// Record a failed attempt: bump retries and priority, push send_at
    /// forward, and mark failed once retries are exhausted.
    async fn record_failure(&self, id: TransactionalEmailId, error: &str) -> Result<()>;
}

/// Database transactional-email repository
#[derive(Clone)]
pub struct DbTransactionalEmailRepository {
    pool: DatabasePool,
}

impl DbTransactionalEmailRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionalEmailRepository for DbTransactionalEmailRepository {
    async fn enqueue(&self, input: NewTransactionalEmail) -> Result<TransactionalEmail> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, TransactionalEmail>(
            r#"
            INSERT INTO transactional_emails (
                id, customer_id, to_email, to_name, from_email, from_name,
                reply_to_email, subject, html_body, text_body, headers,
                status, priority, retries, max_retries, send_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'unsent', 0, 0, $12, $13)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.customer_id)
        .bind(&input.to_email)
        .bind(&input.to_name)
        .bind(&input.from_email)
        .bind(&input.from_name)
        .bind(&input.reply_to_email)
        .bind(&input.subject)
        .bind(&input.html_body)
        .bind(&input.text_body)
        .bind(&input.headers)
        .bind(input.max_retries.unwrap_or(3))
        .bind(input.send_at.unwrap_or_else(Utc::now))
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: TransactionalEmailId) -> Result<Option<TransactionalEmail>> {
        sqlx::query_as::<_, TransactionalEmail>(
            "SELECT * FROM transactional_emails WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn fetch_due(&self, limit: i64) -> Result<Vec<TransactionalEmail>> {
        // The claim must be a single statement: a bare SELECT ... FOR
        // UPDATE releases its row locks as soon as the implicit
        // transaction commits, and two workers would then double-send.
        let mut rows = sqlx::query_as::<_, TransactionalEmail>(
            r#"
            WITH due AS (
                SELECT id FROM transactional_emails
                WHERE (status = 'unsent'
                       OR (status = 'sending' AND updated_at < NOW() - INTERVAL '15 minutes'))
                  AND send_at <= NOW()
                  AND retries < max_retries
                ORDER BY priority DESC, send_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE transactional_emails t
            SET status = 'sending', updated_at = NOW()
            FROM due
            WHERE t.id = due.id
            RETURNING t.*
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        // UPDATE ... RETURNING does not preserve the inner ORDER BY.
        rows.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.send_at.cmp(&b.send_at)));
        Ok(rows)
    }

    async fn mark_sent(&self, id: TransactionalEmailId, message_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactional_emails SET
                status = 'sent',
                sent_message_id = $2,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(message_id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn record_failure(&self, id: TransactionalEmailId, error: &str) -> Result<()> {
        // Linear backoff keyed off the retry count; a row whose retries
        // reach max_retries flips to failed.
        let next_attempt = Utc::now() + Duration::minutes(5);

        sqlx::query(
            r#"
            UPDATE transactional_emails SET
                retries = retries + 1,
                priority = priority + 1,
                last_error = $2,
                send_at = $3,
                status = CASE WHEN retries + 1 >= max_retries THEN 'failed' ELSE 'unsent' END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}
