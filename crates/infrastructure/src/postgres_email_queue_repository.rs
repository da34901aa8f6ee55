use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use lettermill_application::{EmailQueueRepository, NewQueueItem, QueueStats};
use lettermill_core::{AppError, AppResult};
use lettermill_domain::{EmailAddress, QueueItem, QueueStatus, SenderIdentity};

/// PostgreSQL-backed durable outbound queue.
#[derive(Clone)]
pub struct PostgresEmailQueueRepository {
    pool: PgPool,
}

impl PostgresEmailQueueRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct QueueItemRow {
    id: Uuid,
    recipient: String,
    sender_name: String,
    sender_address: String,
    reply_to: Option<String>,
    subject: String,
    html_body: String,
    email_type: String,
    language: String,
    lead_id: Option<Uuid>,
    quiz_id: Option<Uuid>,
    status: String,
    retry_count: i32,
    max_retries: i32,
    scheduled_for: DateTime<Utc>,
    processing_started_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    provider_message_id: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

const QUEUE_COLUMNS: &str = r#"
    id,
    recipient,
    sender_name,
    sender_address,
    reply_to,
    subject,
    html_body,
    email_type,
    language,
    lead_id,
    quiz_id,
    status,
    retry_count,
    max_retries,
    scheduled_for,
    processing_started_at,
    error_message,
    provider_message_id,
    sent_at,
    created_at
"#;

fn queue_item_from_row(row: QueueItemRow) -> AppResult<QueueItem> {
    Ok(QueueItem {
        id: row.id,
        recipient: EmailAddress::new(row.recipient)?,
        sender: SenderIdentity::new(row.sender_name, EmailAddress::new(row.sender_address)?)?,
        reply_to: row.reply_to.map(EmailAddress::new).transpose()?,
        subject: row.subject,
        html_body: row.html_body,
        email_type: row.email_type,
        language: row.language,
        lead_id: row.lead_id,
        quiz_id: row.quiz_id,
        status: QueueStatus::parse(row.status.as_str())?,
        retry_count: u16::try_from(row.retry_count).map_err(|error| {
            AppError::Validation(format!("invalid retry_count value: {error}"))
        })?,
        max_retries: u16::try_from(row.max_retries).map_err(|error| {
            AppError::Validation(format!("invalid max_retries value: {error}"))
        })?,
        scheduled_for: row.scheduled_for,
        processing_started_at: row.processing_started_at,
        error_message: row.error_message,
        provider_message_id: row.provider_message_id,
        sent_at: row.sent_at,
        created_at: row.created_at,
    })
}

#[async_trait]
impl EmailQueueRepository for PostgresEmailQueueRepository {
    async fn insert(&self, item: NewQueueItem) -> AppResult<QueueItem> {
        let row = sqlx::query_as::<_, QueueItemRow>(&format!(
            r#"
            INSERT INTO email_queue (
                recipient,
                sender_name,
                sender_address,
                reply_to,
                subject,
                html_body,
                email_type,
                language,
                lead_id,
                quiz_id,
                status,
                retry_count,
                max_retries,
                scheduled_for,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', 0, $11, $12, now(), now())
            RETURNING {QUEUE_COLUMNS}
            "#
        ))
        .bind(item.recipient.as_str())
        .bind(item.sender.name.as_str())
        .bind(item.sender.address.as_str())
        .bind(item.reply_to.as_ref().map(EmailAddress::as_str))
        .bind(item.subject.as_str())
        .bind(item.html_body.as_str())
        .bind(item.email_type.as_str())
        .bind(item.language.as_str())
        .bind(item.lead_id)
        .bind(item.quiz_id)
        .bind(i32::from(item.max_retries))
        .bind(item.scheduled_for)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to enqueue email for '{}': {error}",
                item.recipient.as_str()
            ))
        })?;

        queue_item_from_row(row)
    }

    async fn reset_stuck(&self, stale_before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE email_queue
            SET
                status = 'pending',
                processing_started_at = NULL,
                updated_at = now()
            WHERE status = 'processing'
              AND processing_started_at < $1
            "#,
        )
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to reset stuck queue items: {error}"))
        })?;

        Ok(result.rows_affected())
    }

    async fn claim_due(&self, limit: usize, now: DateTime<Utc>) -> AppResult<Vec<QueueItem>> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start queue claim transaction: {error}"))
        })?;

        let rows = sqlx::query_as::<_, QueueItemRow>(&format!(
            r#"
            WITH due_items AS (
                SELECT id
                FROM email_queue
                WHERE status = 'pending'
                  AND scheduled_for <= $2
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            ),
            claimed AS (
                UPDATE email_queue queue
                SET
                    status = 'processing',
                    processing_started_at = $2,
                    updated_at = now()
                FROM due_items
                WHERE queue.id = due_items.id
                RETURNING queue.*
            )
            SELECT {QUEUE_COLUMNS}
            FROM claimed
            ORDER BY created_at ASC
            "#
        ))
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid queue claim limit: {error}"))
        })?)
        .bind(now)
        .fetch_all(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to claim due queue items: {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit queue claim transaction: {error}"))
        })?;

        rows.into_iter().map(queue_item_from_row).collect()
    }

    async fn mark_sent(
        &self,
        id: Uuid,
        provider_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE email_queue
            SET
                status = 'sent',
                provider_message_id = $2,
                sent_at = $3,
                processing_started_at = NULL,
                error_message = NULL,
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to mark queue item '{id}' sent: {error}"))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "queue item '{id}' is not currently claimed"
            )));
        }

        Ok(())
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        retry_count: u16,
        error_message: &str,
        scheduled_for: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE email_queue
            SET
                status = 'pending',
                retry_count = $2,
                error_message = $3,
                scheduled_for = $4,
                processing_started_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(i32::from(retry_count))
        .bind(error_message)
        .bind(scheduled_for)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to reschedule queue item '{id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "queue item '{id}' is not currently claimed"
            )));
        }

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, retry_count: u16, error_message: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE email_queue
            SET
                status = 'failed',
                retry_count = $2,
                error_message = $3,
                processing_started_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(i32::from(retry_count))
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to mark queue item '{id}' failed: {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "queue item '{id}' is not currently claimed"
            )));
        }

        Ok(())
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<QueueItem>> {
        let row = sqlx::query_as::<_, QueueItemRow>(&format!(
            r#"
            SELECT {QUEUE_COLUMNS}
            FROM email_queue
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load queue item '{id}': {error}"))
        })?;

        row.map(queue_item_from_row).transpose()
    }

    async fn stats(&self) -> AppResult<QueueStats> {
        #[derive(Debug, FromRow)]
        struct StatusCountRow {
            status: String,
            count: i64,
        }

        let rows = sqlx::query_as::<_, StatusCountRow>(
            r#"
            SELECT status, count(*) AS count
            FROM email_queue
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load queue stats: {error}")))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let count = u64::try_from(row.count).unwrap_or_default();
            match QueueStatus::parse(row.status.as_str())? {
                QueueStatus::Pending => stats.pending = count,
                QueueStatus::Processing => stats.processing = count,
                QueueStatus::Sent => stats.sent = count,
                QueueStatus::Failed => stats.failed = count,
            }
        }

        Ok(stats)
    }
}
