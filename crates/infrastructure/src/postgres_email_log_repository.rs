use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use lettermill_application::{
    EmailLogEntry, EmailLogRepository, EmailLogStatus, NewEmailLogEntry,
};
use lettermill_core::{AppError, AppResult};

/// PostgreSQL-backed send audit log.
///
/// Rows are append-only except for the resend bookkeeping columns on an
/// original row, which a later resend updates in place.
#[derive(Clone)]
pub struct PostgresEmailLogRepository {
    pool: PgPool,
}

impl PostgresEmailLogRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct EmailLogRow {
    id: Uuid,
    queue_item_id: Option<Uuid>,
    lead_id: Option<Uuid>,
    recipient: String,
    subject: String,
    email_type: String,
    status: String,
    provider_message_id: Option<String>,
    error_message: Option<String>,
    html_body: String,
    attempt_count: i32,
    resend_attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    original_log_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

const LOG_COLUMNS: &str = r#"
    id,
    queue_item_id,
    lead_id,
    recipient,
    subject,
    email_type,
    status,
    provider_message_id,
    error_message,
    html_body,
    attempt_count,
    resend_attempts,
    last_attempt_at,
    original_log_id,
    created_at
"#;

fn log_entry_from_row(row: EmailLogRow) -> AppResult<EmailLogEntry> {
    Ok(EmailLogEntry {
        id: row.id,
        queue_item_id: row.queue_item_id,
        lead_id: row.lead_id,
        recipient: row.recipient,
        subject: row.subject,
        email_type: row.email_type,
        status: EmailLogStatus::parse(row.status.as_str())?,
        provider_message_id: row.provider_message_id,
        error_message: row.error_message,
        html_body: row.html_body,
        attempt_count: u16::try_from(row.attempt_count).map_err(|error| {
            AppError::Validation(format!("invalid attempt_count value: {error}"))
        })?,
        resend_attempts: u16::try_from(row.resend_attempts).map_err(|error| {
            AppError::Validation(format!("invalid resend_attempts value: {error}"))
        })?,
        last_attempt_at: row.last_attempt_at,
        original_log_id: row.original_log_id,
        created_at: row.created_at,
    })
}

#[async_trait]
impl EmailLogRepository for PostgresEmailLogRepository {
    async fn append(&self, entry: NewEmailLogEntry) -> AppResult<EmailLogEntry> {
        let row = sqlx::query_as::<_, EmailLogRow>(&format!(
            r#"
            INSERT INTO email_logs (
                queue_item_id,
                lead_id,
                recipient,
                subject,
                email_type,
                status,
                provider_message_id,
                error_message,
                html_body,
                attempt_count,
                original_log_id,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(entry.queue_item_id)
        .bind(entry.lead_id)
        .bind(entry.recipient.as_str())
        .bind(entry.subject.as_str())
        .bind(entry.email_type.as_str())
        .bind(entry.status.as_str())
        .bind(entry.provider_message_id.as_deref())
        .bind(entry.error_message.as_deref())
        .bind(entry.html_body.as_str())
        .bind(i32::from(entry.attempt_count))
        .bind(entry.original_log_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to append email log entry for '{}': {error}",
                entry.recipient
            ))
        })?;

        log_entry_from_row(row)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<EmailLogEntry>> {
        let row = sqlx::query_as::<_, EmailLogRow>(&format!(
            r#"
            SELECT {LOG_COLUMNS}
            FROM email_logs
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load email log entry '{id}': {error}"))
        })?;

        row.map(log_entry_from_row).transpose()
    }

    async fn mark_resend_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
        attempted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE email_logs
            SET
                status = 'sent',
                provider_message_id = $2,
                resend_attempts = resend_attempts + 1,
                last_attempt_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .bind(attempted_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to record resend success on log entry '{id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "email log entry '{id}' not found"
            )));
        }

        Ok(())
    }

    async fn mark_resend_failure(
        &self,
        id: Uuid,
        error_message: &str,
        attempted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE email_logs
            SET
                error_message = $2,
                resend_attempts = resend_attempts + 1,
                last_attempt_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_message)
        .bind(attempted_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to record resend failure on log entry '{id}': {error}"
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "email log entry '{id}' not found"
            )));
        }

        Ok(())
    }

    async fn list_recent(&self, limit: usize, offset: usize) -> AppResult<Vec<EmailLogEntry>> {
        let capped_limit = i64::try_from(limit.clamp(1, 200)).unwrap_or(50);
        let capped_offset = i64::try_from(offset.min(5_000)).unwrap_or(0);

        let rows = sqlx::query_as::<_, EmailLogRow>(&format!(
            r#"
            SELECT {LOG_COLUMNS}
            FROM email_logs
            ORDER BY created_at DESC
            LIMIT $1
            OFFSET $2
            "#
        ))
        .bind(capped_limit)
        .bind(capped_offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list email log entries: {error}"))
        })?;

        rows.into_iter().map(log_entry_from_row).collect()
    }
}
