use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettermill_core::{AppError, AppResult};
use lettermill_domain::{EmailAddress, EmailConfig, OutboundEmail, QueueItem, SenderIdentity};
use uuid::Uuid;

/// Enqueue contract consumed from upstream collaborators (quiz completion,
/// admin test-send). Sender identity is stamped from the config snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueEmailInput {
    /// Recipient address.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Fully-rendered HTML body.
    pub html_body: String,
    /// Free-form classification tag, e.g. "Quiz Taker".
    pub email_type: String,
    /// Language tag of the rendered content; defaults to "en".
    pub language: Option<String>,
    /// Originating lead, when known.
    pub lead_id: Option<Uuid>,
    /// Originating quiz, when known.
    pub quiz_id: Option<Uuid>,
    /// Optional reply-to override.
    pub reply_to: Option<String>,
    /// Retry ceiling override; defaults to 3.
    pub max_retries: Option<u16>,
}

/// Validated queue row handed to the repository for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueItem {
    /// Recipient address.
    pub recipient: EmailAddress,
    /// Sender identity captured at enqueue time.
    pub sender: SenderIdentity,
    /// Optional reply-to override.
    pub reply_to: Option<EmailAddress>,
    /// Subject line.
    pub subject: String,
    /// Fully-rendered HTML body.
    pub html_body: String,
    /// Classification tag.
    pub email_type: String,
    /// Language tag.
    pub language: String,
    /// Originating lead.
    pub lead_id: Option<Uuid>,
    /// Originating quiz.
    pub quiz_id: Option<Uuid>,
    /// Retry ceiling.
    pub max_retries: u16,
    /// Earliest send time.
    pub scheduled_for: DateTime<Utc>,
}

/// Aggregate queue counts for operations dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Items waiting to be claimed.
    pub pending: u64,
    /// Items currently claimed by a processor run.
    pub processing: u64,
    /// Delivered items.
    pub sent: u64,
    /// Permanently failed items.
    pub failed: u64,
}

/// Repository port for the durable outbound queue.
#[async_trait]
pub trait EmailQueueRepository: Send + Sync {
    /// Inserts one pending item and returns the stored row.
    async fn insert(&self, item: NewQueueItem) -> AppResult<QueueItem>;

    /// Resets `processing` items whose heartbeat is older than
    /// `stale_before` back to `pending`. Returns the number of rows reset.
    async fn reset_stuck(&self, stale_before: DateTime<Utc>) -> AppResult<u64>;

    /// Claims up to `limit` due pending items FIFO by creation time,
    /// marking them `processing` with a fresh heartbeat in one statement.
    async fn claim_due(&self, limit: usize, now: DateTime<Utc>) -> AppResult<Vec<QueueItem>>;

    /// Marks one claimed item delivered.
    async fn mark_sent(
        &self,
        id: Uuid,
        provider_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Releases one claimed item back to `pending` for a later retry.
    async fn mark_retry(
        &self,
        id: Uuid,
        retry_count: u16,
        error_message: &str,
        scheduled_for: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Marks one claimed item permanently failed.
    async fn mark_failed(&self, id: Uuid, retry_count: u16, error_message: &str) -> AppResult<()>;

    /// Returns one item by id.
    async fn find(&self, id: Uuid) -> AppResult<Option<QueueItem>>;

    /// Returns aggregate queue counts.
    async fn stats(&self) -> AppResult<QueueStats>;
}

/// Terminal outcome recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailLogStatus {
    /// Delivery succeeded.
    Sent,
    /// Delivery failed after exhausting retries.
    Failed,
}

impl EmailLogStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown email log status '{value}'"
            ))),
        }
    }
}

/// New audit record for one send-attempt outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmailLogEntry {
    /// Originating queue item, when the send came from the queue.
    pub queue_item_id: Option<Uuid>,
    /// Originating lead.
    pub lead_id: Option<Uuid>,
    /// Recipient address.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Classification tag.
    pub email_type: String,
    /// Outcome.
    pub status: EmailLogStatus,
    /// Provider message id on success.
    pub provider_message_id: Option<String>,
    /// Error on failure.
    pub error_message: Option<String>,
    /// Rendered HTML snapshot used for verbatim resends.
    pub html_body: String,
    /// Attempt count carried from the queue item.
    pub attempt_count: u16,
    /// Original log row when this entry traces a resend.
    pub original_log_id: Option<Uuid>,
}

/// Stored audit record.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailLogEntry {
    /// Stable entry identifier.
    pub id: Uuid,
    /// Originating queue item.
    pub queue_item_id: Option<Uuid>,
    /// Originating lead.
    pub lead_id: Option<Uuid>,
    /// Recipient address.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Classification tag.
    pub email_type: String,
    /// Current known status of this particular email.
    pub status: EmailLogStatus,
    /// Provider message id of the most recent successful delivery.
    pub provider_message_id: Option<String>,
    /// Most recent error.
    pub error_message: Option<String>,
    /// Rendered HTML snapshot.
    pub html_body: String,
    /// Attempt count at insert time.
    pub attempt_count: u16,
    /// Number of manual resends attempted against this row.
    pub resend_attempts: u16,
    /// Time of the most recent manual resend attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Original log row when this entry traces a resend.
    pub original_log_id: Option<Uuid>,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
}

/// Repository port for the append-only send audit log.
///
/// The only in-place mutations are the resend bookkeeping updates on the
/// original row; every resend also inserts its own immutable trace entry.
#[async_trait]
pub trait EmailLogRepository: Send + Sync {
    /// Appends one entry and returns the stored row.
    async fn append(&self, entry: NewEmailLogEntry) -> AppResult<EmailLogEntry>;

    /// Returns one entry by id.
    async fn find(&self, id: Uuid) -> AppResult<Option<EmailLogEntry>>;

    /// Records a successful resend on the original row: status flips to
    /// `sent`, the provider message id is replaced, and the resend counters
    /// advance.
    async fn mark_resend_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
        attempted_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Records a failed resend on the original row: status is untouched,
    /// the error is replaced, and the resend counters advance.
    async fn mark_resend_failure(
        &self,
        id: Uuid,
        error_message: &str,
        attempted_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Lists recent entries, newest first.
    async fn list_recent(&self, limit: usize, offset: usize) -> AppResult<Vec<EmailLogEntry>>;
}

/// Port over the generic key/value settings store.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Loads all rows whose key starts with `prefix`.
    async fn load_prefixed(&self, prefix: &str) -> AppResult<HashMap<String, String>>;

    /// Upserts one key/value row.
    async fn upsert(&self, key: &str, value: &str) -> AppResult<()>;
}

/// Port for delivering one rendered email.
///
/// Infrastructure provides the raw SMTP client, a managed HTTP API, or a
/// console transport for development. The config snapshot is passed in
/// explicitly so no transport re-reads shared state mid-operation.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Checks the snapshot carries everything this transport needs.
    /// Runs before any queue item is claimed.
    fn preflight(&self, config: &EmailConfig) -> AppResult<()>;

    /// Delivers one email and returns the provider message id.
    async fn deliver(&self, config: &EmailConfig, email: &OutboundEmail) -> AppResult<String>;
}
