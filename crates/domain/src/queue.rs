use chrono::{DateTime, Duration, Utc};
use lettermill_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::email::{EmailAddress, OutboundEmail, SenderIdentity};

/// Retry ceiling applied when the enqueuing caller does not pick one.
pub const DEFAULT_MAX_RETRIES: u16 = 3;

/// Minutes after which a `processing` item with a stale heartbeat is
/// considered abandoned by a crashed worker.
pub const PROCESSING_TIMEOUT_MINUTES: i64 = 5;

/// Delivery state of one queued email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for its `scheduled_for` time.
    Pending,
    /// Claimed by a processor run, heartbeat active.
    Processing,
    /// Delivered; terminal.
    Sent,
    /// Retries exhausted; terminal.
    Failed,
}

impl QueueStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown queue status '{value}'"
            ))),
        }
    }

    /// Returns whether the status admits no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// One outbound email persisted in the durable queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Stable item identifier.
    pub id: Uuid,
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
    /// Free-form classification tag, e.g. "Quiz Taker".
    pub email_type: String,
    /// BCP 47-ish language tag of the rendered content.
    pub language: String,
    /// Originating lead, when known.
    pub lead_id: Option<Uuid>,
    /// Originating quiz, when known.
    pub quiz_id: Option<Uuid>,
    /// Delivery state.
    pub status: QueueStatus,
    /// Failed attempts so far; never exceeds `max_retries`.
    pub retry_count: u16,
    /// Retry ceiling.
    pub max_retries: u16,
    /// Earliest send time.
    pub scheduled_for: DateTime<Utc>,
    /// Heartbeat set when claimed; cleared on release.
    pub processing_started_at: Option<DateTime<Utc>>,
    /// Last delivery error, kept for admin visibility.
    pub error_message: Option<String>,
    /// Provider message id recorded on success.
    pub provider_message_id: Option<String>,
    /// Delivery timestamp on success.
    pub sent_at: Option<DateTime<Utc>>,
    /// Enqueue timestamp; processor claims oldest first.
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    /// Builds the transport-level message for this item.
    pub fn to_outbound_email(&self) -> AppResult<OutboundEmail> {
        OutboundEmail::new(
            self.recipient.clone(),
            self.sender.clone(),
            self.reply_to.clone(),
            self.subject.clone(),
            self.html_body.clone(),
        )
    }

    /// Returns whether a `processing` heartbeat is stale at `now`.
    #[must_use]
    pub fn is_stuck(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Processing
            && self.processing_started_at.is_some_and(|started| {
                now - started > Duration::minutes(PROCESSING_TIMEOUT_MINUTES)
            })
    }
}

/// Backoff delay after the k-th failed attempt: `2^k` minutes.
#[must_use]
pub fn retry_backoff(retry_count: u16) -> Duration {
    // The clamp keeps a corrupt counter from overflowing the shift.
    let exponent = u32::from(retry_count.min(16));
    Duration::minutes(2_i64.pow(exponent))
}

/// Outcome planned for a failed send attempt.
///
/// Pure function of the counters, independently testable from any
/// transport: the processor feeds the plan back into the repository.
#[derive(Debug, Clone, PartialEq)]
pub enum FailurePlan {
    /// Reschedule with an incremented counter and exponential backoff.
    Retry {
        /// Counter after this failure.
        retry_count: u16,
        /// Next attempt time, strictly after `now`.
        scheduled_for: DateTime<Utc>,
    },
    /// Ceiling reached; the item becomes permanently `failed`.
    Exhausted {
        /// Final counter value, equal to the ceiling.
        retry_count: u16,
    },
}

/// Plans the transition for a failed attempt at `now`.
#[must_use]
pub fn plan_failure(retry_count: u16, max_retries: u16, now: DateTime<Utc>) -> FailurePlan {
    let incremented = retry_count.saturating_add(1).min(max_retries.max(1));

    if incremented >= max_retries {
        FailurePlan::Exhausted {
            retry_count: incremented,
        }
    } else {
        FailurePlan::Retry {
            retry_count: incremented,
            scheduled_for: now + retry_backoff(incremented),
        }
    }
}
