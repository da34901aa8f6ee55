use chrono::{DateTime, Utc};
use lettermill_application::{EmailLogEntry, QueueStats};
use lettermill_domain::{EmailConfig, QueueItem};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

/// Full settings snapshot as shown to (and edited by) the admin console.
#[derive(Debug, Serialize, Deserialize)]
pub struct EmailSettingsDto {
    pub sender_name: String,
    pub sender_address: String,
    pub reply_to: Option<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_tls: bool,
    pub dkim_selector: Option<String>,
    pub dkim_private_key: Option<String>,
    pub dkim_domain: Option<String>,
}

impl From<EmailConfig> for EmailSettingsDto {
    fn from(config: EmailConfig) -> Self {
        Self {
            sender_name: config.sender_name,
            sender_address: config.sender_address,
            reply_to: config.reply_to,
            smtp_host: config.smtp_host,
            smtp_port: config.smtp_port,
            smtp_username: config.smtp_username,
            smtp_password: config.smtp_password,
            smtp_tls: config.smtp_tls,
            dkim_selector: config.dkim_selector,
            dkim_private_key: config.dkim_private_key,
            dkim_domain: config.dkim_domain,
        }
    }
}

impl From<EmailSettingsDto> for EmailConfig {
    fn from(dto: EmailSettingsDto) -> Self {
        Self {
            sender_name: dto.sender_name,
            sender_address: dto.sender_address,
            reply_to: dto.reply_to,
            smtp_host: dto.smtp_host,
            smtp_port: dto.smtp_port,
            smtp_username: dto.smtp_username,
            smtp_password: dto.smtp_password,
            smtp_tls: dto.smtp_tls,
            dkim_selector: dto.dkim_selector,
            dkim_private_key: dto.dkim_private_key,
            dkim_domain: dto.dkim_domain,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub recipient: String,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueuedEmailResponse {
    pub id: Uuid,
    pub status: String,
    pub scheduled_for: DateTime<Utc>,
}

impl From<QueueItem> for EnqueuedEmailResponse {
    fn from(item: QueueItem) -> Self {
        Self {
            id: item.id,
            status: item.status.as_str().to_owned(),
            scheduled_for: item.scheduled_for,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EmailLogEntryDto {
    pub id: Uuid,
    pub queue_item_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    pub email_type: String,
    pub status: String,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub attempt_count: u16,
    pub resend_attempts: u16,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub original_log_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<EmailLogEntry> for EmailLogEntryDto {
    fn from(entry: EmailLogEntry) -> Self {
        Self {
            id: entry.id,
            queue_item_id: entry.queue_item_id,
            lead_id: entry.lead_id,
            recipient: entry.recipient,
            subject: entry.subject,
            email_type: entry.email_type,
            status: entry.status.as_str().to_owned(),
            provider_message_id: entry.provider_message_id,
            error_message: entry.error_message,
            attempt_count: entry.attempt_count,
            resend_attempts: entry.resend_attempts,
            last_attempt_at: entry.last_attempt_at,
            original_log_id: entry.original_log_id,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EmailLogListResponse {
    pub entries: Vec<EmailLogEntryDto>,
}

#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub pending: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
}

impl From<QueueStats> for QueueStatsResponse {
    fn from(stats: QueueStats) -> Self {
        Self {
            pending: stats.pending,
            processing: stats.processing,
            sent: stats.sent,
            failed: stats.failed,
        }
    }
}
