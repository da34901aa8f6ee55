use std::sync::Arc;

use chrono::Utc;
use lettermill_core::{Actor, AppError, AppResult};
use lettermill_domain::{EmailAddress, OutboundEmail, SenderIdentity};
use uuid::Uuid;

use crate::config_service::EmailConfigService;
use crate::delivery_ports::{
    EmailLogEntry, EmailLogRepository, EmailLogStatus, EmailTransport, NewEmailLogEntry,
};

/// Re-delivers a historical log entry verbatim, reusing its stored HTML
/// rather than re-rendering.
///
/// Bookkeeping is deliberately dual: the original row is updated in place
/// (it reflects the current known status of that email) and a new row is
/// inserted per attempt (an immutable trace linked via `original_log_id`).
#[derive(Clone)]
pub struct ResendService {
    logs: Arc<dyn EmailLogRepository>,
    config_service: EmailConfigService,
    transport: Arc<dyn EmailTransport>,
}

impl ResendService {
    /// Creates a resend service.
    #[must_use]
    pub fn new(
        logs: Arc<dyn EmailLogRepository>,
        config_service: EmailConfigService,
        transport: Arc<dyn EmailTransport>,
    ) -> Self {
        Self {
            logs,
            config_service,
            transport,
        }
    }

    /// Re-delivers the email recorded in `log_id`.
    ///
    /// Requires the admin role. On success the original row flips to `sent`
    /// and the new trace row is returned; on failure the original row keeps
    /// its status, the error is recorded on both rows, and the delivery
    /// error propagates to the caller for diagnostics.
    pub async fn resend(&self, actor: &Actor, log_id: Uuid) -> AppResult<EmailLogEntry> {
        if !actor.is_admin() {
            return Err(AppError::Forbidden(format!(
                "'{}' may not resend emails",
                actor.subject()
            )));
        }

        let original = self
            .logs
            .find(log_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("email log entry '{log_id}' not found")))?;

        let config = self.config_service.load().await?;
        self.transport.preflight(&config)?;

        let email = OutboundEmail::new(
            EmailAddress::new(original.recipient.clone())?,
            SenderIdentity::new(
                config.sender_name.clone(),
                EmailAddress::new(config.sender_address.clone())?,
            )?,
            config
                .reply_to
                .as_deref()
                .map(EmailAddress::new)
                .transpose()?,
            original.subject.clone(),
            original.html_body.clone(),
        )?;

        let attempted_at = Utc::now();
        match self.transport.deliver(&config, &email).await {
            Ok(provider_message_id) => {
                self.logs
                    .mark_resend_success(original.id, provider_message_id.as_str(), attempted_at)
                    .await?;
                self.logs
                    .append(trace_entry(
                        &original,
                        EmailLogStatus::Sent,
                        Some(provider_message_id),
                        None,
                    ))
                    .await
            }
            Err(delivery_error) => {
                let message = delivery_error.to_string();
                self.logs
                    .mark_resend_failure(original.id, message.as_str(), attempted_at)
                    .await?;
                self.logs
                    .append(trace_entry(
                        &original,
                        EmailLogStatus::Failed,
                        None,
                        Some(message),
                    ))
                    .await?;
                Err(delivery_error)
            }
        }
    }
}

fn trace_entry(
    original: &EmailLogEntry,
    status: EmailLogStatus,
    provider_message_id: Option<String>,
    error_message: Option<String>,
) -> NewEmailLogEntry {
    NewEmailLogEntry {
        queue_item_id: original.queue_item_id,
        lead_id: original.lead_id,
        recipient: original.recipient.clone(),
        subject: original.subject.clone(),
        email_type: original.email_type.clone(),
        status,
        provider_message_id,
        error_message,
        html_body: original.html_body.clone(),
        attempt_count: original.attempt_count,
        original_log_id: Some(original.id),
    }
}
