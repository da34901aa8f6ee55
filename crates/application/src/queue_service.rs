use std::sync::Arc;

use chrono::{Duration, Utc};
use lettermill_core::{AppError, AppResult};
use lettermill_domain::queue::{
    DEFAULT_MAX_RETRIES, FailurePlan, PROCESSING_TIMEOUT_MINUTES, plan_failure,
};
use lettermill_domain::{EmailAddress, EmailConfig, QueueItem, SenderIdentity};

use crate::config_service::EmailConfigService;
use crate::delivery_ports::{
    EmailLogEntry, EmailLogRepository, EmailLogStatus, EmailQueueRepository, EmailTransport,
    EnqueueEmailInput, NewEmailLogEntry, NewQueueItem, QueueStats,
};

#[cfg(test)]
mod tests;

/// Items claimed per processor invocation.
const CLAIM_BATCH_SIZE: usize = 10;

/// Aggregate counts for one processor invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorReport {
    /// Items claimed and attempted this run.
    pub processed: u32,
    /// Items delivered this run.
    pub sent: u32,
    /// Items that became permanently failed this run.
    pub failed: u32,
}

/// Durable outbound queue: enqueue contract plus the processor pass.
///
/// The processor approximates at-least-once delivery: batch claiming with a
/// heartbeat recovers from crashed runs, and a crash between claim and
/// mark-sent can duplicate a send after the timeout pass. Exactly-once is
/// not promised.
#[derive(Clone)]
pub struct EmailQueueService {
    queue: Arc<dyn EmailQueueRepository>,
    logs: Arc<dyn EmailLogRepository>,
    config_service: EmailConfigService,
    transport: Arc<dyn EmailTransport>,
}

impl EmailQueueService {
    /// Creates a queue service.
    #[must_use]
    pub fn new(
        queue: Arc<dyn EmailQueueRepository>,
        logs: Arc<dyn EmailLogRepository>,
        config_service: EmailConfigService,
        transport: Arc<dyn EmailTransport>,
    ) -> Self {
        Self {
            queue,
            logs,
            config_service,
            transport,
        }
    }

    /// Validates and inserts one outbound email as a pending queue item,
    /// scheduled immediately. Sender identity comes from the current config
    /// snapshot.
    pub async fn enqueue(&self, input: EnqueueEmailInput) -> AppResult<QueueItem> {
        let config = self.config_service.load().await?;
        let item = build_new_item(input, &config)?;
        self.queue.insert(item).await
    }

    /// Runs one processor pass: recovery, claim, send, transition.
    pub async fn process_due(&self) -> AppResult<ProcessorReport> {
        let config = self.config_service.load().await?;
        // Config problems surface here, before any item is claimed.
        self.transport.preflight(&config)?;

        let now = Utc::now();
        self.queue
            .reset_stuck(now - Duration::minutes(PROCESSING_TIMEOUT_MINUTES))
            .await?;

        let claimed = self.queue.claim_due(CLAIM_BATCH_SIZE, now).await?;

        let mut report = ProcessorReport::default();
        for item in claimed {
            report.processed += 1;
            match self.attempt_delivery(&config, &item).await {
                Ok(()) => report.sent += 1,
                Err(DeliveryOutcome::Exhausted) => report.failed += 1,
                Err(DeliveryOutcome::Rescheduled) => {}
                Err(DeliveryOutcome::Fatal(error)) => return Err(error),
            }
        }

        Ok(report)
    }

    /// Returns aggregate queue counts.
    pub async fn stats(&self) -> AppResult<QueueStats> {
        self.queue.stats().await
    }

    /// Lists recent audit log entries, newest first.
    pub async fn list_logs(&self, limit: usize, offset: usize) -> AppResult<Vec<EmailLogEntry>> {
        self.logs.list_recent(limit, offset).await
    }

    async fn attempt_delivery(
        &self,
        config: &EmailConfig,
        item: &QueueItem,
    ) -> Result<(), DeliveryOutcome> {
        let send_result = match item.to_outbound_email() {
            Ok(email) => self.transport.deliver(config, &email).await,
            // A row that cannot be rebuilt into a message is fed through the
            // same retry path so it eventually surfaces as failed.
            Err(error) => Err(error),
        };

        let now = Utc::now();
        match send_result {
            Ok(provider_message_id) => {
                self.queue
                    .mark_sent(item.id, provider_message_id.as_str(), now)
                    .await
                    .map_err(DeliveryOutcome::Fatal)?;
                self.logs
                    .append(log_entry(
                        item,
                        EmailLogStatus::Sent,
                        Some(provider_message_id),
                        None,
                        item.retry_count,
                    ))
                    .await
                    .map_err(DeliveryOutcome::Fatal)?;
                Ok(())
            }
            Err(send_error) => {
                let message = send_error.to_string();
                match plan_failure(item.retry_count, item.max_retries, now) {
                    FailurePlan::Retry {
                        retry_count,
                        scheduled_for,
                    } => {
                        self.queue
                            .mark_retry(item.id, retry_count, message.as_str(), scheduled_for)
                            .await
                            .map_err(DeliveryOutcome::Fatal)?;
                        Err(DeliveryOutcome::Rescheduled)
                    }
                    FailurePlan::Exhausted { retry_count } => {
                        self.queue
                            .mark_failed(item.id, retry_count, message.as_str())
                            .await
                            .map_err(DeliveryOutcome::Fatal)?;
                        self.logs
                            .append(log_entry(
                                item,
                                EmailLogStatus::Failed,
                                None,
                                Some(message),
                                retry_count,
                            ))
                            .await
                            .map_err(DeliveryOutcome::Fatal)?;
                        Err(DeliveryOutcome::Exhausted)
                    }
                }
            }
        }
    }
}

enum DeliveryOutcome {
    Rescheduled,
    Exhausted,
    Fatal(AppError),
}

fn build_new_item(input: EnqueueEmailInput, config: &EmailConfig) -> AppResult<NewQueueItem> {
    let recipient = EmailAddress::new(input.recipient)?;
    let sender = SenderIdentity::new(
        config.sender_name.clone(),
        EmailAddress::new(config.sender_address.clone())?,
    )?;
    let reply_to = match input.reply_to.filter(|value| !value.trim().is_empty()) {
        Some(value) => Some(EmailAddress::new(value)?),
        None => config
            .reply_to
            .as_deref()
            .map(EmailAddress::new)
            .transpose()?,
    };

    if input.subject.trim().is_empty() {
        return Err(AppError::Validation(
            "subject must not be empty".to_owned(),
        ));
    }

    if input.email_type.trim().is_empty() {
        return Err(AppError::Validation(
            "email_type must not be empty".to_owned(),
        ));
    }

    let max_retries = input.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
    if max_retries == 0 {
        return Err(AppError::Validation(
            "max_retries must be greater than zero".to_owned(),
        ));
    }

    Ok(NewQueueItem {
        recipient,
        sender,
        reply_to,
        subject: input.subject,
        html_body: input.html_body,
        email_type: input.email_type,
        language: input
            .language
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "en".to_owned()),
        lead_id: input.lead_id,
        quiz_id: input.quiz_id,
        max_retries,
        scheduled_for: Utc::now(),
    })
}

fn log_entry(
    item: &QueueItem,
    status: EmailLogStatus,
    provider_message_id: Option<String>,
    error_message: Option<String>,
    attempt_count: u16,
) -> NewEmailLogEntry {
    NewEmailLogEntry {
        queue_item_id: Some(item.id),
        lead_id: item.lead_id,
        recipient: item.recipient.as_str().to_owned(),
        subject: item.subject.clone(),
        email_type: item.email_type.clone(),
        status,
        provider_message_id,
        error_message,
        html_body: item.html_body.clone(),
        attempt_count,
        original_log_id: None,
    }
}
