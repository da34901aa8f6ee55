use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use lettermill_core::{AppError, AppResult};
use lettermill_domain::{EmailConfig, QueueItem, QueueStatus};
use lettermill_domain::{OutboundEmail, config::keys};

use super::{EmailQueueService, ProcessorReport};
use crate::config_service::EmailConfigService;
use crate::delivery_ports::{
    EmailLogEntry, EmailLogRepository, EmailLogStatus, EmailQueueRepository, EmailTransport,
    EnqueueEmailInput, NewEmailLogEntry, NewQueueItem, QueueStats, SettingsRepository,
};

#[derive(Default)]
struct FakeSettingsRepository {
    rows: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SettingsRepository for FakeSettingsRepository {
    async fn load_prefixed(&self, prefix: &str) -> AppResult<HashMap<String, String>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn upsert(&self, key: &str, value: &str) -> AppResult<()> {
        self.rows
            .lock()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[derive(Default)]
struct FakeQueueRepository {
    items: Mutex<Vec<QueueItem>>,
}

#[async_trait]
impl EmailQueueRepository for FakeQueueRepository {
    async fn insert(&self, item: NewQueueItem) -> AppResult<QueueItem> {
        let stored = QueueItem {
            id: Uuid::new_v4(),
            recipient: item.recipient,
            sender: item.sender,
            reply_to: item.reply_to,
            subject: item.subject,
            html_body: item.html_body,
            email_type: item.email_type,
            language: item.language,
            lead_id: item.lead_id,
            quiz_id: item.quiz_id,
            status: QueueStatus::Pending,
            retry_count: 0,
            max_retries: item.max_retries,
            scheduled_for: item.scheduled_for,
            processing_started_at: None,
            error_message: None,
            provider_message_id: None,
            sent_at: None,
            created_at: Utc::now(),
        };

        self.items.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn reset_stuck(&self, stale_before: DateTime<Utc>) -> AppResult<u64> {
        let mut items = self.items.lock().await;
        let mut reset = 0;
        for item in items.iter_mut() {
            if item.status == QueueStatus::Processing
                && item
                    .processing_started_at
                    .is_some_and(|started| started < stale_before)
            {
                item.status = QueueStatus::Pending;
                item.processing_started_at = None;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn claim_due(&self, limit: usize, now: DateTime<Utc>) -> AppResult<Vec<QueueItem>> {
        let mut items = self.items.lock().await;
        let mut due: Vec<&mut QueueItem> = items
            .iter_mut()
            .filter(|item| item.status == QueueStatus::Pending && item.scheduled_for <= now)
            .collect();
        due.sort_by_key(|item| item.created_at);

        let mut claimed = Vec::new();
        for item in due.into_iter().take(limit) {
            item.status = QueueStatus::Processing;
            item.processing_started_at = Some(now);
            claimed.push(item.clone());
        }
        Ok(claimed)
    }

    async fn mark_sent(
        &self,
        id: Uuid,
        provider_message_id: &str,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.update(id, |item| {
            item.status = QueueStatus::Sent;
            item.provider_message_id = Some(provider_message_id.to_owned());
            item.sent_at = Some(sent_at);
            item.processing_started_at = None;
            item.error_message = None;
        })
        .await
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        retry_count: u16,
        error_message: &str,
        scheduled_for: DateTime<Utc>,
    ) -> AppResult<()> {
        self.update(id, |item| {
            item.status = QueueStatus::Pending;
            item.retry_count = retry_count;
            item.error_message = Some(error_message.to_owned());
            item.scheduled_for = scheduled_for;
            item.processing_started_at = None;
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid, retry_count: u16, error_message: &str) -> AppResult<()> {
        self.update(id, |item| {
            item.status = QueueStatus::Failed;
            item.retry_count = retry_count;
            item.error_message = Some(error_message.to_owned());
            item.processing_started_at = None;
        })
        .await
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<QueueItem>> {
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .find(|item| item.id == id)
            .cloned())
    }

    async fn stats(&self) -> AppResult<QueueStats> {
        let items = self.items.lock().await;
        let mut stats = QueueStats::default();
        for item in items.iter() {
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Sent => stats.sent += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

impl FakeQueueRepository {
    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut QueueItem)) -> AppResult<()> {
        let mut items = self.items.lock().await;
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| AppError::NotFound(format!("queue item '{id}' not found")))?;
        apply(item);
        Ok(())
    }

    /// Rewinds one item's schedule so the next pass sees it as due.
    async fn make_due_now(&self, id: Uuid) {
        let mut items = self.items.lock().await;
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            item.scheduled_for = Utc::now() - Duration::seconds(1);
        }
    }
}

#[derive(Default)]
struct FakeLogRepository {
    entries: Mutex<Vec<EmailLogEntry>>,
}

#[async_trait]
impl EmailLogRepository for FakeLogRepository {
    async fn append(&self, entry: NewEmailLogEntry) -> AppResult<EmailLogEntry> {
        let stored = EmailLogEntry {
            id: Uuid::new_v4(),
            queue_item_id: entry.queue_item_id,
            lead_id: entry.lead_id,
            recipient: entry.recipient,
            subject: entry.subject,
            email_type: entry.email_type,
            status: entry.status,
            provider_message_id: entry.provider_message_id,
            error_message: entry.error_message,
            html_body: entry.html_body,
            attempt_count: entry.attempt_count,
            resend_attempts: 0,
            last_attempt_at: None,
            original_log_id: entry.original_log_id,
            created_at: Utc::now(),
        };

        self.entries.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<EmailLogEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .find(|entry| entry.id == id)
            .cloned())
    }

    async fn mark_resend_success(
        &self,
        id: Uuid,
        provider_message_id: &str,
        attempted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| AppError::NotFound(format!("log entry '{id}' not found")))?;
        entry.status = EmailLogStatus::Sent;
        entry.provider_message_id = Some(provider_message_id.to_owned());
        entry.resend_attempts += 1;
        entry.last_attempt_at = Some(attempted_at);
        Ok(())
    }

    async fn mark_resend_failure(
        &self,
        id: Uuid,
        error_message: &str,
        attempted_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| AppError::NotFound(format!("log entry '{id}' not found")))?;
        entry.error_message = Some(error_message.to_owned());
        entry.resend_attempts += 1;
        entry.last_attempt_at = Some(attempted_at);
        Ok(())
    }

    async fn list_recent(&self, limit: usize, offset: usize) -> AppResult<Vec<EmailLogEntry>> {
        let entries = self.entries.lock().await;
        let mut recent: Vec<EmailLogEntry> = entries.clone();
        recent.reverse();
        Ok(recent.into_iter().skip(offset).take(limit).collect())
    }
}

/// Transport that fails a programmable number of times, then succeeds.
#[derive(Default)]
struct FakeTransport {
    failures_remaining: Mutex<u32>,
    delivered: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl EmailTransport for FakeTransport {
    fn preflight(&self, _config: &EmailConfig) -> AppResult<()> {
        Ok(())
    }

    async fn deliver(&self, _config: &EmailConfig, email: &OutboundEmail) -> AppResult<String> {
        let mut failures = self.failures_remaining.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(AppError::Delivery("connection refused".to_owned()));
        }

        let mut delivered = self.delivered.lock().await;
        delivered.push(email.clone());
        Ok(format!("msg-{}", delivered.len()))
    }
}

struct NeverConfiguredTransport;

#[async_trait]
impl EmailTransport for NeverConfiguredTransport {
    fn preflight(&self, config: &EmailConfig) -> AppResult<()> {
        config.require_smtp()
    }

    async fn deliver(&self, _config: &EmailConfig, _email: &OutboundEmail) -> AppResult<String> {
        Err(AppError::Internal("must not be reached".to_owned()))
    }
}

struct Harness {
    service: EmailQueueService,
    queue: Arc<FakeQueueRepository>,
    logs: Arc<FakeLogRepository>,
    transport: Arc<FakeTransport>,
}

fn build_harness() -> Harness {
    let queue = Arc::new(FakeQueueRepository::default());
    let logs = Arc::new(FakeLogRepository::default());
    let transport = Arc::new(FakeTransport::default());
    let config_service = EmailConfigService::new(Arc::new(FakeSettingsRepository::default()));

    Harness {
        service: EmailQueueService::new(
            queue.clone(),
            logs.clone(),
            config_service,
            transport.clone(),
        ),
        queue,
        logs,
        transport,
    }
}

fn enqueue_input() -> EnqueueEmailInput {
    EnqueueEmailInput {
        recipient: "lead@example.com".to_owned(),
        subject: "Your quiz results".to_owned(),
        html_body: "<p>You scored 42.</p>".to_owned(),
        email_type: "Quiz Taker".to_owned(),
        language: None,
        lead_id: None,
        quiz_id: None,
        reply_to: None,
        max_retries: Some(3),
    }
}

async fn stored_item(harness: &Harness, id: Uuid) -> QueueItem {
    let item = harness.queue.find(id).await;
    assert!(item.is_ok());
    let item = item.unwrap_or_default();
    assert!(item.is_some());
    item.unwrap_or_else(|| unreachable!())
}

#[tokio::test]
async fn enqueue_applies_defaults_and_sender_snapshot() {
    let harness = build_harness();

    let item = harness.service.enqueue(enqueue_input()).await;
    assert!(item.is_ok());
    let item = item.unwrap_or_else(|_| unreachable!());

    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.retry_count, 0);
    assert_eq!(item.max_retries, 3);
    assert_eq!(item.language, "en");
    assert_eq!(
        item.sender.address.as_str(),
        EmailConfig::default().sender_address
    );
}

#[tokio::test]
async fn first_attempt_success_sends_and_logs_exactly_once() {
    let harness = build_harness();
    let item = harness.service.enqueue(enqueue_input()).await;
    assert!(item.is_ok());
    let item = item.unwrap_or_else(|_| unreachable!());

    let report = harness.service.process_due().await;
    assert!(report.is_ok());
    assert_eq!(
        report.unwrap_or_default(),
        ProcessorReport {
            processed: 1,
            sent: 1,
            failed: 0
        }
    );

    let stored = stored_item(&harness, item.id).await;
    assert_eq!(stored.status, QueueStatus::Sent);
    assert_eq!(stored.provider_message_id.as_deref(), Some("msg-1"));
    assert!(stored.sent_at.is_some());

    let entries = harness.logs.entries.lock().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, EmailLogStatus::Sent);
    assert_eq!(entries[0].queue_item_id, Some(item.id));

    drop(entries);

    // Terminal item: a further pass finds nothing to do.
    let followup = harness.service.process_due().await;
    assert!(followup.is_ok());
    assert_eq!(followup.unwrap_or_default().processed, 0);
}

#[tokio::test]
async fn failure_reschedules_with_exponential_backoff() {
    let harness = build_harness();
    *harness.transport.failures_remaining.lock().await = 2;

    let item = harness.service.enqueue(enqueue_input()).await;
    assert!(item.is_ok());
    let item = item.unwrap_or_else(|_| unreachable!());

    let before_first = Utc::now();
    let report = harness.service.process_due().await;
    assert!(report.is_ok());
    assert_eq!(
        report.unwrap_or_default(),
        ProcessorReport {
            processed: 1,
            sent: 0,
            failed: 0
        }
    );

    let stored = stored_item(&harness, item.id).await;
    assert_eq!(stored.status, QueueStatus::Pending);
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.error_message.as_deref(), Some("delivery failed: connection refused"));
    let delay = stored.scheduled_for - before_first;
    assert!(delay >= Duration::minutes(2));
    assert!(delay < Duration::minutes(2) + Duration::seconds(10));

    // The retried item is not due yet; an immediate pass claims nothing.
    let idle = harness.service.process_due().await;
    assert!(idle.is_ok());
    assert_eq!(idle.unwrap_or_default().processed, 0);

    harness.queue.make_due_now(item.id).await;
    let before_second = Utc::now();
    let report = harness.service.process_due().await;
    assert!(report.is_ok());

    let stored = stored_item(&harness, item.id).await;
    assert_eq!(stored.retry_count, 2);
    let delay = stored.scheduled_for - before_second;
    assert!(delay >= Duration::minutes(4));
    assert!(delay < Duration::minutes(4) + Duration::seconds(10));
}

#[tokio::test]
async fn three_consecutive_failures_exhaust_the_item() {
    let harness = build_harness();
    *harness.transport.failures_remaining.lock().await = u32::MAX;

    let item = harness.service.enqueue(enqueue_input()).await;
    assert!(item.is_ok());
    let item = item.unwrap_or_else(|_| unreachable!());

    for _ in 0..3 {
        harness.queue.make_due_now(item.id).await;
        let report = harness.service.process_due().await;
        assert!(report.is_ok());
    }

    let stored = stored_item(&harness, item.id).await;
    assert_eq!(stored.status, QueueStatus::Failed);
    assert_eq!(stored.retry_count, 3);

    let entries = harness.logs.entries.lock().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, EmailLogStatus::Failed);
    assert_eq!(entries[0].attempt_count, 3);
    drop(entries);

    // Terminal: never returns to pending.
    harness.queue.make_due_now(item.id).await;
    let report = harness.service.process_due().await;
    assert!(report.is_ok());
    assert_eq!(report.unwrap_or_default().processed, 0);
    let stored = stored_item(&harness, item.id).await;
    assert_eq!(stored.status, QueueStatus::Failed);
}

#[tokio::test]
async fn stale_processing_items_are_recovered_exactly_once() {
    let harness = build_harness();
    let item = harness.service.enqueue(enqueue_input()).await;
    assert!(item.is_ok());
    let item = item.unwrap_or_else(|_| unreachable!());

    // Simulate a crashed worker: claimed six minutes ago, never finished.
    {
        let mut items = harness.queue.items.lock().await;
        let stored = items
            .iter_mut()
            .find(|stored| stored.id == item.id)
            .unwrap_or_else(|| unreachable!());
        stored.status = QueueStatus::Processing;
        stored.processing_started_at = Some(Utc::now() - Duration::minutes(6));
    }

    let reset = harness
        .queue
        .reset_stuck(Utc::now() - Duration::minutes(5))
        .await;
    assert!(reset.is_ok());
    assert_eq!(reset.unwrap_or_default(), 1);

    // Second recovery pass finds nothing left to reset.
    let reset = harness
        .queue
        .reset_stuck(Utc::now() - Duration::minutes(5))
        .await;
    assert!(reset.is_ok());
    assert_eq!(reset.unwrap_or_default(), 0);

    // The recovered item is claimable and delivers on the next pass.
    let report = harness.service.process_due().await;
    assert!(report.is_ok());
    assert_eq!(report.unwrap_or_default().sent, 1);
}

#[tokio::test]
async fn missing_smtp_config_fails_before_claiming() {
    let queue = Arc::new(FakeQueueRepository::default());
    let logs = Arc::new(FakeLogRepository::default());
    let config_service = EmailConfigService::new(Arc::new(FakeSettingsRepository::default()));
    let service = EmailQueueService::new(
        queue.clone(),
        logs,
        config_service,
        Arc::new(NeverConfiguredTransport),
    );

    let item = service.enqueue(enqueue_input()).await;
    assert!(item.is_ok());
    let item = item.unwrap_or_else(|_| unreachable!());

    let report = service.process_due().await;
    assert!(matches!(report, Err(AppError::NotConfigured(_))));

    // Nothing was claimed or mutated.
    let stored = queue.find(item.id).await;
    assert!(stored.is_ok());
    let stored = stored.unwrap_or_default().unwrap_or_else(|| unreachable!());
    assert_eq!(stored.status, QueueStatus::Pending);
    assert_eq!(stored.retry_count, 0);
}

#[tokio::test]
async fn configured_smtp_snapshot_passes_preflight() {
    let settings = Arc::new(FakeSettingsRepository::default());
    {
        let mut rows = settings.rows.lock().await;
        rows.insert(keys::SMTP_HOST.to_owned(), "smtp.example.com".to_owned());
        rows.insert(keys::SMTP_USERNAME.to_owned(), "mailer".to_owned());
        rows.insert(keys::SMTP_PASSWORD.to_owned(), "secret".to_owned());
    }

    let queue = Arc::new(FakeQueueRepository::default());
    let service = EmailQueueService::new(
        queue,
        Arc::new(FakeLogRepository::default()),
        EmailConfigService::new(settings),
        Arc::new(NeverConfiguredTransport),
    );

    // Preflight passes; the empty queue means no delivery is attempted.
    let report = service.process_due().await;
    assert!(report.is_ok());
    assert_eq!(report.unwrap_or_default().processed, 0);
}
