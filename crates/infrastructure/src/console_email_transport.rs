//! Console transport for development. Logs emails to tracing output.

use async_trait::async_trait;
use lettermill_application::EmailTransport;
use lettermill_core::AppResult;
use lettermill_domain::{EmailConfig, OutboundEmail};
use tracing::info;
use uuid::Uuid;

/// Development transport that logs emails instead of delivering them.
#[derive(Clone, Default)]
pub struct ConsoleEmailTransport;

impl ConsoleEmailTransport {
    /// Creates a new console transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailTransport for ConsoleEmailTransport {
    fn preflight(&self, _config: &EmailConfig) -> AppResult<()> {
        Ok(())
    }

    async fn deliver(&self, _config: &EmailConfig, email: &OutboundEmail) -> AppResult<String> {
        info!(
            to = email.recipient.as_str(),
            subject = email.subject.as_str(),
            "--- EMAIL (console) ---\nTo: {}\nSubject: {}\n\n{}\n--- END EMAIL ---",
            email.recipient,
            email.subject,
            email.html_body
        );

        Ok(format!("console-{}", Uuid::new_v4()))
    }
}
