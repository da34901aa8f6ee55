//! Raw SMTP transport.
//!
//! Implements just enough of RFC 5321 to authenticate and deliver one HTML
//! message without a full mail library: EHLO, AUTH LOGIN, MAIL FROM,
//! RCPT TO, DATA, QUIT. Unexpected status codes surface as delivery errors
//! that the queue processor feeds into its retry path.

use async_trait::async_trait;
use lettermill_application::EmailTransport;
use lettermill_core::AppResult;
use lettermill_domain::{EmailConfig, OutboundEmail};

pub(crate) mod codec;
mod client;

use client::SmtpConnection;

/// Production transport speaking SMTP directly to the configured endpoint.
#[derive(Clone, Default)]
pub struct SmtpEmailTransport;

impl SmtpEmailTransport {
    /// Creates the transport. Endpoint details travel with each config
    /// snapshot rather than being captured here.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    fn preflight(&self, config: &EmailConfig) -> AppResult<()> {
        config.require_smtp()
    }

    async fn deliver(&self, config: &EmailConfig, email: &OutboundEmail) -> AppResult<String> {
        let (message, message_id) = codec::build_message(email);

        let mut connection = SmtpConnection::connect(config).await?;
        let outcome = connection
            .send_message(
                email.sender.address.as_str(),
                &[email.recipient.as_str()],
                message.as_str(),
            )
            .await;
        connection.close().await;

        outcome.map(|()| message_id)
    }
}
