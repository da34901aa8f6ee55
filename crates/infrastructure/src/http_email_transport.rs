//! Managed email API transport (Resend-compatible `POST /emails`).

use async_trait::async_trait;
use lettermill_application::EmailTransport;
use lettermill_core::{AppError, AppResult};
use lettermill_domain::{EmailConfig, OutboundEmail};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.resend.com";

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: String,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// Transport delivering through a managed email API instead of raw SMTP.
#[derive(Clone)]
pub struct HttpApiEmailTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpApiEmailTransport {
    /// Creates a transport against the default API endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL)
    }

    /// Creates a transport against a custom endpoint (tests, proxies).
    #[must_use]
    pub fn with_base_url(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl EmailTransport for HttpApiEmailTransport {
    fn preflight(&self, _config: &EmailConfig) -> AppResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::NotConfigured(
                "email API key is empty".to_owned(),
            ));
        }
        Ok(())
    }

    async fn deliver(&self, _config: &EmailConfig, email: &OutboundEmail) -> AppResult<String> {
        let request = SendEmailRequest {
            from: format!("{} <{}>", email.sender.name.as_str(), email.sender.address),
            to: vec![email.recipient.as_str()],
            subject: email.subject.as_str(),
            html: email.html_body.as_str(),
            reply_to: email.reply_to.as_ref().map(|address| address.as_str()),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|error| AppError::Delivery(format!("email API request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(AppError::Delivery(format!(
                "email API returned status {}: {body}",
                status.as_u16()
            )));
        }

        let body = response
            .json::<SendEmailResponse>()
            .await
            .map_err(|error| {
                AppError::Delivery(format!("failed to parse email API response: {error}"))
            })?;

        Ok(body.id)
    }
}
