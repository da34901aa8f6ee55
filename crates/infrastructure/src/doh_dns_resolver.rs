//! DNS-over-HTTPS resolver used by the DNSBL sweep.

use async_trait::async_trait;
use lettermill_application::DnsResolver;
use lettermill_core::{AppError, AppResult};
use serde::Deserialize;

const DEFAULT_ENDPOINT: &str = "https://dns.google/resolve";

#[derive(Debug, Deserialize)]
struct DohResponse {
    /// Present (and non-empty) only when the name resolves.
    #[serde(rename = "Answer")]
    answer: Option<Vec<DohAnswer>>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "data")]
    _data: String,
}

/// A-record lookups via Google's JSON DNS API.
#[derive(Clone)]
pub struct DohDnsResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl DohDnsResolver {
    /// Creates a resolver against the default endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, DEFAULT_ENDPOINT)
    }

    /// Creates a resolver against a custom endpoint (tests, proxies).
    #[must_use]
    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl DnsResolver for DohDnsResolver {
    async fn has_a_records(&self, name: &str) -> AppResult<bool> {
        let response = self
            .client
            .get(self.endpoint.as_str())
            .query(&[("name", name), ("type", "A")])
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("DNS lookup for '{name}' failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "DNS lookup for '{name}' returned status {}",
                status.as_u16()
            )));
        }

        let body = response.json::<DohResponse>().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to parse DNS response for '{name}': {error}"
            ))
        })?;

        Ok(body.answer.is_some_and(|answers| !answers.is_empty()))
    }
}
