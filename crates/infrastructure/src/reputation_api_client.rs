//! Domain reputation API client (VirusTotal v3 domain reports).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::DateTime;
use lettermill_application::ReputationApi;
use lettermill_core::{AppError, AppResult};
use lettermill_domain::{DomainReport, ReputationStats};
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://www.virustotal.com/api/v3";

#[derive(Debug, Deserialize)]
struct DomainResponse {
    data: DomainData,
}

#[derive(Debug, Deserialize)]
struct DomainData {
    attributes: DomainAttributes,
}

#[derive(Debug, Deserialize)]
struct DomainAttributes {
    last_analysis_stats: AnalysisStats,
    #[serde(default)]
    reputation: i32,
    /// Unix timestamp; absent when the domain was never analyzed.
    last_analysis_date: Option<i64>,
    #[serde(default)]
    categories: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalysisStats {
    #[serde(default)]
    harmless: u32,
    #[serde(default)]
    malicious: u32,
    #[serde(default)]
    suspicious: u32,
    #[serde(default)]
    undetected: u32,
}

/// Vendor reputation lookups keyed by an API key header.
#[derive(Clone)]
pub struct HttpReputationApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpReputationApi {
    /// Creates a client against the default endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom endpoint (tests, proxies).
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
impl ReputationApi for HttpReputationApi {
    async fn domain_report(&self, domain: &str) -> AppResult<Option<DomainReport>> {
        let response = self
            .client
            .get(format!("{}/domains/{domain}", self.base_url))
            .header("x-apikey", self.api_key.as_str())
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "reputation lookup for '{domain}' failed: {error}"
                ))
            })?;

        // Not yet analyzed is an answer, not an error.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(format!(
                "reputation lookup for '{domain}' returned status {}",
                status.as_u16()
            )));
        }

        let body = response.json::<DomainResponse>().await.map_err(|error| {
            AppError::Internal(format!(
                "failed to parse reputation response for '{domain}': {error}"
            ))
        })?;

        let attributes = body.data.attributes;
        Ok(Some(DomainReport {
            stats: ReputationStats {
                harmless: attributes.last_analysis_stats.harmless,
                malicious: attributes.last_analysis_stats.malicious,
                suspicious: attributes.last_analysis_stats.suspicious,
                undetected: attributes.last_analysis_stats.undetected,
            },
            reputation: attributes.reputation,
            last_analysis: attributes
                .last_analysis_date
                .and_then(|seconds| DateTime::from_timestamp(seconds, 0)),
            categories: attributes.categories.into_values().collect(),
        }))
    }
}
