use async_trait::async_trait;
use lettermill_core::AppResult;
use lettermill_domain::DomainReport;

/// DNS lookup port used by the DNSBL sweep.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Returns whether `name` resolves to at least one A record.
    ///
    /// DNSBL convention: any answer for `<domain>.<blacklist>` means the
    /// domain is listed.
    async fn has_a_records(&self, name: &str) -> AppResult<bool>;
}

/// Reputation API port.
#[async_trait]
pub trait ReputationApi: Send + Sync {
    /// Fetches the vendor report for one domain.
    ///
    /// Returns `None` when the domain has not been analyzed yet (HTTP 404
    /// upstream); that is an answer, not an error.
    async fn domain_report(&self, domain: &str) -> AppResult<Option<DomainReport>>;
}
