use std::sync::Arc;

use lettermill_core::{AppError, AppResult};
use lettermill_domain::{DnsblCheck, DomainReputation};
use tokio::task::JoinSet;

use crate::reputation_ports::{DnsResolver, ReputationApi};

/// Blacklist servers swept by default.
pub const DEFAULT_BLACKLISTS: [&str; 7] = [
    "zen.spamhaus.org",
    "bl.spamcop.net",
    "b.barracudacentral.org",
    "dnsbl.sorbs.net",
    "spam.dnsbl.sorbs.net",
    "cbl.abuseat.org",
    "dnsbl-1.uceprotect.net",
];

/// Runs DNSBL and reputation API checks for one sending domain.
#[derive(Clone)]
pub struct DomainReputationService {
    resolver: Arc<dyn DnsResolver>,
    reputation_api: Option<Arc<dyn ReputationApi>>,
    blacklists: Vec<String>,
}

impl DomainReputationService {
    /// Creates a service over the default blacklist set.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn DnsResolver>,
        reputation_api: Option<Arc<dyn ReputationApi>>,
    ) -> Self {
        Self::with_blacklists(
            resolver,
            reputation_api,
            DEFAULT_BLACKLISTS.iter().map(|server| (*server).to_owned()),
        )
    }

    /// Creates a service over a custom blacklist set.
    #[must_use]
    pub fn with_blacklists(
        resolver: Arc<dyn DnsResolver>,
        reputation_api: Option<Arc<dyn ReputationApi>>,
        blacklists: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            resolver,
            reputation_api,
            blacklists: blacklists.into_iter().collect(),
        }
    }

    /// Checks one domain.
    ///
    /// All blacklist lookups run concurrently; one unreachable blacklist is
    /// recorded on its own entry and never fails the sweep. The reputation
    /// API is consulted only when configured and `include_api` is set, and
    /// an API outage likewise degrades to a missing report rather than an
    /// error.
    pub async fn check(&self, domain: &str, include_api: bool) -> AppResult<DomainReputation> {
        let domain = normalize_domain(domain)?;

        let mut lookups = JoinSet::new();
        for (index, server) in self.blacklists.iter().enumerate() {
            let resolver = self.resolver.clone();
            let query = format!("{domain}.{server}");
            lookups.spawn(async move { (index, resolver.has_a_records(query.as_str()).await) });
        }

        let mut outcomes: Vec<Option<AppResult<bool>>> = Vec::new();
        outcomes.resize_with(self.blacklists.len(), || None);
        while let Some(joined) = lookups.join_next().await {
            let (index, outcome) = joined
                .map_err(|error| AppError::Internal(format!("blacklist lookup task: {error}")))?;
            if let Some(slot) = outcomes.get_mut(index) {
                *slot = Some(outcome);
            }
        }

        let checks: Vec<DnsblCheck> = self
            .blacklists
            .iter()
            .zip(outcomes)
            .map(|(server, outcome)| match outcome {
                Some(Ok(listed)) => DnsblCheck {
                    server: server.clone(),
                    listed,
                    error: None,
                },
                Some(Err(error)) => DnsblCheck {
                    server: server.clone(),
                    listed: false,
                    error: Some(error.to_string()),
                },
                None => DnsblCheck {
                    server: server.clone(),
                    listed: false,
                    error: Some("lookup did not complete".to_owned()),
                },
            })
            .collect();

        let report = if include_api {
            match &self.reputation_api {
                Some(api) => api.domain_report(domain.as_str()).await.unwrap_or(None),
                None => None,
            }
        } else {
            None
        };

        Ok(DomainReputation::assemble(domain, checks, report))
    }
}

fn normalize_domain(domain: &str) -> AppResult<String> {
    let trimmed = domain.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Err(AppError::Validation("domain must not be empty".to_owned()));
    }

    if trimmed.chars().any(char::is_whitespace) || !trimmed.contains('.') {
        return Err(AppError::Validation(format!(
            "'{trimmed}' is not a valid domain name"
        )));
    }

    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use lettermill_core::{AppError, AppResult};
    use lettermill_domain::{DomainReport, ReputationStats, ReputationStatus};

    use super::{DEFAULT_BLACKLISTS, DomainReputationService};
    use crate::reputation_ports::{DnsResolver, ReputationApi};

    /// Resolver scripted per fully-qualified lookup name.
    #[derive(Default)]
    struct ScriptedResolver {
        listed: Vec<String>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl DnsResolver for ScriptedResolver {
        async fn has_a_records(&self, name: &str) -> AppResult<bool> {
            if self.failing.iter().any(|query| query == name) {
                return Err(AppError::Internal("dns timeout".to_owned()));
            }
            Ok(self.listed.iter().any(|query| query == name))
        }
    }

    struct ScriptedApi {
        reports: HashMap<String, DomainReport>,
    }

    #[async_trait]
    impl ReputationApi for ScriptedApi {
        async fn domain_report(&self, domain: &str) -> AppResult<Option<DomainReport>> {
            Ok(self.reports.get(domain).cloned())
        }
    }

    fn clean_report() -> DomainReport {
        DomainReport {
            stats: ReputationStats {
                harmless: 70,
                malicious: 0,
                suspicious: 0,
                undetected: 12,
            },
            reputation: 3,
            last_analysis: None,
            categories: Vec::new(),
        }
    }

    #[tokio::test]
    async fn sweep_reports_every_blacklist_even_when_one_lookup_fails() {
        let resolver = Arc::new(ScriptedResolver {
            listed: vec!["mail.example.com.bl.spamcop.net".to_owned()],
            failing: vec!["mail.example.com.dnsbl.sorbs.net".to_owned()],
        });
        let service = DomainReputationService::new(resolver, None);

        let result = service.check("mail.example.com", false).await;
        assert!(result.is_ok());
        let result = result.unwrap_or_else(|_| unreachable!());

        assert_eq!(result.checks.len(), DEFAULT_BLACKLISTS.len());

        let failed: Vec<_> = result
            .checks
            .iter()
            .filter(|check| check.error.is_some())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].server, "dnsbl.sorbs.net");
        assert!(failed.iter().all(|check| !check.listed));

        let listed: Vec<_> = result
            .checks
            .iter()
            .filter(|check| check.listed)
            .collect();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].server, "bl.spamcop.net");

        assert_eq!(result.status, ReputationStatus::Warning);
    }

    #[tokio::test]
    async fn check_preserves_blacklist_order() {
        let service =
            DomainReputationService::new(Arc::new(ScriptedResolver::default()), None);
        let result = service.check("mail.example.com", false).await;
        assert!(result.is_ok());
        let result = result.unwrap_or_else(|_| unreachable!());

        let servers: Vec<&str> = result
            .checks
            .iter()
            .map(|check| check.server.as_str())
            .collect();
        assert_eq!(servers, DEFAULT_BLACKLISTS.to_vec());
    }

    #[tokio::test]
    async fn api_report_is_attached_when_requested() {
        let api = ScriptedApi {
            reports: HashMap::from([("mail.example.com".to_owned(), clean_report())]),
        };
        let service = DomainReputationService::new(
            Arc::new(ScriptedResolver::default()),
            Some(Arc::new(api)),
        );

        let with_api = service.check("Mail.Example.Com", true).await;
        assert!(with_api.is_ok());
        let with_api = with_api.unwrap_or_else(|_| unreachable!());
        assert!(with_api.report.is_some());
        assert_eq!(with_api.status, ReputationStatus::Clean);

        let without_api = service.check("mail.example.com", false).await;
        assert!(without_api.is_ok());
        assert!(without_api.unwrap_or_else(|_| unreachable!()).report.is_none());
    }

    #[tokio::test]
    async fn unanalyzed_domain_yields_no_report_without_error() {
        let api = ScriptedApi {
            reports: HashMap::new(),
        };
        let service = DomainReputationService::new(
            Arc::new(ScriptedResolver::default()),
            Some(Arc::new(api)),
        );

        let result = service.check("fresh-domain.example", true).await;
        assert!(result.is_ok());
        let result = result.unwrap_or_else(|_| unreachable!());
        assert!(result.report.is_none());
        assert_eq!(result.status, ReputationStatus::Clean);
    }

    #[tokio::test]
    async fn invalid_domains_are_rejected() {
        let service =
            DomainReputationService::new(Arc::new(ScriptedResolver::default()), None);
        assert!(service.check("  ", false).await.is_err());
        assert!(service.check("no-dot", false).await.is_err());
        assert!(service.check("two words.com", false).await.is_err());
    }
}
