use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blacklist whose listing warrants a dedicated call-out in recommendations.
const MAJOR_BLACKLIST: &str = "zen.spamhaus.org";

/// Listed-count above which the verdict escalates from warning to danger.
const DANGER_LISTING_THRESHOLD: usize = 2;

/// Result of one DNSBL lookup.
///
/// A lookup failure is recorded per-check rather than failing the sweep; an
/// unreachable blacklist reports `listed: false` with the error attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsblCheck {
    /// Blacklist server queried.
    pub server: String,
    /// Whether the domain is listed.
    pub listed: bool,
    /// Lookup error, when the check itself failed.
    pub error: Option<String>,
}

/// Aggregate vendor verdict counts from the reputation API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationStats {
    /// Vendors reporting the domain harmless.
    pub harmless: u32,
    /// Vendors flagging the domain malicious.
    pub malicious: u32,
    /// Vendors flagging the domain suspicious.
    pub suspicious: u32,
    /// Vendors with no verdict.
    pub undetected: u32,
}

/// Reputation API snapshot for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainReport {
    /// Vendor verdict counts.
    pub stats: ReputationStats,
    /// Community reputation score; negative values indicate distrust.
    pub reputation: i32,
    /// Last vendor analysis time, when the domain has been analyzed.
    pub last_analysis: Option<DateTime<Utc>>,
    /// Category tags assigned by vendors.
    pub categories: Vec<String>,
}

/// Aggregated verdict for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationStatus {
    /// No issues detected.
    Clean,
    /// Minor findings worth attention.
    Warning,
    /// Findings that will affect deliverability.
    Danger,
}

impl ReputationStatus {
    /// Returns stable wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

/// Full reputation check result. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainReputation {
    /// Domain that was checked.
    pub domain: String,
    /// Per-blacklist results, one entry per configured server.
    pub checks: Vec<DnsblCheck>,
    /// Reputation API snapshot; `None` when skipped or not yet analyzed.
    pub report: Option<DomainReport>,
    /// Aggregated verdict.
    pub status: ReputationStatus,
    /// Human-readable follow-ups keyed off the findings.
    pub recommendations: Vec<String>,
}

impl DomainReputation {
    /// Assembles the result, deriving the verdict and recommendations.
    #[must_use]
    pub fn assemble(
        domain: impl Into<String>,
        checks: Vec<DnsblCheck>,
        report: Option<DomainReport>,
    ) -> Self {
        let domain = domain.into();
        let status = derive_status(&checks, report.as_ref());
        let recommendations = build_recommendations(&domain, &checks, report.as_ref(), status);

        Self {
            domain,
            checks,
            report,
            status,
            recommendations,
        }
    }
}

fn listed_servers(checks: &[DnsblCheck]) -> Vec<&str> {
    checks
        .iter()
        .filter(|check| check.listed)
        .map(|check| check.server.as_str())
        .collect()
}

/// Derives the overall verdict. Priority order, first match wins.
#[must_use]
pub fn derive_status(checks: &[DnsblCheck], report: Option<&DomainReport>) -> ReputationStatus {
    let listed_count = listed_servers(checks).len();
    let stats = report.map(|report| report.stats).unwrap_or_default();
    let reputation = report.map_or(0, |report| report.reputation);

    if stats.malicious > 0 || listed_count > DANGER_LISTING_THRESHOLD || stats.suspicious > 0 {
        ReputationStatus::Danger
    } else if listed_count >= 1 || reputation < 0 {
        ReputationStatus::Warning
    } else {
        ReputationStatus::Clean
    }
}

/// Builds the flat recommendation list for the findings that fired.
#[must_use]
pub fn build_recommendations(
    domain: &str,
    checks: &[DnsblCheck],
    report: Option<&DomainReport>,
    status: ReputationStatus,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    let listed = listed_servers(checks);

    if !listed.is_empty() {
        recommendations.push(format!(
            "{domain} is listed on {} blacklist(s): {}. Request delisting from each operator.",
            listed.len(),
            listed.join(", ")
        ));
    }

    if listed.contains(&MAJOR_BLACKLIST) {
        recommendations.push(format!(
            "Spamhaus lists {domain}; most providers reject mail from listed domains. Resolve this first via the Spamhaus removal process."
        ));
    }

    if let Some(report) = report {
        if report.stats.malicious > 0 {
            recommendations.push(format!(
                "{} security vendor(s) flag {domain} as malicious. Audit recent campaigns and hosted content before sending further mail.",
                report.stats.malicious
            ));
        }

        if report.stats.suspicious > 0 {
            recommendations.push(format!(
                "{} vendor(s) flag {domain} as suspicious. Review links and attachments in outbound templates.",
                report.stats.suspicious
            ));
        }

        if report.reputation < 0 {
            recommendations.push(format!(
                "Community reputation for {domain} is negative ({}). Warm the domain up with low-volume, high-engagement sends.",
                report.reputation
            ));
        }
    }

    let unreachable = checks.iter().filter(|check| check.error.is_some()).count();
    if unreachable > 0 {
        recommendations.push(format!(
            "{unreachable} blacklist check(s) could not be completed; re-run the check for full coverage."
        ));
    }

    if status == ReputationStatus::Clean && recommendations.is_empty() {
        recommendations.push(format!(
            "No reputation issues detected for {domain}. Keep SPF, DKIM and DMARC records current."
        ));
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::{
        DnsblCheck, DomainReport, DomainReputation, ReputationStats, ReputationStatus,
        derive_status,
    };

    fn check(server: &str, listed: bool) -> DnsblCheck {
        DnsblCheck {
            server: server.to_owned(),
            listed,
            error: None,
        }
    }

    fn report(malicious: u32, suspicious: u32, reputation: i32) -> DomainReport {
        DomainReport {
            stats: ReputationStats {
                harmless: 60,
                malicious,
                suspicious,
                undetected: 10,
            },
            reputation,
            last_analysis: None,
            categories: Vec::new(),
        }
    }

    #[test]
    fn any_malicious_verdict_is_danger() {
        let status = derive_status(&[], Some(&report(1, 0, 10)));
        assert_eq!(status, ReputationStatus::Danger);
    }

    #[test]
    fn one_listing_without_vendor_findings_is_warning() {
        let checks = vec![check("bl.spamcop.net", true), check("dnsbl.sorbs.net", false)];
        assert_eq!(
            derive_status(&checks, Some(&report(0, 0, 0))),
            ReputationStatus::Warning
        );
    }

    #[test]
    fn more_than_two_listings_is_danger() {
        let checks = vec![
            check("zen.spamhaus.org", true),
            check("bl.spamcop.net", true),
            check("dnsbl.sorbs.net", true),
        ];
        assert_eq!(derive_status(&checks, None), ReputationStatus::Danger);
    }

    #[test]
    fn negative_reputation_alone_is_warning() {
        assert_eq!(
            derive_status(&[], Some(&report(0, 0, -5))),
            ReputationStatus::Warning
        );
    }

    #[test]
    fn all_clear_is_clean() {
        let checks = vec![check("zen.spamhaus.org", false)];
        assert_eq!(
            derive_status(&checks, Some(&report(0, 0, 12))),
            ReputationStatus::Clean
        );
    }

    #[test]
    fn spamhaus_listing_gets_a_dedicated_recommendation() {
        let checks = vec![check("zen.spamhaus.org", true)];
        let result = DomainReputation::assemble("mail.example.com", checks, None);

        assert_eq!(result.status, ReputationStatus::Warning);
        assert!(
            result
                .recommendations
                .iter()
                .any(|line| line.contains("Spamhaus"))
        );
    }

    #[test]
    fn clean_result_still_carries_a_recommendation() {
        let result = DomainReputation::assemble("mail.example.com", Vec::new(), None);
        assert_eq!(result.status, ReputationStatus::Clean);
        assert_eq!(result.recommendations.len(), 1);
    }
}
