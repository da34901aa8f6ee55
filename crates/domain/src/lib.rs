//! Domain types and pure logic for the Lettermill delivery pipeline.

#![forbid(unsafe_code)]

/// Email configuration snapshot and key/value merge.
pub mod config;
/// Outbound email value types.
pub mod email;
/// Localized text with fallback-chain lookup.
pub mod localization;
/// Queue item state machine and backoff.
pub mod queue;
/// Domain reputation verdicts and recommendations.
pub mod reputation;

pub use config::EmailConfig;
pub use email::{EmailAddress, OutboundEmail, SenderIdentity};
pub use localization::LocalizedText;
pub use queue::{FailurePlan, QueueItem, QueueStatus};
pub use reputation::{
    DnsblCheck, DomainReport, DomainReputation, ReputationStats, ReputationStatus,
};
