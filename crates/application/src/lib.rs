//! Application services and ports for the Lettermill delivery pipeline.

#![forbid(unsafe_code)]

mod config_service;
mod delivery_ports;
mod queue_service;
mod reputation_ports;
mod reputation_service;
mod resend_service;

pub use config_service::EmailConfigService;
pub use delivery_ports::{
    EmailLogEntry, EmailLogRepository, EmailLogStatus, EmailQueueRepository, EmailTransport,
    EnqueueEmailInput, NewEmailLogEntry, NewQueueItem, QueueStats, SettingsRepository,
};
pub use queue_service::{EmailQueueService, ProcessorReport};
pub use reputation_ports::{DnsResolver, ReputationApi};
pub use reputation_service::{DEFAULT_BLACKLISTS, DomainReputationService};
pub use resend_service::ResendService;
