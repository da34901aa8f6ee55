//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod console_email_transport;
mod doh_dns_resolver;
mod http_email_transport;
mod postgres_email_log_repository;
mod postgres_email_queue_repository;
mod postgres_settings_repository;
mod reputation_api_client;
mod smtp;

pub use console_email_transport::ConsoleEmailTransport;
pub use doh_dns_resolver::DohDnsResolver;
pub use http_email_transport::HttpApiEmailTransport;
pub use postgres_email_log_repository::PostgresEmailLogRepository;
pub use postgres_email_queue_repository::PostgresEmailQueueRepository;
pub use postgres_settings_repository::PostgresSettingsRepository;
pub use reputation_api_client::HttpReputationApi;
pub use smtp::SmtpEmailTransport;
