//! Lettermill queue processor runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use lettermill_application::{EmailConfigService, EmailQueueService, EmailTransport};
use lettermill_core::{AppError, AppResult};
use lettermill_infrastructure::{
    ConsoleEmailTransport, HttpApiEmailTransport, PostgresEmailLogRepository,
    PostgresEmailQueueRepository, PostgresSettingsRepository, SmtpEmailTransport,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    transport: TransportKind,
    email_api_key: String,
    poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportKind {
    Console,
    Smtp,
    Api,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let queue_service = build_queue_service(pool, &config)?;

    info!(
        transport = ?config.transport,
        poll_interval_ms = config.poll_interval_ms,
        "lettermill-worker started"
    );

    loop {
        match queue_service.process_due().await {
            Ok(report) => {
                if report.processed > 0 {
                    info!(
                        processed = report.processed,
                        sent = report.sent,
                        failed = report.failed,
                        "queue pass finished"
                    );
                }
            }
            Err(error) => {
                // NotConfigured covers a fresh install with no settings
                // saved yet; keep polling until an admin fills them in.
                warn!(error = %error, "queue pass failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_queue_service(pool: PgPool, config: &WorkerConfig) -> AppResult<EmailQueueService> {
    let settings_repository = Arc::new(PostgresSettingsRepository::new(pool.clone()));
    let queue_repository = Arc::new(PostgresEmailQueueRepository::new(pool.clone()));
    let log_repository = Arc::new(PostgresEmailLogRepository::new(pool));
    let config_service = EmailConfigService::new(settings_repository);

    let transport: Arc<dyn EmailTransport> = match config.transport {
        TransportKind::Console => Arc::new(ConsoleEmailTransport::new()),
        TransportKind::Smtp => Arc::new(SmtpEmailTransport::new()),
        TransportKind::Api => {
            let http_client = reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .map_err(|error| {
                    AppError::Internal(format!("failed to build HTTP client: {error}"))
                })?;
            Arc::new(HttpApiEmailTransport::new(
                http_client,
                config.email_api_key.clone(),
            ))
        }
    };

    Ok(EmailQueueService::new(
        queue_repository,
        log_repository,
        config_service,
        transport,
    ))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let transport = match env::var("EMAIL_TRANSPORT")
            .unwrap_or_else(|_| "smtp".to_owned())
            .as_str()
        {
            "console" => TransportKind::Console,
            "smtp" => TransportKind::Smtp,
            "api" => TransportKind::Api,
            other => {
                return Err(AppError::Validation(format!(
                    "EMAIL_TRANSPORT must be 'console', 'smtp' or 'api', got '{other}'"
                )));
            }
        };
        let email_api_key = env::var("EMAIL_API_KEY").unwrap_or_default();
        let poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 15_000)?;

        if transport == TransportKind::Api && email_api_key.trim().is_empty() {
            return Err(AppError::Validation(
                "EMAIL_API_KEY is required when EMAIL_TRANSPORT=api".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            transport,
            email_api_key,
            poll_interval_ms,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
