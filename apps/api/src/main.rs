//! Lettermill API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderValue;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use lettermill_application::{
    DomainReputationService, EmailConfigService, EmailQueueService, EmailTransport, ReputationApi,
    ResendService,
};
use lettermill_core::AppError;
use lettermill_infrastructure::{
    ConsoleEmailTransport, DohDnsResolver, HttpApiEmailTransport, HttpReputationApi,
    PostgresEmailLogRepository, PostgresEmailQueueRepository, PostgresSettingsRepository,
    SmtpEmailTransport,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api_config::{ApiConfig, TransportKind, init_tracing};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if config.migrate_only {
        info!("migrations applied, exiting (migrate mode)");
        return Ok(());
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let settings_repository = Arc::new(PostgresSettingsRepository::new(pool.clone()));
    let queue_repository = Arc::new(PostgresEmailQueueRepository::new(pool.clone()));
    let log_repository = Arc::new(PostgresEmailLogRepository::new(pool.clone()));
    let config_service = EmailConfigService::new(settings_repository);

    let transport: Arc<dyn EmailTransport> = match config.transport {
        TransportKind::Console => Arc::new(ConsoleEmailTransport::new()),
        TransportKind::Smtp => Arc::new(SmtpEmailTransport::new()),
        TransportKind::Api => Arc::new(HttpApiEmailTransport::new(
            http_client.clone(),
            config.email_api_key.clone(),
        )),
    };

    let queue_service = EmailQueueService::new(
        queue_repository,
        log_repository.clone(),
        config_service.clone(),
        transport.clone(),
    );
    let resend_service = ResendService::new(log_repository, config_service.clone(), transport);

    let dns_resolver = Arc::new(DohDnsResolver::new(http_client.clone()));
    let reputation_api = config
        .reputation_api_key
        .clone()
        .map(|api_key| HttpReputationApi::new(http_client, api_key))
        .map(|api| Arc::new(api) as Arc<dyn ReputationApi>);
    let reputation_service = DomainReputationService::new(dns_resolver, reputation_api);

    let app_state = AppState {
        config_service,
        queue_service,
        resend_service,
        reputation_service,
        postgres_pool: pool,
        admin_token: config.admin_token.clone(),
        frontend_url: config.frontend_url.clone(),
    };

    let router = build_router(app_state.clone())?;
    let address = config.socket_address()?;

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind {address}: {error}")))?;

    info!(%address, "lettermill-api started");

    axum::serve(listener, router)
        .await
        .map_err(|error| AppError::Internal(format!("server error: {error}")))
}

fn build_router(app_state: AppState) -> Result<Router, AppError> {
    let cors_origin = app_state
        .frontend_url
        .parse::<HeaderValue>()
        .map_err(|error| {
            AppError::Validation(format!(
                "invalid FRONTEND_URL '{}': {error}",
                app_state.frontend_url
            ))
        })?;

    let admin_routes = Router::new()
        .route(
            "/api/admin/email-settings",
            get(handlers::get_email_settings_handler).put(handlers::put_email_settings_handler),
        )
        .route("/api/admin/email-test", post(handlers::test_send_handler))
        .route("/api/admin/email-logs", get(handlers::list_email_logs_handler))
        .route(
            "/api/admin/email-logs/{log_id}/resend",
            post(handlers::resend_email_handler),
        )
        .route(
            "/api/admin/domain-reputation/{domain}",
            get(handlers::domain_reputation_handler),
        )
        .route("/api/admin/queue/stats", get(handlers::queue_stats_handler))
        .route_layer(from_fn_with_state(app_state.clone(), middleware::require_admin));

    Ok(Router::new()
        .merge(admin_routes)
        .route("/api/health", get(handlers::health_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origin)
                .allow_headers([CONTENT_TYPE])
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                ]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
