use lettermill_application::{
    DomainReputationService, EmailConfigService, EmailQueueService, ResendService,
};
use sqlx::PgPool;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config_service: EmailConfigService,
    pub queue_service: EmailQueueService,
    pub resend_service: ResendService,
    pub reputation_service: DomainReputationService,
    pub postgres_pool: PgPool,
    pub admin_token: String,
    pub frontend_url: String,
}
