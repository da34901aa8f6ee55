use axum::Json;
use axum::extract::{Extension, Path, Query, State};

use lettermill_core::Actor;
use serde::Deserialize;

use crate::dto::{
    EmailLogEntryDto, EmailLogListResponse, EmailSettingsDto, EnqueuedEmailResponse,
    HealthResponse, QueueStatsResponse, TestEmailRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

mod email_logs;
mod health;
mod queue;
mod reputation;
mod settings;
mod test_send;

pub use email_logs::{list_email_logs_handler, resend_email_handler};
pub use health::health_handler;
pub use queue::queue_stats_handler;
pub use reputation::domain_reputation_handler;
pub use settings::{get_email_settings_handler, put_email_settings_handler};
pub use test_send::test_send_handler;
