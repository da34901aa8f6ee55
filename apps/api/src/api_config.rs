use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use lettermill_core::AppError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Console,
    Smtp,
    Api,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub admin_token: String,
    pub transport: TransportKind,
    pub email_api_key: String,
    pub reputation_api_key: Option<String>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = required_env("DATABASE_URL")?;
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let admin_token = required_env("ADMIN_API_TOKEN")?;
        if admin_token.len() < 32 {
            return Err(AppError::Validation(
                "ADMIN_API_TOKEN must be at least 32 characters".to_owned(),
            ));
        }

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
        if transport == TransportKind::Api && email_api_key.trim().is_empty() {
            return Err(AppError::Validation(
                "EMAIL_API_KEY is required when EMAIL_TRANSPORT=api".to_owned(),
            ));
        }

        let reputation_api_key = env::var("REPUTATION_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            migrate_only,
            database_url,
            frontend_url,
            api_host,
            api_port,
            admin_token,
            transport,
            email_api_key,
            reputation_api_key,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}
