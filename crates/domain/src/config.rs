use std::collections::HashMap;

use lettermill_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Settings-store keys for every configuration field.
///
/// Each field is persisted as its own key/value row; `save` upserts them one
/// by one, so a mid-save failure can leave a partial update. Last write wins.
pub mod keys {
    /// Sender display name.
    pub const SENDER_NAME: &str = "email.sender_name";
    /// Sender address.
    pub const SENDER_ADDRESS: &str = "email.sender_address";
    /// Optional reply-to address.
    pub const REPLY_TO: &str = "email.reply_to";
    /// SMTP server hostname.
    pub const SMTP_HOST: &str = "email.smtp_host";
    /// SMTP server port.
    pub const SMTP_PORT: &str = "email.smtp_port";
    /// SMTP username.
    pub const SMTP_USERNAME: &str = "email.smtp_username";
    /// SMTP password.
    pub const SMTP_PASSWORD: &str = "email.smtp_password";
    /// Implicit-TLS flag.
    pub const SMTP_TLS: &str = "email.smtp_tls";
    /// DKIM selector.
    pub const DKIM_SELECTOR: &str = "email.dkim_selector";
    /// DKIM private key, PEM.
    pub const DKIM_PRIVATE_KEY: &str = "email.dkim_private_key";
    /// DKIM signing domain.
    pub const DKIM_DOMAIN: &str = "email.dkim_domain";
}

/// Immutable snapshot of delivery settings, loaded once per invocation and
/// passed explicitly to transports and senders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Sender display name.
    pub sender_name: String,
    /// Sender address.
    pub sender_address: String,
    /// Optional reply-to address.
    pub reply_to: Option<String>,
    /// SMTP server hostname; empty when unconfigured.
    pub smtp_host: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// SMTP username; empty when unconfigured.
    pub smtp_username: String,
    /// SMTP password; empty when unconfigured.
    pub smtp_password: String,
    /// Whether to open the connection with implicit TLS.
    pub smtp_tls: bool,
    /// DKIM selector, when DNS is set up for signing.
    pub dkim_selector: Option<String>,
    /// DKIM private key, PEM.
    pub dkim_private_key: Option<String>,
    /// DKIM signing domain.
    pub dkim_domain: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sender_name: "Quiz Platform".to_owned(),
            sender_address: "no-reply@quizplatform.example".to_owned(),
            reply_to: None,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_tls: false,
            dkim_selector: None,
            dkim_private_key: None,
            dkim_domain: None,
        }
    }
}

impl EmailConfig {
    /// Merges stored key/value rows over the built-in defaults.
    ///
    /// Unknown keys are ignored; missing keys and unparsable numeric/bool
    /// values silently keep the default.
    #[must_use]
    pub fn from_settings(settings: &HashMap<String, String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = non_empty(settings, keys::SENDER_NAME) {
            config.sender_name = value;
        }
        if let Some(value) = non_empty(settings, keys::SENDER_ADDRESS) {
            config.sender_address = value;
        }
        config.reply_to = non_empty(settings, keys::REPLY_TO);
        if let Some(value) = non_empty(settings, keys::SMTP_HOST) {
            config.smtp_host = value;
        }
        if let Some(port) = non_empty(settings, keys::SMTP_PORT)
            .and_then(|value| value.parse::<u16>().ok())
        {
            config.smtp_port = port;
        }
        if let Some(value) = non_empty(settings, keys::SMTP_USERNAME) {
            config.smtp_username = value;
        }
        if let Some(value) = non_empty(settings, keys::SMTP_PASSWORD) {
            config.smtp_password = value;
        }
        if let Some(value) = non_empty(settings, keys::SMTP_TLS) {
            config.smtp_tls = value.eq_ignore_ascii_case("true");
        }
        config.dkim_selector = non_empty(settings, keys::DKIM_SELECTOR);
        config.dkim_private_key = non_empty(settings, keys::DKIM_PRIVATE_KEY);
        config.dkim_domain = non_empty(settings, keys::DKIM_DOMAIN);

        config
    }

    /// Flattens the snapshot back into key/value pairs for upserting.
    ///
    /// `None` fields serialize as empty strings so a cleared field overwrites
    /// its previous value.
    #[must_use]
    pub fn to_settings(&self) -> Vec<(&'static str, String)> {
        vec![
            (keys::SENDER_NAME, self.sender_name.clone()),
            (keys::SENDER_ADDRESS, self.sender_address.clone()),
            (keys::REPLY_TO, self.reply_to.clone().unwrap_or_default()),
            (keys::SMTP_HOST, self.smtp_host.clone()),
            (keys::SMTP_PORT, self.smtp_port.to_string()),
            (keys::SMTP_USERNAME, self.smtp_username.clone()),
            (keys::SMTP_PASSWORD, self.smtp_password.clone()),
            (keys::SMTP_TLS, self.smtp_tls.to_string()),
            (
                keys::DKIM_SELECTOR,
                self.dkim_selector.clone().unwrap_or_default(),
            ),
            (
                keys::DKIM_PRIVATE_KEY,
                self.dkim_private_key.clone().unwrap_or_default(),
            ),
            (
                keys::DKIM_DOMAIN,
                self.dkim_domain.clone().unwrap_or_default(),
            ),
        ]
    }

    /// Returns whether an SMTP endpoint is usable.
    #[must_use]
    pub fn smtp_ready(&self) -> bool {
        !self.smtp_host.trim().is_empty()
            && !self.smtp_username.trim().is_empty()
            && !self.smtp_password.trim().is_empty()
    }

    /// Fails with `NotConfigured` naming the missing fields.
    pub fn require_smtp(&self) -> AppResult<()> {
        let mut missing = Vec::new();
        if self.smtp_host.trim().is_empty() {
            missing.push("smtp_host");
        }
        if self.smtp_username.trim().is_empty() {
            missing.push("smtp_username");
        }
        if self.smtp_password.trim().is_empty() {
            missing.push("smtp_password");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::NotConfigured(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Returns whether the connection should open with implicit TLS.
    ///
    /// Port 465 is implicit-TLS by convention regardless of the stored flag.
    #[must_use]
    pub fn implicit_tls(&self) -> bool {
        self.smtp_tls || self.smtp_port == 465
    }
}

fn non_empty(settings: &HashMap<String, String>, key: &str) -> Option<String> {
    settings
        .get(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
