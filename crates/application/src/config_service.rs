use std::sync::Arc;

use lettermill_core::{Actor, AppError, AppResult};
use lettermill_domain::EmailConfig;

use crate::delivery_ports::SettingsRepository;

/// Loads and saves the delivery configuration snapshot.
#[derive(Clone)]
pub struct EmailConfigService {
    settings: Arc<dyn SettingsRepository>,
}

impl EmailConfigService {
    /// Creates a config service over the settings store.
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsRepository>) -> Self {
        Self { settings }
    }

    /// Loads stored rows and merges them over the built-in defaults.
    pub async fn load(&self) -> AppResult<EmailConfig> {
        let stored = self.settings.load_prefixed("email.").await?;
        Ok(EmailConfig::from_settings(&stored))
    }

    /// Persists the snapshot, one upsert per field.
    ///
    /// There is no atomicity across fields: a mid-save failure leaves the
    /// store half-updated and the error tells the caller which key stalled.
    pub async fn save(&self, actor: &Actor, config: &EmailConfig) -> AppResult<()> {
        if !actor.is_admin() {
            return Err(AppError::Forbidden(format!(
                "'{}' may not change email settings",
                actor.subject()
            )));
        }

        for (key, value) in config.to_settings() {
            self.settings
                .upsert(key, value.as_str())
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to save setting '{key}': {error}"))
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use lettermill_core::{Actor, ActorRole, AppResult};
    use lettermill_domain::EmailConfig;
    use lettermill_domain::config::keys;
    use tokio::sync::Mutex;

    use super::EmailConfigService;
    use crate::delivery_ports::SettingsRepository;

    #[derive(Default)]
    struct FakeSettingsRepository {
        rows: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl SettingsRepository for FakeSettingsRepository {
        async fn load_prefixed(&self, prefix: &str) -> AppResult<HashMap<String, String>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect())
        }

        async fn upsert(&self, key: &str, value: &str) -> AppResult<()> {
            self.rows
                .lock()
                .await
                .insert(key.to_owned(), value.to_owned());
            Ok(())
        }
    }

    fn admin() -> Actor {
        Actor::new("admin-1", "Admin", ActorRole::Admin)
    }

    #[tokio::test]
    async fn load_merges_stored_rows_over_defaults() {
        let repository = Arc::new(FakeSettingsRepository::default());
        repository
            .rows
            .lock()
            .await
            .insert(keys::SMTP_HOST.to_owned(), "smtp.example.com".to_owned());

        let service = EmailConfigService::new(repository);
        let config = service.load().await;
        assert!(config.is_ok());

        let config = config.unwrap_or_default();
        assert_eq!(config.smtp_host, "smtp.example.com");
        assert_eq!(config.smtp_port, EmailConfig::default().smtp_port);
    }

    #[tokio::test]
    async fn save_upserts_every_field() {
        let repository = Arc::new(FakeSettingsRepository::default());
        let service = EmailConfigService::new(repository.clone());

        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_owned(),
            ..EmailConfig::default()
        };

        let saved = service.save(&admin(), &config).await;
        assert!(saved.is_ok());
        assert_eq!(
            repository.rows.lock().await.len(),
            config.to_settings().len()
        );
    }

    #[tokio::test]
    async fn save_requires_the_admin_role() {
        let service = EmailConfigService::new(Arc::new(FakeSettingsRepository::default()));
        let viewer = Actor::new("viewer-1", "Viewer", ActorRole::Viewer);

        let result = service.save(&viewer, &EmailConfig::default()).await;
        assert!(result.is_err());
    }
}
