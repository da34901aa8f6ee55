use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use lettermill_application::SettingsRepository;
use lettermill_core::{AppError, AppResult};

/// PostgreSQL-backed generic key/value settings store.
#[derive(Clone)]
pub struct PostgresSettingsRepository {
    pool: PgPool,
}

impl PostgresSettingsRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SettingRow {
    key: String,
    value: String,
}

#[async_trait]
impl SettingsRepository for PostgresSettingsRepository {
    async fn load_prefixed(&self, prefix: &str) -> AppResult<HashMap<String, String>> {
        let rows = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT key, value
            FROM app_settings
            WHERE key LIKE $1 || '%'
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to load settings with prefix '{prefix}': {error}"
            ))
        })?;

        Ok(rows.into_iter().map(|row| (row.key, row.value)).collect())
    }

    async fn upsert(&self, key: &str, value: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key)
            DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to upsert setting '{key}': {error}"))
        })?;

        Ok(())
    }
}
