use async_trait::async_trait;
use guildhall_core::repository::{RepoResult, SettingsRepository};
use serde_json::Value;
use sqlx::PgPool;

pub struct StoreSettingsRepository {
    pool: PgPool,
}

impl StoreSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for StoreSettingsRepository {
    async fn get_setting(&self, key: &str) -> RepoResult<Option<Value>> {
        let row: Option<(Value,)> = sqlx::query_as("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn put_setting(&self, key: &str, value: Value) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
