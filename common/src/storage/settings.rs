use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::AppError;

use super::{db::SurrealDbClient, types::app_setting::AppSetting};

/// Key/value store the proxy reads its upstream credential from.
///
/// Lookups are never cached; every call goes back to the backing store so a
/// value rotated by another process takes effect on the next request.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
}

#[async_trait]
impl SettingsStore for SurrealDbClient {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let setting = self.get_item::<AppSetting>(key).await?;
        Ok(setting.map(|setting| setting.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut setting = AppSetting::new(key, value);
        if let Some(existing) = self.get_item::<AppSetting>(key).await? {
            setting.created_at = existing.created_at;
            setting.updated_at = Utc::now();
        }

        self.upsert_item(setting).await?;
        debug!(key, "setting stored");
        Ok(())
    }
}
