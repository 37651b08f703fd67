use std::{fmt, sync::Arc};

use common::{error::AppError, storage::settings::SettingsStore};
use tracing::warn;

/// Opaque bearer token for the upstream service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Reads the upstream API key from the settings store on every call.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SettingsStore>,
    key: String,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn SettingsStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn resolve(&self) -> Result<Credential, AppError> {
        match self.store.get(&self.key).await? {
            Some(token) if !token.trim().is_empty() => Ok(Credential::new(token.trim())),
            _ => {
                warn!(key = %self.key, "upstream API key is not configured");
                Err(AppError::ConfigMissing(self.key.clone()))
            }
        }
    }
}
