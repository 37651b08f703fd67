use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Configuration missing: {0} is not set")]
    ConfigMissing(String),
    #[error("Upstream rejected the configured API key")]
    InvalidCredential,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Workspace {slug} already exists but could not be fetched")]
    Conflict { slug: String },
    #[error("Generation timed out after {} ms", .timeout.as_millis())]
    GenerationTimeout { timeout: Duration },
    #[error("Upstream responded with status {status}")]
    Upstream { status: u16, body: Value },
    #[error("Upload IO error: {0}")]
    UploadIo(std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Status code reported by the upstream service, if this error carries one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::InvalidCredential => Some(403),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::GenerationTimeout { .. } => true,
            Self::Reqwest(err) => err.is_timeout(),
            _ => false,
        }
    }
}
