use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration missing: {0} is not set")]
    ConfigMissing(String),

    #[error("Invalid API Key")]
    InvalidCredential,

    #[error("Workspace {0} already exists but could not be fetched")]
    Conflict(String),

    #[error("Generation timed out after {0} ms, retry later or reduce the content")]
    GenerationTimeout(u64),

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Upstream request failed with status {status}")]
    Upstream { status: u16, details: Value },

    #[error("Service unavailable")]
    ServiceUnavailable(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::ConfigMissing(key) => Self::ConfigMissing(key),
            AppError::InvalidCredential => Self::InvalidCredential,
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Conflict { slug } => Self::Conflict(slug),
            AppError::GenerationTimeout { timeout } => {
                Self::GenerationTimeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
            }
            AppError::Upstream { status, body } => Self::Upstream {
                status,
                details: body,
            },
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::Reqwest(inner) if inner.is_timeout() => Self::UpstreamTimeout,
            AppError::Reqwest(inner) if inner.is_connect() => {
                tracing::error!("Upstream unreachable: {:?}", inner);
                Self::ServiceUnavailable("Upstream service unreachable".to_string())
            }
            AppError::Database(_)
            | AppError::UploadIo(_)
            | AppError::Reqwest(_)
            | AppError::Config(_)
            | AppError::Json(_)
            | AppError::InternalError(_) => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError(_) | Self::ConfigMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidCredential => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::GenerationTimeout(_) | Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::InternalError(_) => "internal_error",
            Self::ValidationError(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::ConfigMissing(_) => "config_missing",
            Self::InvalidCredential => "invalid_credential",
            Self::Conflict(_) => "conflict",
            Self::GenerationTimeout(_) => "generation_timeout",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::Upstream { .. } => "upstream_error",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::PayloadTooLarge(_) => "payload_too_large",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = ErrorResponse {
            error: self.to_string(),
            status: "error".to_string(),
            kind: self.kind(),
            details: match self {
                Self::Upstream { details, .. } => Some(details),
                _ => None,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}
