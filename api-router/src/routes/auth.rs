use axum::{extract::State, response::IntoResponse, Json};
use common::error::AppError;
use tracing::warn;

use crate::{api_state::ApiState, error::ApiError};

/// Checks the stored key against the upstream. Anything other than a
/// rejected or missing key is reported as the upstream being unavailable.
pub async fn check_auth(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    match state.upstream.check_auth().await {
        Ok(body) => Ok(Json(body)),
        Err(err @ (AppError::InvalidCredential | AppError::ConfigMissing(_))) => Err(err.into()),
        Err(err) => {
            warn!(error = %err, "auth check failed");
            Err(ApiError::ServiceUnavailable(err.to_string()))
        }
    }
}
