use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SetSettingParams {
    #[serde(default)]
    pub value: Option<Value>,
}

/// Returns the stored value, or `null` when the key is unset.
pub async fn get_setting(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let value = state.settings.get(&key).await?;

    Ok(Json(value))
}

pub async fn set_setting(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Json(params): Json<SetSettingParams>,
) -> Result<impl IntoResponse, ApiError> {
    let value = match params.value {
        None | Some(Value::Null) => {
            return Err(ApiError::ValidationError("Value is required".to_string()))
        }
        Some(Value::String(value)) => value,
        Some(other) => other.to_string(),
    };

    state.settings.set(&key, &value).await?;
    info!(%key, "setting updated");

    Ok(Json(json!({ "success": true })))
}
