use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use common::error::AppError;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceParams {
    #[serde(default)]
    pub name: Option<String>,
}

/// Lists upstream workspaces. Upstream failures degrade to an empty list; a
/// missing credential is still reported.
pub async fn list_workspaces(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    match state.workspaces.list().await {
        Ok(workspaces) => Ok(Json(workspaces)),
        Err(err @ AppError::ConfigMissing(_)) => Err(err.into()),
        Err(err) => {
            warn!(error = %err, "listing workspaces failed, returning an empty list");
            Ok(Json(json!([])))
        }
    }
}

pub async fn create_workspace(
    State(state): State<ApiState>,
    Json(params): Json<CreateWorkspaceParams>,
) -> Result<impl IntoResponse, ApiError> {
    let name = params
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::ValidationError("Name is required".to_string()))?;

    let workspace = state.workspaces.ensure_exists(&name).await?;

    Ok(Json(workspace))
}

pub async fn ensure_workspace(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.workspaces.ensure_exists(&slug).await?;

    Ok(Json(workspace))
}

pub async fn get_workspace(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.workspaces.get(&slug).await?;

    Ok(Json(workspace))
}

/// Raw upstream workspace information, envelope included.
pub async fn workspace_info(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state.workspaces.raw(&slug).await?;

    Ok(Json(info))
}

pub async fn list_workspace_files(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.workspaces.get(&slug).await?;

    Ok(Json(json!({ "documents": workspace.documents })))
}

pub async fn delete_workspace_file(
    State(state): State<ApiState>,
    Path((slug, file_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.binder.unbind(&slug, &file_id).await?;

    Ok(Json(response))
}
