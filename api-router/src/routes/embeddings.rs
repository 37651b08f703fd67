use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use workspace_client::types::EmbeddingUpdate;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct BindParams {
    #[serde(default, rename = "documentPath", alias = "documentId")]
    pub document_path: Option<String>,
}

pub async fn update_embeddings(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
    Json(update): Json<EmbeddingUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.binder.update_embeddings(&slug, &update).await?;

    Ok(Json(response))
}

pub async fn bind_document(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
    Json(params): Json<BindParams>,
) -> Result<impl IntoResponse, ApiError> {
    let document_path = params
        .document_path
        .filter(|path| !path.trim().is_empty())
        .ok_or_else(|| ApiError::ValidationError("documentId is required".to_string()))?;

    let response = state.binder.bind(&slug, &document_path).await?;

    Ok(Json(response))
}
