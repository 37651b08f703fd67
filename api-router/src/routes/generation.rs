use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use workspace_client::types::{ChatRequest, GenerationRequest};

use crate::{api_state::ApiState, error::ApiError};

/// Forwards a question-generation prompt to the default workspace, with a
/// timeout scaled to the requested `count`.
pub async fn generate_questions(
    State(state): State<ApiState>,
    Json(request): Json<GenerationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.generation.generate(request).await?;

    Ok(Json(response))
}

pub async fn workspace_chat(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.generation.chat(&slug, &body).await?;

    Ok(Json(response))
}
