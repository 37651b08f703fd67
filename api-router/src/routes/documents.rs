use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart, State,
    },
    http::{header::CONTENT_DISPOSITION, StatusCode},
    response::IntoResponse,
    Json,
};
use ingestion_pipeline::{encoding::file_name_from_disposition, RawUpload};
use tracing::{debug, info};

use crate::{api_state::ApiState, error::ApiError};

const FILE_FIELD: &str = "file";

pub async fn list_documents(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let documents = state.documents.list().await?;

    Ok(Json(documents))
}

/// Takes the `file` part of a multipart body, normalizes its name and
/// contents to UTF-8 and forwards it upstream.
pub async fn upload_document(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(FILE_FIELD) {
            upload = Some(read_upload(field).await?);
            break;
        }
        debug!(field = ?field.name(), "skipping multipart field");
    }

    let upload =
        upload.ok_or_else(|| ApiError::ValidationError("No file uploaded".to_string()))?;
    info!(
        bytes = upload.content.len(),
        content_type = ?upload.content_type,
        "received upload"
    );

    let response = state.uploads.process(upload).await?;

    Ok(Json(response))
}

async fn read_upload(field: Field<'_>) -> Result<RawUpload, ApiError> {
    // The parsed file name is dropped when it is not valid UTF-8, so read the
    // header bytes directly.
    let file_name = field
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| file_name_from_disposition(value.as_bytes()))
        .or_else(|| field.file_name().map(|name| name.as_bytes().to_vec()))
        .unwrap_or_default();
    let content_type = field.content_type().map(str::to_string);
    let content = field.bytes().await.map_err(multipart_error)?;

    Ok(RawUpload {
        file_name,
        content_type,
        content,
    })
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::ValidationError(err.body_text())
    }
}
