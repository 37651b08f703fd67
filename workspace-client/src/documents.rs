use common::error::AppError;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::info;

use crate::client::Upstream;

/// Document upload and listing against the upstream document store.
#[derive(Clone)]
pub struct DocumentService {
    upstream: Upstream,
}

impl DocumentService {
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }

    pub async fn list(&self) -> Result<Value, AppError> {
        let client = self.upstream.connect(None).await?;
        client
            .execute("list_documents", client.get("/api/v1/documents"))
            .await
    }

    /// Forwards an already normalized file as the `file` part of a multipart
    /// upload.
    pub async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        contents: Vec<u8>,
    ) -> Result<Value, AppError> {
        let client = self.upstream.connect(None).await?;

        let size = contents.len();
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        // Send the filename as raw UTF-8; percent-encoding it makes the
        // receiving side store the escaped form as the document name.
        let form = Form::new().percent_encode_noop().part("file", part);

        info!(file_name, mime_type, size, "forwarding upload");
        client
            .execute(
                "upload_document",
                client.post("/api/v1/document/upload").multipart(form),
            )
            .await
    }
}
