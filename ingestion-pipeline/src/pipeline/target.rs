use async_trait::async_trait;
use common::error::AppError;
use serde_json::Value;
use workspace_client::DocumentService;

/// Where normalized uploads are sent.
#[async_trait]
pub trait UploadTarget: Send + Sync {
    async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        contents: Vec<u8>,
    ) -> Result<Value, AppError>;
}

#[async_trait]
impl UploadTarget for DocumentService {
    async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        contents: Vec<u8>,
    ) -> Result<Value, AppError> {
        DocumentService::upload(self, file_name, mime_type, contents).await
    }
}
