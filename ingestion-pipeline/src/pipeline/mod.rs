mod target;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use common::error::AppError;
use serde_json::Value;
use tracing::{error, info, info_span, warn, Instrument};
use workspace_client::DocumentService;

use crate::upload_job::{RawUpload, UploadJob};

pub use target::UploadTarget;

/// Normalizes uploaded files to UTF-8 and forwards them to an [`UploadTarget`].
pub struct UploadPipeline<T = DocumentService> {
    target: T,
    work_dir: PathBuf,
}

impl<T: UploadTarget> UploadPipeline<T> {
    pub fn new(target: T, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            target,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Stages, forwards and cleans up one upload. The staged file is removed
    /// whether or not forwarding succeeds.
    pub async fn process(&self, upload: RawUpload) -> Result<Value, AppError> {
        let job = UploadJob::prepare(&self.work_dir, upload)?;
        let span = info_span!("upload_job", job_id = %job.id(), file_name = %job.file_name());

        async {
            if job.lossy() {
                warn!("upload contained bytes that could not be decoded");
            }
            info!(
                source_encoding = job.source_encoding().name(),
                source_bytes = job.source().len(),
                mime_type = job.mime_type(),
                "upload normalized"
            );

            let result = self.forward(&job).await;
            job.finish();

            match &result {
                Ok(_) => info!("upload forwarded"),
                Err(err) => error!(error = %err, "upload failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn forward(&self, job: &UploadJob) -> Result<Value, AppError> {
        let contents = job.read_normalized().await?;
        self.target
            .upload(job.file_name(), job.mime_type(), contents)
            .await
    }
}
