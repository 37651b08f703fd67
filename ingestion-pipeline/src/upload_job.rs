use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use common::error::AppError;
use encoding_rs::{Encoding, UTF_8};
use tempfile::NamedTempFile;
use tracing::{debug, error};
use uuid::Uuid;

use crate::encoding::{normalize, normalize_file_name};

/// A file as it arrived in the multipart body, before any decoding.
#[derive(Debug, Clone)]
pub struct RawUpload {
    /// Filename bytes exactly as the client sent them.
    pub file_name: Vec<u8>,
    pub content_type: Option<String>,
    pub content: Bytes,
}

/// One upload being normalized and forwarded.
///
/// The normalized text is staged in a uniquely named file inside the work
/// directory. The file is removed when the job is finished or dropped, so a
/// job never outlives the request that created it.
#[derive(Debug)]
pub struct UploadJob {
    id: Uuid,
    file_name: String,
    mime_type: String,
    source: Bytes,
    source_encoding: &'static Encoding,
    normalized: String,
    lossy: bool,
    temp: NamedTempFile,
}

impl UploadJob {
    pub fn prepare(work_dir: &Path, upload: RawUpload) -> Result<Self, AppError> {
        let id = Uuid::new_v4();
        let normalized = normalize(&upload.content, "content");
        let file_name = normalize_file_name(
            &upload.file_name,
            (normalized.source_encoding != UTF_8).then_some(normalized.source_encoding),
        );
        let mime_type = upload
            .content_type
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| guess_mime_type(&file_name));

        fs::create_dir_all(work_dir).map_err(AppError::UploadIo)?;
        let mut temp = tempfile::Builder::new()
            .prefix(&format!("upload_{id}_"))
            .suffix(".txt")
            .tempfile_in(work_dir)
            .map_err(AppError::UploadIo)?;
        temp.write_all(normalized.text.as_bytes())
            .and_then(|()| temp.flush())
            .map_err(AppError::UploadIo)?;

        debug!(
            job_id = %id,
            path = %temp.path().display(),
            bytes = normalized.text.len(),
            "staged normalized upload"
        );

        Ok(Self {
            id,
            file_name,
            mime_type,
            source: upload.content,
            source_encoding: normalized.source_encoding,
            normalized: normalized.text,
            lossy: normalized.lossy,
            temp,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn source(&self) -> &Bytes {
        &self.source
    }

    pub fn source_encoding(&self) -> &'static Encoding {
        self.source_encoding
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn lossy(&self) -> bool {
        self.lossy
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Reads back the staged file, which is what gets forwarded upstream.
    pub async fn read_normalized(&self) -> Result<Vec<u8>, AppError> {
        tokio::fs::read(self.temp.path())
            .await
            .map_err(AppError::UploadIo)
    }

    /// Removes the staged file. Failure is logged and otherwise ignored.
    pub fn finish(self) {
        let id = self.id;
        let path: PathBuf = self.temp.path().to_path_buf();
        match self.temp.close() {
            Ok(()) => debug!(job_id = %id, path = %path.display(), "removed staged upload"),
            Err(err) => error!(
                job_id = %id,
                path = %path.display(),
                error = %err,
                "failed to remove staged upload"
            ),
        }
    }
}

fn guess_mime_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or(mime::APPLICATION_OCTET_STREAM)
        .to_string()
}
