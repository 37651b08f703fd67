#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod encoding;
pub mod pipeline;
pub mod upload_job;

pub use pipeline::{UploadPipeline, UploadTarget};
pub use upload_job::{RawUpload, UploadJob};
