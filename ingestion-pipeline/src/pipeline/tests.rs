use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use common::error::AppError;
use encoding_rs::{GBK, SHIFT_JIS};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use workspace_client::{
    testing::{FakeUpstream, CREDENTIAL_KEY, TEST_API_KEY},
    DocumentService,
};

use super::{UploadPipeline, UploadTarget};
use crate::upload_job::RawUpload;

#[derive(Debug, Clone)]
struct Forwarded {
    file_name: String,
    mime_type: String,
    contents: Vec<u8>,
}

struct MockTarget {
    fail_with: Option<u16>,
    forwarded: Mutex<Vec<Forwarded>>,
}

impl MockTarget {
    fn accepting() -> Self {
        Self {
            fail_with: None,
            forwarded: Mutex::new(Vec::new()),
        }
    }

    fn failing(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            forwarded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl UploadTarget for MockTarget {
    async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        contents: Vec<u8>,
    ) -> Result<Value, AppError> {
        self.forwarded.lock().await.push(Forwarded {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            contents,
        });
        match self.fail_with {
            Some(status) => Err(AppError::Upstream {
                status,
                body: json!({ "error": "rejected" }),
            }),
            None => Ok(json!({ "success": true })),
        }
    }
}

fn upload(file_name: &[u8], content: Vec<u8>) -> RawUpload {
    RawUpload {
        file_name: file_name.to_vec(),
        content_type: Some("text/plain".into()),
        content: Bytes::from(content),
    }
}

fn is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut it| it.next().is_none())
        .unwrap_or(true)
}

#[tokio::test]
async fn forwards_gbk_upload_as_utf8() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = UploadPipeline::new(MockTarget::accepting(), dir.path());
    let text = "第一季度销售报告：本季度销售额同比增长百分之十五，主要得益于新产品的推出和市场推广活动。";
    let (encoded, _, _) = GBK.encode(text);

    let result = pipeline
        .process(upload(b"report.txt", encoded.into_owned()))
        .await
        .expect("upload succeeds");

    assert_eq!(result, json!({ "success": true }));
    let forwarded = pipeline.target.forwarded.lock().await.clone();
    assert_eq!(forwarded.len(), 1);
    let first = &forwarded[0];
    assert_eq!(first.file_name, "report.txt");
    assert_eq!(first.mime_type, "text/plain");
    assert_eq!(String::from_utf8(first.contents.clone()).expect("utf8"), text);
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn non_utf8_file_name_is_forwarded_as_utf8() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = UploadPipeline::new(MockTarget::accepting(), dir.path());
    let name = "売上報告書と会議資料.txt";
    let (encoded_name, _, _) = SHIFT_JIS.encode(name);

    pipeline
        .process(upload(&encoded_name, b"plain ascii".to_vec()))
        .await
        .expect("upload succeeds");

    let forwarded = pipeline.target.forwarded.lock().await.clone();
    assert!(std::str::from_utf8(forwarded[0].file_name.as_bytes()).is_ok());
    assert!(forwarded[0].file_name.ends_with(".txt"));
    assert_eq!(forwarded[0].contents, b"plain ascii");
}

#[tokio::test]
async fn short_file_name_is_decoded_like_its_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = UploadPipeline::new(MockTarget::accepting(), dir.path());
    let text = "本日の会議資料をお送りします。ご確認のほど、よろしくお願いいたします。";
    let (content, _, _) = SHIFT_JIS.encode(text);
    let (name, _, _) = SHIFT_JIS.encode("資料.txt");

    pipeline
        .process(upload(&name, content.into_owned()))
        .await
        .expect("upload succeeds");

    let forwarded = pipeline.target.forwarded.lock().await.clone();
    assert_eq!(forwarded[0].file_name, "資料.txt");
    assert_eq!(String::from_utf8(forwarded[0].contents.clone()).expect("utf8"), text);
}

#[tokio::test]
async fn staged_file_is_removed_when_forwarding_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = UploadPipeline::new(MockTarget::failing(502), dir.path());

    let err = pipeline
        .process(upload(b"a.txt", b"hello".to_vec()))
        .await
        .expect_err("upstream rejects");

    assert!(matches!(err, AppError::Upstream { status: 502, .. }));
    assert_eq!(pipeline.target.forwarded.lock().await.len(), 1);
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn concurrent_uploads_with_the_same_name_do_not_collide() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = UploadPipeline::new(MockTarget::accepting(), dir.path());

    let (first, second) = tokio::join!(
        pipeline.process(upload(b"same.txt", b"first".to_vec())),
        pipeline.process(upload(b"same.txt", b"second".to_vec())),
    );
    first.expect("first upload");
    second.expect("second upload");

    let mut contents: Vec<Vec<u8>> = pipeline
        .target
        .forwarded
        .lock()
        .await
        .iter()
        .map(|f| f.contents.clone())
        .collect();
    contents.sort();
    assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn document_service_target_reaches_upstream() {
    let fake = FakeUpstream::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let service = DocumentService::new(fake.upstream_with_key(Some(TEST_API_KEY)).await);
    let pipeline = UploadPipeline::new(service, dir.path());

    let (encoded, _, _) = GBK.encode("数据");
    pipeline
        .process(upload("数据.txt".as_bytes(), encoded.into_owned()))
        .await
        .expect("upload succeeds");

    let uploads = fake.state.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].file_name, "数据.txt");
    assert!(std::str::from_utf8(&uploads[0].contents).is_ok());
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn missing_credential_stops_before_upstream() {
    let fake = FakeUpstream::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let service = DocumentService::new(fake.upstream_with_key(None).await);
    let pipeline = UploadPipeline::new(service, dir.path());

    let err = pipeline
        .process(upload(b"a.txt", b"hello".to_vec()))
        .await
        .expect_err("no credential");

    assert!(matches!(err, AppError::ConfigMissing(ref key) if key == CREDENTIAL_KEY));
    assert_eq!(fake.state.request_count(), 0);
    assert!(is_empty(dir.path()));
}
