use std::{future::IntoFuture, sync::Arc, time::Duration};

use axum::http::StatusCode;
use bytes::Bytes;
use encoding_rs::GBK;
use serde_json::{json, Value};
use tokio::sync::Barrier;
use workspace_client::testing::TEST_API_KEY;

use test_utils::*;

/// End-to-end flows through the proxy router against a fake upstream.

#[tokio::test]
async fn test_conflict_on_create_is_resolved_by_refetch() {
    let ctx = TestContext::new(Some(TEST_API_KEY)).await;
    ctx.fake.state.insert_workspace("demo");
    // The first lookup misses, so creation runs into the existing workspace.
    ctx.fake.state.hide_next_lookups(1);

    let response = ctx.server.post("/workspaces/demo").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let workspace: Value = response.json();
    assert_eq!(workspace["slug"], "demo");
    assert_eq!(
        ctx.fake.state.paths(),
        vec![
            "GET /api/v1/workspace/demo",
            "POST /api/v1/workspace/new",
            "GET /api/v1/workspace/demo",
        ]
    );
    assert_eq!(ctx.fake.state.workspace_count(), 1);
}

#[tokio::test]
async fn test_concurrent_get_or_create_converges() {
    let ctx = TestContext::new(Some(TEST_API_KEY)).await;
    ctx.fake.state.set_lookup_barrier(Arc::new(Barrier::new(2)));

    let (first, second) = tokio::join!(
        ctx.server.post("/workspaces/race").into_future(),
        ctx.server.post("/workspaces/race").into_future(),
    );

    assert_eq!(first.status_code(), StatusCode::OK);
    assert_eq!(second.status_code(), StatusCode::OK);
    assert_eq!(first.json::<Value>()["slug"], "race");
    assert_eq!(second.json::<Value>()["slug"], "race");
    assert_eq!(ctx.fake.state.workspace_count(), 1);
}

#[tokio::test]
async fn test_unbinding_unknown_file_is_not_found() {
    let ctx = TestContext::new(Some(TEST_API_KEY)).await;
    ctx.fake.state.insert_workspace("demo");
    ctx.fake
        .state
        .insert_document("demo", "kept.txt", "custom-documents/kept.json");

    let response = ctx.server.delete("/workspaces/demo/files/missing-id").await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["kind"], "not_found");
    assert!(ctx.fake.state.embedding_updates().is_empty());
    assert_eq!(
        ctx.fake.state.document_locations("demo"),
        vec!["custom-documents/kept.json"]
    );
}

#[tokio::test]
async fn test_gbk_upload_is_forwarded_as_utf8() {
    let ctx = TestContext::new(Some(TEST_API_KEY)).await;
    let content = "关于召开年度工作总结会议的通知：请各部门负责人准时参加，并提前准备好汇报材料。";
    let (encoded_content, _, _) = GBK.encode(content);
    let (encoded_name, _, _) = GBK.encode("会议通知.txt");

    let response = ctx
        .server
        .post("/api/v1/document/upload")
        .content_type("multipart/form-data; boundary=proxyboundary")
        .bytes(Bytes::from(multipart_body(
            "proxyboundary",
            &encoded_name,
            &encoded_content,
        )))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let uploads = ctx.fake.state.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(
        String::from_utf8(uploads[0].contents.clone()).expect("forwarded content is UTF-8"),
        content
    );
    assert_eq!(uploads[0].file_name, "会议通知.txt");
    assert_eq!(ctx.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_failed_upload_leaves_no_temp_files() {
    let ctx = TestContext::new(Some("revoked-key")).await;

    let response = ctx
        .server
        .post("/api/v1/document/upload")
        .content_type("multipart/form-data; boundary=proxyboundary")
        .bytes(Bytes::from(multipart_body(
            "proxyboundary",
            b"notes.txt",
            b"some notes",
        )))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["kind"], "invalid_credential");
    assert!(ctx.fake.state.uploads().is_empty());
    assert_eq!(ctx.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_missing_credential_never_reaches_upstream() {
    let ctx = TestContext::new(None).await;

    let generate = ctx
        .server
        .post("/generate-questions")
        .json(&json!({ "prompt": "anything", "count": 1 }))
        .await;
    let files = ctx.server.get("/workspaces/demo/files").await;
    let chat = ctx
        .server
        .post("/api/v1/workspace/demo/chat")
        .json(&json!({ "message": "hi" }))
        .await;
    let upload = ctx
        .server
        .post("/api/v1/document/upload")
        .content_type("multipart/form-data; boundary=proxyboundary")
        .bytes(Bytes::from(multipart_body("proxyboundary", b"a.txt", b"a")))
        .await;

    for response in [generate, files, chat, upload] {
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["kind"], "config_missing");
    }
    assert_eq!(ctx.fake.state.request_count(), 0);
    assert_eq!(ctx.leftover_uploads(), 0);
}

#[tokio::test]
async fn test_generate_questions_passthrough() {
    let ctx = TestContext::new(Some(TEST_API_KEY)).await;
    ctx.fake.state.insert_workspace("default");

    let response = ctx
        .server
        .post("/generate-questions")
        .json(&json!({ "prompt": "five questions", "model": "mistral", "count": 5 }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["textResponse"], "echo: five questions");

    let chats = ctx.fake.state.chats();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].0, "default");
    assert_eq!(chats[0].1.model.as_deref(), Some("mistral"));
    assert!(!chats[0].1.stream);
}

#[tokio::test]
async fn test_generation_timeout_is_reported_distinctly() {
    let ctx = TestContext::with_config(Some(TEST_API_KEY), |config| {
        common::utils::config::AppConfig {
            generation_base_timeout_secs: 1,
            generation_per_item_timeout_secs: 0,
            ..config
        }
    })
    .await;
    ctx.fake.state.insert_workspace("default");
    ctx.fake.state.set_chat_delay(Duration::from_secs(3));

    let response = ctx
        .server
        .post("/generate-questions")
        .json(&json!({ "prompt": "slow", "count": 4 }))
        .await;

    assert_eq!(response.status_code(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json();
    assert_eq!(body["kind"], "generation_timeout");
    assert!(ctx.fake.state.chats().is_empty());
}

#[tokio::test]
async fn test_upstream_errors_keep_status_and_body() {
    let ctx = TestContext::new(Some(TEST_API_KEY)).await;
    ctx.fake.state.fail_lookups_with(502);

    let response = ctx.server.get("/workspaces/demo").await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["kind"], "upstream_error");
    assert_eq!(body["details"], json!({ "error": "lookup failed" }));
}

#[tokio::test]
async fn test_bind_then_list_then_unbind() {
    let ctx = TestContext::new(Some(TEST_API_KEY)).await;

    let created = ctx
        .server
        .post("/workspaces")
        .json(&json!({ "name": "library" }))
        .await;
    assert_eq!(created.status_code(), StatusCode::OK);

    let bound = ctx
        .server
        .post("/api/v1/workspace/library/bind")
        .json(&json!({ "documentPath": "custom-documents/book.json" }))
        .await;
    assert_eq!(bound.status_code(), StatusCode::OK);

    let files: Value = ctx.server.get("/workspaces/library/files").await.json();
    let id = files["documents"][0]["id"]
        .as_str()
        .expect("document id")
        .to_string();
    assert_eq!(
        files["documents"][0]["location"],
        "custom-documents/book.json"
    );

    let removed = ctx
        .server
        .delete(&format!("/workspaces/library/files/{id}"))
        .await;
    assert_eq!(removed.status_code(), StatusCode::OK);
    assert!(ctx.fake.state.document_locations("library").is_empty());
}
