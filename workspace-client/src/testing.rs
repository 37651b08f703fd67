//! In-process stand-in for the upstream workspace service, used by tests.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use axum::{
    extract::{Multipart, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::storage::{db::SurrealDbClient, settings::SettingsStore};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Barrier, task::JoinHandle};
use uuid::Uuid;

use crate::{
    client::{ClientFactory, Upstream},
    credential::CredentialResolver,
    types::{ChatRequest, EmbeddingUpdate},
};

pub const TEST_API_KEY: &str = "test-api-key";
pub const CREDENTIAL_KEY: &str = "anythingllm_api_key";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub accept: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub contents: Vec<u8>,
}

#[derive(Default)]
pub struct FakeState {
    workspaces: Mutex<BTreeMap<String, Value>>,
    requests: Mutex<Vec<RecordedRequest>>,
    embedding_updates: Mutex<Vec<EmbeddingUpdate>>,
    chats: Mutex<Vec<(String, ChatRequest)>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    hidden_lookups: AtomicUsize,
    lookup_failure: Mutex<Option<u16>>,
    lookup_barrier: Mutex<Option<Arc<Barrier>>>,
    chat_delay: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl FakeState {
    pub fn insert_workspace(&self, slug: &str) {
        let mut workspaces = lock(&self.workspaces);
        let id = workspaces.len() + 1;
        workspaces.insert(
            slug.to_string(),
            json!({
                "id": id,
                "name": slug,
                "slug": slug,
                "documents": []
            }),
        );
    }

    /// Adds a bound document and returns its id.
    pub fn insert_document(&self, slug: &str, file_name: &str, location: &str) -> String {
        let id = Uuid::new_v4().to_string();
        if let Some(workspace) = lock(&self.workspaces).get_mut(slug) {
            if let Some(documents) = workspace["documents"].as_array_mut() {
                documents.push(json!({
                    "id": id,
                    "filename": file_name,
                    "docpath": location,
                }));
            }
        }
        id
    }

    pub fn workspace_count(&self) -> usize {
        lock(&self.workspaces).len()
    }

    pub fn document_locations(&self, slug: &str) -> Vec<String> {
        lock(&self.workspaces)
            .get(slug)
            .and_then(|workspace| workspace["documents"].as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|document| document["docpath"].as_str().map(str::to_string))
            .collect()
    }

    /// The next `n` lookups answer 404 even when the workspace exists.
    pub fn hide_next_lookups(&self, n: usize) {
        self.hidden_lookups.store(n, Ordering::SeqCst);
    }

    pub fn fail_lookups_with(&self, status: u16) {
        *lock(&self.lookup_failure) = Some(status);
    }

    /// Lookups that miss wait on this barrier before answering, so racing
    /// callers both observe the workspace as absent.
    pub fn set_lookup_barrier(&self, barrier: Arc<Barrier>) {
        *lock(&self.lookup_barrier) = Some(barrier);
    }

    pub fn set_chat_delay(&self, delay: Duration) {
        *lock(&self.chat_delay) = Some(delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn paths(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|request| format!("{} {}", request.method, request.path))
            .collect()
    }

    pub fn embedding_updates(&self) -> Vec<EmbeddingUpdate> {
        lock(&self.embedding_updates).clone()
    }

    pub fn chats(&self) -> Vec<(String, ChatRequest)> {
        lock(&self.chats).clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        lock(&self.uploads).clone()
    }
}

pub struct FakeUpstream {
    pub base_url: String,
    pub state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake upstream");
        let address = listener.local_addr().expect("fake upstream address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: format!("http://{address}"),
            state,
            handle,
        }
    }

    /// Settings store pre-loaded with `key` (or left empty), plus an
    /// `Upstream` pointed at this fake.
    pub async fn upstream_with_key(&self, key: Option<&str>) -> Upstream {
        let store = memory_settings(key).await;
        Upstream::new(
            CredentialResolver::new(store, CREDENTIAL_KEY),
            ClientFactory::new(&self.base_url).expect("fake base url"),
        )
    }
}

pub async fn memory_settings(key: Option<&str>) -> Arc<SurrealDbClient> {
    let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
        .await
        .expect("Failed to start in-memory surrealdb");
    if let Some(key) = key {
        db.set(CREDENTIAL_KEY, key).await.expect("store api key");
    }
    Arc::new(db)
}

fn router(state: Arc<FakeState>) -> Router {
    Router::new()
        .route("/api/v1/auth", get(auth))
        .route("/api/v1/workspaces", get(list_workspaces))
        .route("/api/v1/workspace/new", post(create_workspace))
        .route("/api/v1/workspace/{slug}", get(get_workspace))
        .route(
            "/api/v1/workspace/{slug}/update-embeddings",
            post(update_embeddings),
        )
        .route("/api/v1/workspace/{slug}/chat", post(chat))
        .route("/api/v1/document/upload", post(upload))
        .route("/api/v1/documents", get(documents))
        .route_layer(middleware::from_fn_with_state(state.clone(), record_and_authorize))
        .with_state(state)
}

async fn record_and_authorize(
    State(state): State<Arc<FakeState>>,
    request: Request,
    next: Next,
) -> Response {
    // Owned copies only; `request` moves into `next.run` below.
    let recorded = {
        let header_value = |name: header::HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        RecordedRequest {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            authorization: header_value(header::AUTHORIZATION),
            accept: header_value(header::ACCEPT),
        }
    };
    let expected = format!("Bearer {TEST_API_KEY}");
    let authorized = recorded.authorization.as_deref() == Some(expected.as_str());
    lock(&state.requests).push(recorded);

    if !authorized {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "No valid api key found."})),
        )
            .into_response();
    }
    next.run(request).await
}

async fn auth() -> Json<Value> {
    Json(json!({"authenticated": true}))
}

async fn list_workspaces(State(state): State<Arc<FakeState>>) -> Json<Value> {
    let workspaces: Vec<Value> = lock(&state.workspaces).values().cloned().collect();
    Json(json!({ "workspaces": workspaces }))
}

async fn get_workspace(
    State(state): State<Arc<FakeState>>,
    Path(slug): Path<String>,
) -> Response {
    if let Some(status) = *lock(&state.lookup_failure) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({"error": "lookup failed"}))).into_response();
    }

    let hidden = state
        .hidden_lookups
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    let found = if hidden {
        None
    } else {
        lock(&state.workspaces).get(&slug).cloned()
    };

    match found {
        Some(workspace) => Json(json!({ "workspace": [workspace] })).into_response(),
        None => {
            let barrier = lock(&state.lookup_barrier).clone();
            if let Some(barrier) = barrier {
                barrier.wait().await;
            }
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Workspace not found"})),
            )
                .into_response()
        }
    }
}

async fn create_workspace(
    State(state): State<Arc<FakeState>>,
    Json(body): Json<Value>,
) -> Response {
    let slug = body["name"].as_str().unwrap_or_default().to_lowercase();
    if lock(&state.workspaces).contains_key(&slug) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "Workspace already exists", "slug": slug})),
        )
            .into_response();
    }

    state.insert_workspace(&slug);
    let workspace = lock(&state.workspaces).get(&slug).cloned();
    Json(json!({ "workspace": workspace, "message": null })).into_response()
}

async fn update_embeddings(
    State(state): State<Arc<FakeState>>,
    Path(slug): Path<String>,
    Json(update): Json<EmbeddingUpdate>,
) -> Response {
    lock(&state.embedding_updates).push(update.clone());

    let mut workspaces = lock(&state.workspaces);
    let Some(workspace) = workspaces.get_mut(&slug) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Workspace not found"})),
        )
            .into_response();
    };
    if let Some(documents) = workspace["documents"].as_array_mut() {
        documents.retain(|document| {
            !update
                .deletes
                .iter()
                .any(|location| document["docpath"] == location.as_str())
        });
        for location in &update.adds {
            documents.push(json!({
                "id": Uuid::new_v4().to_string(),
                "filename": location.rsplit('/').next().unwrap_or(location),
                "docpath": location,
            }));
        }
    }

    Json(json!({ "workspace": workspace.clone() })).into_response()
}

async fn chat(
    State(state): State<Arc<FakeState>>,
    Path(slug): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Response {
    if !lock(&state.workspaces).contains_key(&slug) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Workspace not found"})),
        )
            .into_response();
    }

    let delay = *lock(&state.chat_delay);
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let reply = format!("echo: {}", request.message);
    lock(&state.chats).push((slug, request));
    Json(json!({
        "id": Uuid::new_v4().to_string(),
        "type": "textResponse",
        "textResponse": reply,
        "close": true,
        "error": null
    }))
    .into_response()
}

async fn upload(State(state): State<Arc<FakeState>>, mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let Ok(contents) = field.bytes().await else {
            break;
        };

        lock(&state.uploads).push(RecordedUpload {
            file_name: file_name.clone(),
            content_type,
            contents: contents.to_vec(),
        });
        return Json(json!({
            "success": true,
            "error": null,
            "documents": [{
                "id": Uuid::new_v4().to_string(),
                "location": format!("custom-documents/{file_name}.json"),
                "title": file_name
            }]
        }))
        .into_response();
    }

    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": "No file part"})),
    )
        .into_response()
}

async fn documents() -> Json<Value> {
    Json(json!({
        "localFiles": {
            "name": "documents",
            "type": "folder",
            "items": []
        }
    }))
}
