use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{delete, get, post},
    Router,
};
use routes::{
    auth::check_auth,
    documents::{list_documents, upload_document},
    embeddings::{bind_document, update_embeddings},
    generation::{generate_questions, workspace_chat},
    liveness::live,
    readiness::ready,
    settings::{get_setting, set_setting},
    workspaces::{
        create_workspace, delete_workspace_file, ensure_workspace, get_workspace,
        list_workspace_files, list_workspaces, workspace_info,
    },
};

pub mod api_state;
pub mod error;
mod routes;


/// Router for the proxy: probes, the desktop-facing routes and the
/// `/api/v1` passthrough surface.
pub fn api_routes<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public probes (for k8s/systemd)
    let probes = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let proxy = Router::new()
        .route("/generate-questions", post(generate_questions))
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route("/workspaces/{slug}", get(get_workspace).post(ensure_workspace))
        .route("/workspaces/{slug}/files", get(list_workspace_files))
        .route(
            "/workspaces/{slug}/files/{file_id}",
            delete(delete_workspace_file),
        )
        .route("/config/{key}", get(get_setting).post(set_setting));

    probes
        .merge(proxy)
        .nest("/api/v1", api_routes_v1(app_state))
}

/// Passthrough routes, version 1
fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route(
            "/document/upload",
            post(upload_document).layer(DefaultBodyLimit::max(
                app_state.config.upload_max_body_bytes,
            )),
        )
        .route("/documents", get(list_documents))
        .route("/workspace/{slug}", get(workspace_info))
        .route(
            "/workspace/{slug}/update-embeddings",
            post(update_embeddings),
        )
        .route("/workspace/{slug}/bind", post(bind_document))
        .route("/workspace/{slug}/chat", post(workspace_chat))
        .route("/auth", get(check_auth))
}
