use api_router::{api_routes, api_state::ApiState};
use axum::Router;
use common::utils::config::get_config;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;
    info!(
        upstream = %config.upstream_base_url,
        default_workspace = %config.default_workspace_slug,
        upload_dir = %config.upload_dir().display(),
        "Configuration loaded"
    );

    if !config.settings_persist() {
        warn!(
            address = %config.surrealdb_address,
            "Settings store is in memory; the API key is lost on restart"
        );
    }

    let api_state = ApiState::new(&config).await?;
    let app = build_app(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server closed");
    Ok(())
}

fn build_app(api_state: ApiState) -> Router {
    api_routes(&api_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(api_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("SIGINT received, closing server"),
        () = terminate => info!("SIGTERM received, closing server"),
    }
}
