use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;
use tokio::signal;

use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::api;
use crate::config::{AppConfig, ServerConfig};
use crate::llm::WorkersAiClient;
use crate::session::FileSessionStore;

/// Build the full application router: `/api/*` handlers, static assets for
/// everything else.
pub fn build_app(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .nest("/api", api::build_router())
        .fallback_service(ServeDir::new(&server.static_dir))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    info!(
        name: "inference.config.loaded",
        base_url = %config.inference.base_url,
        llm_model = %config.models.llm_model_id,
        stt_model = %config.models.stt_model_id,
        "Inference configuration loaded"
    );

    let sessions = FileSessionStore::new(&config.storage.data_dir);
    info!(
        name: "session.store.ready",
        data_dir = %sessions.base_path().display(),
        "Session store ready"
    );

    let state = AppState {
        inference: Arc::new(WorkersAiClient::new(&config.inference)),
        sessions: Arc::new(sessions),
        models: Arc::new(config.models.clone()),
    };

    let app = build_app(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        () = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
