//! Server execution logic.

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use tower_http::{services::ServeDir, trace::TraceLayer};

use rehearsal_shared::time::SystemClock;

use crate::{http::health_check, signal::shutdown_signal, state::AppState, ws::websocket_handler};

/// Build the application router.
///
/// `static_dir`, when given, is served as the fallback so the web client
/// and the signaling endpoint share one origin (page routes themselves are
/// plain files; nothing here renders them).
pub fn build_router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_check))
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Run the signaling server.
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port serving both HTTP and WebSocket traffic
/// * `static_dir` - Optional directory of web client assets to serve
pub async fn run_server(
    host: String,
    port: u16,
    static_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(Arc::new(SystemClock)));
    let app = build_router(state, static_dir);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!(
        "Rehearsal Space server (HTTP + WS) listening on {}",
        listener.local_addr()?
    );
    tracing::info!("Connect to: ws://{}/ws", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
