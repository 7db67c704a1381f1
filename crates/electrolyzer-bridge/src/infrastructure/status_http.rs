//! HTTP status endpoint (and optional static asset origin).
//!
//! - `GET /status`: live [`StatusReport`] as JSON.
//! - anything else: files from the configured static directory, if any.
//!
//! Responses carry a permissive CORS layer so a dashboard served from another
//! origin can poll `/status`.
//!
//! Static assets live on this port, not on the WebSocket port. The client
//! listener only performs tokio-tungstenite upgrades, so a dashboard loaded
//! from `--static-dir` must open its socket against the client port
//! explicitly rather than relying on a same-origin URL.

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::application::SharedCoordinator;
use crate::domain::{BridgeConfig, StatusReport};

/// Builds the HTTP router.
pub fn router(coordinator: SharedCoordinator, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new().route("/status", get(get_status));

    if let Some(dir) = static_dir {
        if dir.is_dir() {
            info!("serving static assets from {}", dir.display());
            app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
        } else {
            warn!("static dir {} does not exist; static serving disabled", dir.display());
        }
    }

    app.layer(CorsLayer::permissive()).with_state(coordinator)
}

/// `GET /status`
async fn get_status(State(coordinator): State<SharedCoordinator>) -> Json<StatusReport> {
    Json(coordinator.lock().await.status())
}

/// Serves HTTP on `listener` until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the server fails while running.
pub async fn serve_status(
    listener: TcpListener,
    config: Arc<BridgeConfig>,
    coordinator: SharedCoordinator,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let app = router(coordinator, config.static_dir.as_deref());

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(running))
        .await
        .context("status server error")
}

async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    info!("shutdown flag set; stopping status server");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
