//! HTTP control surface for the screen monitor
//!
//! Exposes start/stop/status of a supervised monitor and the notifications
//! it raised.

pub mod api;
pub mod state;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::info;

use crate::server::api::{
    get_status, list_notifications, start_monitoring, stop_monitoring, ApiResponse,
};
use crate::server::state::SharedState;

// Re-export ServerConfig from config module
pub use crate::config::server::ServerConfig;
pub use state::ServerState;

/// Screen Watch server instance
pub struct WatchServer {
    config: ServerConfig,
    state: SharedState,
}

impl WatchServer {
    pub fn new(config: ServerConfig, state: ServerState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Serve until `shutdown` resolves, then stop the monitor.
    pub async fn start<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        let app = build_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;

        info!("Screen Watch server listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        self.state.supervisor.shutdown().await?;
        Ok(())
    }
}

/// Build the Axum router
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/monitoring/start", post(start_monitoring))
        .route("/monitoring/stop", post(stop_monitoring))
        .route("/monitoring/status", get(get_status))
        .route("/monitoring/notifications", get(list_notifications))
        .fallback(not_found)
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
}

/// Health check handler
async fn health_handler(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "monitoring": state.supervisor.status().running,
        "uptime_secs": state.uptime_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("Not found")),
    )
}
