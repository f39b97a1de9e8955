//! HTTP API Routes
//!
//! - POST /monitoring/start - launch the monitor loop
//! - POST /monitoring/stop - stop it
//! - GET /monitoring/status - counters and state
//! - GET /monitoring/notifications - recent change alerts

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::monitoring::MonitorStatus;
use crate::server::state::{NotificationsQuery, SharedState};

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub started: bool,
    pub status: MonitorStatus,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
    pub status: MonitorStatus,
}

/// Start monitoring
pub async fn start_monitoring(State(state): State<SharedState>) -> impl IntoResponse {
    let started = state.supervisor.start();
    if started {
        info!("Monitoring started via API");
    } else {
        info!("Monitoring start requested but it is already running");
    }

    Json(ApiResponse::success(StartResponse {
        started,
        status: state.supervisor.status(),
    }))
}

/// Stop monitoring
pub async fn stop_monitoring(State(state): State<SharedState>) -> impl IntoResponse {
    let stopped = state.supervisor.status().running;
    state.supervisor.stop();
    info!("Monitoring stop requested via API");

    Json(ApiResponse::success(StopResponse {
        stopped,
        status: state.supervisor.status(),
    }))
}

/// Get monitoring status
pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.supervisor.status()))
}

/// List recent notifications, newest first
pub async fn list_notifications(
    State(state): State<SharedState>,
    Query(query): Query<NotificationsQuery>,
) -> impl IntoResponse {
    Json(ApiResponse::success(state.notifications.list(query.limit)))
}
