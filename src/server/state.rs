//! Server State Management
//!
//! Shared state for the HTTP control surface: the supervised monitor and the
//! notification queue it reports into.

use crate::monitoring::MonitorSupervisor;
use crate::notifications::NotificationCenter;
use serde::Deserialize;
use std::sync::Arc;

/// Server runtime state
pub struct ServerState {
    pub supervisor: MonitorSupervisor,
    pub notifications: Arc<NotificationCenter>,
    /// Server start time
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn new(supervisor: MonitorSupervisor, notifications: Arc<NotificationCenter>) -> Self {
        Self {
            supervisor,
            notifications,
            start_time: chrono::Utc::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> i64 {
        let now = chrono::Utc::now();
        now.signed_duration_since(self.start_time).num_seconds()
    }
}

/// Query of `GET /monitoring/notifications`
#[derive(Debug, Default, Deserialize)]
pub struct NotificationsQuery {
    pub limit: Option<usize>,
}
