//! Runs a [`ScreenMonitor`] on a background task

use crate::error::Result;
use crate::monitoring::monitor::{MonitorHandle, MonitorStatus, ScreenMonitor};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

pub struct MonitorSupervisor {
    monitor: Arc<tokio::sync::Mutex<ScreenMonitor>>,
    handle: MonitorHandle,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl MonitorSupervisor {
    pub fn new(monitor: ScreenMonitor) -> Self {
        let handle = monitor.handle();
        Self {
            monitor: Arc::new(tokio::sync::Mutex::new(monitor)),
            handle,
            task: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    pub fn status(&self) -> MonitorStatus {
        self.handle.status()
    }

    /// Launch the loop unless one is already running.
    ///
    /// Returns `false` when the monitor is busy (running, or still finishing
    /// its last iteration after a stop).
    pub fn start(&self) -> bool {
        if self.handle.is_running() {
            return false;
        }

        // Whoever holds the monitor is running it.
        let Ok(mut monitor) = self.monitor.clone().try_lock_owned() else {
            tracing::debug!("Monitor is busy; not starting another run");
            return false;
        };
        if !monitor.claim() {
            return false;
        }

        let task = tokio::spawn(async move {
            let result = monitor.run_claimed().await;
            if let Err(e) = &result {
                tracing::error!("Monitoring stopped with error: {}", e);
            }
            result
        });

        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        true
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Stop and wait for the loop task to finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();
        let task = self.task.lock().ok().and_then(|mut slot| slot.take());
        match task {
            Some(task) => task.await?,
            None => Ok(()),
        }
    }
}
