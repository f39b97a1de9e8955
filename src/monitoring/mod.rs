//! Monitoring module - the capture/compare loop and its supervision

pub mod monitor;
pub mod retry;
pub mod supervisor;

// Re-export commonly used types
pub use monitor::{IterationOutcome, MonitorHandle, MonitorStatus, ScreenMonitor};
pub use retry::{retry_with, RetryError, RetryPolicy};
pub use supervisor::MonitorSupervisor;
