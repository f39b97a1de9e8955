//! Logger collaborator for the capture pipeline
//!
//! Components receive an `Arc<dyn MonitorLogger>` at construction. Every
//! method has a no-op default, so a missing or partial logger never breaks
//! the pipeline.

use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Structured logging capability handed to each component
pub trait MonitorLogger: Send + Sync {
    fn debug(&self, _message: &str, _context: &Value) {}
    fn info(&self, _message: &str, _context: &Value) {}
    fn warn(&self, _message: &str, _context: &Value) {}
    fn error(&self, _message: &str, _context: &Value) {}

    /// Whether diagnostic artifacts (debug images) should be produced
    fn debug_enabled(&self) -> bool {
        false
    }

    /// Persist an encoded image for later inspection. Returns where it went.
    fn save_debug_image(&self, _prefix: &str, _png: &[u8]) -> Option<PathBuf> {
        None
    }
}

/// Logger that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl MonitorLogger for NoopLogger {}

pub fn noop_logger() -> Arc<dyn MonitorLogger> {
    Arc::new(NoopLogger)
}

/// Forwards to `tracing`, optionally writing debug images to a directory
#[derive(Debug, Default, Clone)]
pub struct TracingLogger {
    debug_dir: Option<PathBuf>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable debug mode; artifacts are written below `dir`.
    pub fn with_debug_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            debug_dir: Some(dir.into()),
        }
    }
}

impl MonitorLogger for TracingLogger {
    fn debug(&self, message: &str, context: &Value) {
        tracing::debug!(context = %context, "{}", message);
    }

    fn info(&self, message: &str, context: &Value) {
        tracing::info!(context = %context, "{}", message);
    }

    fn warn(&self, message: &str, context: &Value) {
        tracing::warn!(context = %context, "{}", message);
    }

    fn error(&self, message: &str, context: &Value) {
        tracing::error!(context = %context, "{}", message);
    }

    fn debug_enabled(&self) -> bool {
        self.debug_dir.is_some()
    }

    fn save_debug_image(&self, prefix: &str, png: &[u8]) -> Option<PathBuf> {
        let dir = self.debug_dir.as_ref()?;

        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("Could not create debug directory {:?}: {}", dir, e);
            return None;
        }

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        let path = dir.join(format!("{}-{}.png", prefix, timestamp));

        match std::fs::write(&path, png) {
            Ok(()) => {
                tracing::debug!("Debug image saved to {:?}", path);
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Failed to save debug image {:?}: {}", path, e);
                None
            }
        }
    }
}

/// Severity of a recorded entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub context: Value,
}

/// Keeps every entry in memory. Handy for embedding and for tests.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
    artifacts: Mutex<Vec<String>>,
    debug: bool,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that also reports debug mode and accepts artifacts
    pub fn with_debug() -> Self {
        Self {
            debug: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }

    /// Prefixes passed to `save_debug_image`, in call order
    pub fn artifacts(&self) -> Vec<String> {
        self.artifacts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn record(&self, level: LogLevel, message: &str, context: &Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                level,
                message: message.to_string(),
                context: context.clone(),
            });
        }
    }
}

impl MonitorLogger for MemoryLogger {
    fn debug(&self, message: &str, context: &Value) {
        self.record(LogLevel::Debug, message, context);
    }

    fn info(&self, message: &str, context: &Value) {
        self.record(LogLevel::Info, message, context);
    }

    fn warn(&self, message: &str, context: &Value) {
        self.record(LogLevel::Warn, message, context);
    }

    fn error(&self, message: &str, context: &Value) {
        self.record(LogLevel::Error, message, context);
    }

    fn debug_enabled(&self) -> bool {
        self.debug
    }

    fn save_debug_image(&self, prefix: &str, _png: &[u8]) -> Option<PathBuf> {
        if let Ok(mut artifacts) = self.artifacts.lock() {
            artifacts.push(prefix.to_string());
        }
        None
    }
}
