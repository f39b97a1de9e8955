//! Screen Watch - watches a region of the screen and raises a notification
//! when enough of it changes between two captures.

pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod notifications;
pub mod server;

use std::sync::Arc;

use capture::{CaptureMode, FrameSource, ImageComparator, ScreenCapturer, SyntheticSource};
use config::WatchConfig;
use logging::{MonitorLogger, TracingLogger};
use monitoring::ScreenMonitor;
use notifications::Notifier;

pub use error::{Result, WatchError};

/// Initialize tracing. `RUST_LOG` wins over the built-in filter.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "screen_watch=debug,tower_http=debug"
    } else {
        "screen_watch=info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Logger honouring the `[logging]` section
pub fn logger_for(config: &WatchConfig) -> Arc<dyn MonitorLogger> {
    match config.debug_dir() {
        Some(dir) => Arc::new(TracingLogger::with_debug_dir(dir)),
        None => Arc::new(TracingLogger::new()),
    }
}

/// Frame source for the configured environment
pub fn frame_source(config: &WatchConfig) -> Result<Box<dyn FrameSource>> {
    match config.capture_mode() {
        CaptureMode::Production => desktop_source(),
        CaptureMode::Synthetic => {
            let mut source = SyntheticSource::new()
                .with_change_interval(config.capture.synthetic_change_interval);
            if let Some(seed) = config.capture.synthetic_seed {
                source = source.with_seed(seed);
            }
            Ok(Box::new(source))
        }
    }
}

#[cfg(feature = "desktop")]
fn desktop_source() -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(capture::DesktopSource::new()))
}

#[cfg(not(feature = "desktop"))]
fn desktop_source() -> Result<Box<dyn FrameSource>> {
    Err(WatchError::Config(
        "production capture needs the `desktop` feature; rebuild with --features desktop"
            .to_string(),
    ))
}

/// Wire capturer, comparator, notifier and logger into a monitor.
pub fn build_monitor(config: &WatchConfig, notifier: Arc<dyn Notifier>) -> Result<ScreenMonitor> {
    config.validate()?;
    let logger = logger_for(config);

    let capturer = ScreenCapturer::new(frame_source(config)?, config.capture_region(), logger.clone());
    let comparator = ImageComparator::new(config.comparison).with_logger(logger.clone());

    tracing::info!(
        "Monitor configured: mode={}, region={}, interval={}ms",
        config.capture_mode(),
        config.capture_region(),
        config.monitor.interval_ms
    );

    Ok(ScreenMonitor::new(
        Box::new(capturer),
        Arc::new(comparator),
        notifier,
        logger,
        config.interval(),
    ))
}
