//! Error types shared by the capture pipeline and the monitor loop

use crate::capture::region::{Region, ScreenDimensions};

/// Errors raised while capturing, normalizing or comparing frames
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Empty buffer or a buffer whose format cannot be determined
    #[error("Invalid image buffer: {0}")]
    InvalidImageBuffer(String),

    /// Non-positive or out-of-bounds geometry
    #[error("Invalid dimensions: {width}x{height}. Dimensions must be positive")]
    InvalidDimensions { width: i64, height: i64 },

    /// Decoder rejected a buffer whose format was recognised
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Image normalization failed after {attempts} attempts: {source}")]
    NormalizationFailed {
        attempts: u32,
        #[source]
        source: Box<WatchError>,
    },

    #[error("Image comparison failed: {0}")]
    ComparisonFailed(#[source] Box<WatchError>),

    /// The adjusted region still does not fit the captured frame
    #[error("Region {region} does not fit a {frame} frame (screen {screen})")]
    RegionAdjustmentFailed {
        region: Region,
        screen: ScreenDimensions,
        frame: ScreenDimensions,
    },

    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl WatchError {
    /// Whether another attempt at the same operation could succeed.
    /// Unsupported formats and decoder limits are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WatchError::Decode(image::ImageError::Decoding(_) | image::ImageError::IoError(_))
                | WatchError::Task(_)
        )
    }

    /// Short machine-readable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            WatchError::InvalidImageBuffer(_) => "invalid_image_buffer",
            WatchError::InvalidDimensions { .. } => "invalid_dimensions",
            WatchError::Decode(_) => "decode",
            WatchError::NormalizationFailed { .. } => "normalization_failed",
            WatchError::ComparisonFailed(_) => "comparison_failed",
            WatchError::RegionAdjustmentFailed { .. } => "region_adjustment_failed",
            WatchError::Capture(_) => "capture",
            WatchError::Config(_) => "config",
            WatchError::Io(_) => "io",
            WatchError::Task(_) => "task",
        }
    }
}

impl From<tokio::task::JoinError> for WatchError {
    fn from(err: tokio::task::JoinError) -> Self {
        WatchError::Task(err.to_string())
    }
}

pub type Result<T, E = WatchError> = std::result::Result<T, E>;
