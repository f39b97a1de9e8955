//! Capture module - handles screen capture and change detection

#[allow(clippy::module_inception)]
pub mod capture;
pub mod change_detection;
pub mod normalize;
pub mod pixel_diff;
pub mod region;
pub mod synthetic;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
#[cfg(feature = "desktop")]
pub use capture::DesktopSource;
pub use capture::{CaptureMode, FrameCapture, FrameSource, ScreenCapturer};
pub use change_detection::{ComparisonConfig, ComparisonResult, FrameComparator, ImageComparator};
pub use normalize::{normalize_frame, RawFrame};
pub use region::{adjust_region_to_screen, Region, RegionAdjustment, ScreenDimensions};
pub use synthetic::SyntheticSource;
