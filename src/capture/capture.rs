//! Screen capture of the watched region
//! Acquires a full frame from a source, clamps the region and crops it to PNG

use crate::capture::normalize::{decode_image, validate_image_buffer};
use crate::capture::region::{adjust_region_to_screen, Region, ScreenDimensions};
use crate::error::{Result, WatchError};
use crate::logging::MonitorLogger;
use async_trait::async_trait;
use bytes::Bytes;
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// The real desktop
    Production,
    /// Generated frames, see [`crate::capture::synthetic`]
    Synthetic,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Production => write!(f, "production"),
            CaptureMode::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Supplier of full-screen encoded frames
#[async_trait]
pub trait FrameSource: Send + Sync {
    fn mode(&self) -> CaptureMode;

    /// Probe run once before monitoring starts.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn acquire(&self) -> Result<Bytes>;
}

/// What the monitor loop needs from a capturer
#[async_trait]
pub trait FrameCapture: Send + Sync {
    /// One-time setup check. A failure here is fatal for the monitor.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Capture the watched region as encoded PNG bytes.
    async fn capture_region(&self) -> Result<Bytes>;
}

/// Primary display captured through the `screenshots` crate
#[cfg(feature = "desktop")]
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopSource;

#[cfg(feature = "desktop")]
impl DesktopSource {
    pub fn new() -> Self {
        Self
    }

    fn primary_screen() -> Result<screenshots::Screen> {
        let screens = screenshots::Screen::all().map_err(|e| WatchError::Capture(e.to_string()))?;
        screens
            .first()
            .cloned()
            .ok_or_else(|| WatchError::Capture("No screens found".to_string()))
    }

    fn grab() -> Result<Bytes> {
        let shot = Self::primary_screen()?
            .capture()
            .map_err(|e| WatchError::Capture(e.to_string()))?;

        // screenshots links its own `image` version; go through raw RGBA.
        let (width, height) = shot.dimensions();
        let frame = RgbaImage::from_raw(width, height, shot.into_raw())
            .ok_or_else(|| WatchError::Capture("Screenshot buffer has the wrong size".to_string()))?;

        encode_png(frame)
    }
}

#[cfg(feature = "desktop")]
#[async_trait]
impl FrameSource for DesktopSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Production
    }

    async fn initialize(&self) -> Result<()> {
        let screen = tokio::task::spawn_blocking(Self::primary_screen).await??;
        tracing::info!(
            "Using display {} ({}x{})",
            screen.display_info.id,
            screen.display_info.width,
            screen.display_info.height
        );
        Ok(())
    }

    async fn acquire(&self) -> Result<Bytes> {
        tokio::task::spawn_blocking(Self::grab).await?
    }
}

/// Crops the watched region out of frames supplied by a [`FrameSource`]
pub struct ScreenCapturer {
    source: Box<dyn FrameSource>,
    region: Mutex<Region>,
    screen: OnceLock<ScreenDimensions>,
    captures: AtomicU64,
    logger: Arc<dyn MonitorLogger>,
}

impl ScreenCapturer {
    pub fn new(
        source: Box<dyn FrameSource>,
        region: Region,
        logger: Arc<dyn MonitorLogger>,
    ) -> Self {
        Self {
            source,
            region: Mutex::new(region),
            screen: OnceLock::new(),
            captures: AtomicU64::new(0),
            logger,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.source.mode()
    }

    /// The active region; reflects any clamping done so far.
    pub fn region(&self) -> Region {
        match self.region.lock() {
            Ok(region) => *region,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_region(&self, region: Region) {
        let mut current = match self.region.lock() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = region;
    }

    /// Dimensions of the first successfully decoded frame
    pub fn screen_dimensions(&self) -> Option<ScreenDimensions> {
        self.screen.get().copied()
    }

    /// Number of capture attempts so far
    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }

    async fn capture(&self) -> Result<Bytes> {
        let encoded = self.source.acquire().await?;

        let frame = tokio::task::spawn_blocking(move || decode_full_frame(&encoded)).await??;
        let frame_dims = ScreenDimensions::new(frame.width(), frame.height());

        let screen = *self.screen.get_or_init(|| {
            self.logger.info(
                "Screen dimensions recorded",
                &json!({ "width": frame_dims.width, "height": frame_dims.height }),
            );
            frame_dims
        });

        let requested = self.region();
        let adjustment = adjust_region_to_screen(requested, screen)?;
        if adjustment.was_adjusted {
            self.logger.warn(
                "Region adjusted to fit screen",
                &json!({
                    "original": requested.to_string(),
                    "adjusted": adjustment.region.to_string(),
                    "screen": screen.to_string(),
                }),
            );
            self.set_region(adjustment.region);
        }

        let region = adjustment.region;
        if !region.fits_within(frame_dims) {
            return Err(WatchError::RegionAdjustmentFailed {
                region,
                screen,
                frame: frame_dims,
            });
        }

        tokio::task::spawn_blocking(move || crop_to_png(frame, region)).await?
    }
}

#[async_trait]
impl FrameCapture for ScreenCapturer {
    async fn initialize(&self) -> Result<()> {
        self.source.initialize().await
    }

    async fn capture_region(&self) -> Result<Bytes> {
        let iteration = self.captures.fetch_add(1, Ordering::SeqCst) + 1;

        let result = self.capture().await;
        if let Err(e) = &result {
            self.logger.error(
                "Screen capture failed",
                &json!({
                    "error": e.to_string(),
                    "region": self.region().to_string(),
                    "screen_dimensions": self.screen_dimensions().map(|s| s.to_string()),
                    "mode": self.mode().to_string(),
                    "iteration": iteration,
                }),
            );
        }
        result
    }
}

/// Decode a full frame; any decoder rejection counts as an invalid buffer.
fn decode_full_frame(buffer: &[u8]) -> Result<RgbaImage> {
    validate_image_buffer(buffer)?;
    match decode_image(buffer) {
        Ok(image) => Ok(image.to_rgba8()),
        Err(WatchError::Decode(e)) => Err(WatchError::InvalidImageBuffer(format!(
            "Unable to decode frame: {}",
            e
        ))),
        Err(e) => Err(e),
    }
}

fn crop_to_png(frame: RgbaImage, region: Region) -> Result<Bytes> {
    // fits_within guarantees non-negative coordinates here
    let cropped = imageops::crop_imm(
        &frame,
        region.x as u32,
        region.y as u32,
        region.width as u32,
        region.height as u32,
    )
    .to_image();
    encode_png(cropped)
}

fn encode_png(frame: RgbaImage) -> Result<Bytes> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(frame).write_to(&mut buf, ImageFormat::Png)?;
    Ok(Bytes::from(buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::{png, solid_image, with_block, RED, WHITE};
    use crate::logging::{LogLevel, MemoryLogger};
    use std::collections::VecDeque;

    /// Hands out a fixed sequence of frames
    struct ScriptedSource {
        frames: Mutex<VecDeque<Result<Bytes>>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Result<Bytes>>) -> Box<Self> {
            Box::new(Self {
                frames: Mutex::new(frames.into()),
            })
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        fn mode(&self) -> CaptureMode {
            CaptureMode::Synthetic
        }

        async fn acquire(&self) -> Result<Bytes> {
            self.frames
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(WatchError::Capture("script exhausted".to_string())))
        }
    }

    fn decode(bytes: &Bytes) -> RgbaImage {
        image::load_from_memory(bytes).unwrap().to_rgba8()
    }

    #[tokio::test]
    async fn test_crops_requested_region() {
        let full = with_block(solid_image(200, 100, WHITE), 50, 20, 10, RED);
        let capturer = ScreenCapturer::new(
            ScriptedSource::new(vec![Ok(png(full))]),
            Region::new(50, 20, 30, 40),
            crate::logging::noop_logger(),
        );

        let bytes = capturer.capture_region().await.unwrap();
        let cropped = decode(&bytes);

        assert_eq!(cropped.dimensions(), (30, 40));
        assert_eq!(cropped.get_pixel(0, 0).0, RED);
        assert_eq!(cropped.get_pixel(29, 39).0, WHITE);
        assert_eq!(capturer.screen_dimensions(), Some(ScreenDimensions::new(200, 100)));
        assert_eq!(capturer.captures(), 1);
    }

    #[tokio::test]
    async fn test_oversized_region_is_clamped_and_kept() {
        let memory = Arc::new(MemoryLogger::new());
        let capturer = ScreenCapturer::new(
            ScriptedSource::new(vec![
                Ok(png(solid_image(200, 100, WHITE))),
                Ok(png(solid_image(200, 100, WHITE))),
            ]),
            Region::new(150, 80, 100, 100),
            memory.clone(),
        );

        let bytes = capturer.capture_region().await.unwrap();
        assert_eq!(decode(&bytes).dimensions(), (50, 20));
        assert_eq!(capturer.region(), Region::new(150, 80, 50, 20));

        capturer.capture_region().await.unwrap();
        let warnings = memory.entries_at(LogLevel::Warn);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Region adjusted to fit screen");
    }

    #[tokio::test]
    async fn test_shrunken_display_fails_region_check() {
        let memory = Arc::new(MemoryLogger::new());
        let capturer = ScreenCapturer::new(
            ScriptedSource::new(vec![
                Ok(png(solid_image(200, 100, WHITE))),
                Ok(png(solid_image(100, 50, WHITE))),
            ]),
            Region::new(120, 10, 50, 50),
            memory.clone(),
        );

        capturer.capture_region().await.unwrap();
        let err = capturer.capture_region().await.unwrap_err();
        assert!(matches!(err, WatchError::RegionAdjustmentFailed { .. }));

        // Dimensions stay at the first recorded size.
        assert_eq!(capturer.screen_dimensions(), Some(ScreenDimensions::new(200, 100)));

        let errors = memory.entries_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context["iteration"], 2);
        assert_eq!(errors[0].context["mode"], "synthetic");
    }

    #[tokio::test]
    async fn test_invalid_frames_are_rejected() {
        let capturer = ScreenCapturer::new(
            ScriptedSource::new(vec![
                Ok(Bytes::new()),
                Ok(crate::capture::testing::truncated_png()),
            ]),
            Region::new(0, 0, 10, 10),
            crate::logging::noop_logger(),
        );

        for _ in 0..2 {
            let err = capturer.capture_region().await.unwrap_err();
            assert!(matches!(err, WatchError::InvalidImageBuffer(_)), "{:?}", err);
        }
        assert_eq!(capturer.screen_dimensions(), None);
    }

    #[tokio::test]
    async fn test_set_region_replaces_active_region() {
        let capturer = ScreenCapturer::new(
            ScriptedSource::new(vec![Ok(png(solid_image(100, 100, WHITE)))]),
            Region::new(0, 0, 10, 10),
            crate::logging::noop_logger(),
        );

        capturer.set_region(Region::new(5, 5, 20, 30));
        let bytes = capturer.capture_region().await.unwrap();
        assert_eq!(decode(&bytes).dimensions(), (20, 30));
    }

    #[test]
    fn test_capture_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CaptureMode::Production).unwrap(),
            "\"production\""
        );
        assert_eq!(CaptureMode::Synthetic.to_string(), "synthetic");
    }
}
