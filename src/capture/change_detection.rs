//! Screen change detection between two captured frames
//! Normalizes, resizes to a common size and counts perceptibly changed pixels

use crate::capture::normalize::{normalize_frame, RawFrame};
use crate::capture::pixel_diff::{diff_images, DiffOptions};
use crate::error::{Result, WatchError};
use crate::logging::{noop_logger, MonitorLogger};
use crate::monitoring::retry::RetryPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::sync::{Arc, RwLock};

/// Configuration for screen change detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Per-pixel matching threshold (0-1) - higher = less sensitive
    pub threshold: f64,
    /// Minimum number of changed pixels that counts as a change
    pub min_changed_pixels: u64,
    /// Leave anti-aliasing artifacts out of the count
    pub ignore_antialiasing: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            min_changed_pixels: 100,
            ignore_antialiasing: true,
        }
    }
}

impl ComparisonConfig {
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold)
    }
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(WatchError::Config(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )));
    }
    Ok(())
}

/// Change detection result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub has_changes: bool,
    pub diff_pixels: u64,
    pub diff_percentage: f64,
    pub total_pixels: u64,
}

impl ComparisonResult {
    /// Build a result from raw counts.
    ///
    /// The decision is an absolute pixel-count gate: a 4K frame needs the
    /// same number of changed pixels as a thumbnail.
    pub fn from_counts(diff_pixels: u64, total_pixels: u64, min_changed_pixels: u64) -> Self {
        let diff_percentage = if total_pixels > 0 {
            diff_pixels as f64 / total_pixels as f64 * 100.0
        } else {
            0.0
        };

        Self {
            has_changes: diff_pixels >= min_changed_pixels,
            diff_pixels,
            diff_percentage,
            total_pixels,
        }
    }

    /// Human-readable one-liner used in notifications
    pub fn summary(&self) -> String {
        format!(
            "Changes found: {} pixels ({:.2}%)",
            self.diff_pixels, self.diff_percentage
        )
    }
}

/// Compares a previous and a current encoded frame
#[async_trait]
pub trait FrameComparator: Send + Sync {
    async fn compare(&self, previous: &Bytes, current: &Bytes) -> Result<ComparisonResult>;
}

/// Pixel-level comparator with runtime-adjustable settings
pub struct ImageComparator {
    settings: RwLock<ComparisonConfig>,
    retry: RetryPolicy,
    logger: Arc<dyn MonitorLogger>,
}

impl ImageComparator {
    pub fn new(config: ComparisonConfig) -> Self {
        Self {
            settings: RwLock::new(config),
            retry: RetryPolicy::default(),
            logger: noop_logger(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn MonitorLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Retry policy used when normalizing frames
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get the current config
    pub fn config(&self) -> ComparisonConfig {
        match self.settings.read() {
            Ok(settings) => *settings,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut ComparisonConfig)) {
        let mut settings = match self.settings.write() {
            Ok(settings) => settings,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut settings);
    }

    pub fn set_threshold(&self, threshold: f64) -> Result<()> {
        validate_threshold(threshold)?;
        self.logger.debug(
            "Updating comparison threshold",
            &json!({ "previous": self.config().threshold, "new": threshold }),
        );
        self.update(|s| s.threshold = threshold);
        Ok(())
    }

    pub fn set_min_changed_pixels(&self, pixels: u64) {
        self.logger.debug(
            "Updating minimum changed pixels",
            &json!({ "previous": self.config().min_changed_pixels, "new": pixels }),
        );
        self.update(|s| s.min_changed_pixels = pixels);
    }

    pub fn set_ignore_antialiasing(&self, ignore: bool) {
        self.logger.debug(
            "Updating anti-aliasing policy",
            &json!({ "previous": self.config().ignore_antialiasing, "new": ignore }),
        );
        self.update(|s| s.ignore_antialiasing = ignore);
    }

    async fn compare_frames(&self, previous: &Bytes, current: &Bytes) -> Result<ComparisonResult> {
        let config = self.config();
        self.logger.debug("Starting image comparison", &json!({}));

        let (first, second) = tokio::try_join!(
            normalize_frame(previous.clone(), &self.retry, &self.logger),
            normalize_frame(current.clone(), &self.retry, &self.logger),
        )
        .map_err(|e| WatchError::ComparisonFailed(Box::new(e)))?;

        self.logger.debug(
            "Images normalized",
            &json!({
                "img1": format!("{}x{}", first.width(), first.height()),
                "img2": format!("{}x{}", second.width(), second.height()),
            }),
        );

        let debug = self.logger.debug_enabled();
        let options = DiffOptions {
            threshold: config.threshold,
            include_aa: !config.ignore_antialiasing,
            render_mask: debug,
        };

        let (width, height, diff) = tokio::task::spawn_blocking(move || {
            let width = first.width().max(second.width());
            let height = first.height().max(second.height());
            let a = resize_to(first, width, height);
            let b = resize_to(second, width, height);
            (width, height, diff_images(&a, &b, &options))
        })
        .await?;

        let total_pixels = width as u64 * height as u64;
        let result =
            ComparisonResult::from_counts(diff.diff_pixels, total_pixels, config.min_changed_pixels);

        let mut context = json!({
            "diff_pixels": result.diff_pixels,
            "diff_percentage": result.diff_percentage,
            "total_pixels": result.total_pixels,
            "aa_pixels": diff.aa_pixels,
            "dimensions": format!("{}x{}", width, height),
        });

        if let Some(mask) = diff.mask {
            self.logger.save_debug_image("img1", previous);
            self.logger.save_debug_image("img2", current);
            match encode_png(mask) {
                Ok(png) => {
                    if let Some(path) = self.logger.save_debug_image("diff", &png) {
                        context["debug_image"] = json!(path.display().to_string());
                    }
                }
                Err(e) => self
                    .logger
                    .warn("Could not encode diff mask", &json!({ "error": e.to_string() })),
            }
        }

        self.logger.debug("Comparison results", &context);
        Ok(result)
    }
}

impl Default for ImageComparator {
    fn default() -> Self {
        Self::new(ComparisonConfig::default())
    }
}

#[async_trait]
impl FrameComparator for ImageComparator {
    async fn compare(&self, previous: &Bytes, current: &Bytes) -> Result<ComparisonResult> {
        let result = self.compare_frames(previous, current).await;
        if let Err(e) = &result {
            self.logger.error(
                "Image comparison failed",
                &json!({ "error": e.to_string(), "kind": e.kind() }),
            );
        }
        result
    }
}

/// Stretch a frame to exactly `width`×`height` with a cubic filter.
fn resize_to(frame: RawFrame, width: u32, height: u32) -> RgbaImage {
    if frame.width() == width && frame.height() == height {
        return frame.into_image();
    }
    imageops::resize(frame.image(), width, height, FilterType::CatmullRom)
}

fn encode_png(image: RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
