//! Fake display for development and test runs
//!
//! Produces a solid white frame; every Nth frame carries a red square at a
//! random position so the monitor has something to detect.

use crate::capture::capture::{CaptureMode, FrameSource};
use crate::capture::region::ScreenDimensions;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const DEFAULT_DIMENSIONS: ScreenDimensions = ScreenDimensions::new(1920, 1080);
pub const DEFAULT_CHANGE_INTERVAL: u32 = 5;
pub const MARKER_SIZE: u32 = 100;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const MARKER: Rgba<u8> = Rgba([255, 0, 0, 255]);

pub struct SyntheticSource {
    dimensions: ScreenDimensions,
    change_interval: u32,
    calls: AtomicU64,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            change_interval: DEFAULT_CHANGE_INTERVAL,
            calls: AtomicU64::new(0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_dimensions(mut self, dimensions: ScreenDimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Every `interval`-th frame (counted from 1) carries the marker.
    pub fn with_change_interval(mut self, interval: u32) -> Self {
        self.change_interval = interval.max(1);
        self
    }

    /// Reproducible marker positions
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn dimensions(&self) -> ScreenDimensions {
        self.dimensions
    }

    /// Number of frames produced so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Top-left corner of the marker for the next marked frame.
    fn marker_origin(&self) -> (u32, u32) {
        let max_x = self.dimensions.width.saturating_sub(MARKER_SIZE);
        let max_y = self.dimensions.height.saturating_sub(MARKER_SIZE);
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        (rng.gen_range(0..=max_x), rng.gen_range(0..=max_y))
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one synthetic frame, optionally with the marker at `marker`.
pub fn render_frame(dimensions: ScreenDimensions, marker: Option<(u32, u32)>) -> RgbaImage {
    let mut frame = RgbaImage::from_pixel(dimensions.width, dimensions.height, BACKGROUND);

    if let Some((mx, my)) = marker {
        let x_end = (mx + MARKER_SIZE).min(dimensions.width);
        let y_end = (my + MARKER_SIZE).min(dimensions.height);
        for y in my..y_end {
            for x in mx..x_end {
                frame.put_pixel(x, y, MARKER);
            }
        }
    }

    frame
}

#[async_trait]
impl FrameSource for SyntheticSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Synthetic
    }

    async fn acquire(&self) -> Result<Bytes> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let marker = (call % self.change_interval as u64 == 0).then(|| self.marker_origin());
        let dimensions = self.dimensions;

        if marker.is_some() {
            tracing::debug!("Synthetic frame {} carries a change marker", call);
        }

        tokio::task::spawn_blocking(move || -> Result<Bytes> {
            let frame = render_frame(dimensions, marker);
            let mut buf = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(frame).write_to(&mut buf, ImageFormat::Png)?;
            Ok(Bytes::from(buf.into_inner()))
        })
        .await?
    }
}
