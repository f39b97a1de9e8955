//! Decoding of captured buffers into a canonical RGBA layout

use crate::capture::region::validate_dimensions;
use crate::error::{Result, WatchError};
use crate::logging::MonitorLogger;
use crate::monitoring::retry::{retry_with, RetryError, RetryPolicy};
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageError, ImageFormat, RgbaImage};
use serde_json::json;
use std::sync::Arc;

/// Color space of every [`RawFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
}

/// Decoded frame: 8-bit sRGB with an alpha channel, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    image: RgbaImage,
}

impl RawFrame {
    pub const CHANNELS: u8 = 4;

    pub fn from_rgba(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        Self::CHANNELS
    }

    pub fn color_space(&self) -> ColorSpace {
        ColorSpace::Srgb
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Check that `buffer` is non-empty and in a recognisable image format.
pub fn validate_image_buffer(buffer: &[u8]) -> Result<ImageFormat> {
    if buffer.is_empty() {
        return Err(WatchError::InvalidImageBuffer("Empty buffer".to_string()));
    }

    image::guess_format(buffer).map_err(|e| {
        WatchError::InvalidImageBuffer(format!("Unable to determine image format: {}", e))
    })
}

/// Validate and fully decode an encoded frame.
///
/// A recognised format that fails to decode surfaces as the transient
/// [`WatchError::Decode`]. Formats this build cannot decode are an
/// [`WatchError::InvalidImageBuffer`].
pub fn decode_image(buffer: &[u8]) -> Result<DynamicImage> {
    let format = validate_image_buffer(buffer)?;
    let image = image::load_from_memory_with_format(buffer, format).map_err(|e| match e {
        ImageError::Unsupported(_) | ImageError::Limits(_) => {
            WatchError::InvalidImageBuffer(format!("Unsupported image: {}", e))
        }
        other => WatchError::Decode(other),
    })?;
    let (width, height) = image.dimensions();
    validate_dimensions(width as i64, height as i64)?;
    Ok(image)
}

/// One normalization attempt, run on the blocking pool by [`normalize_frame`].
pub fn decode_canonical(buffer: &[u8]) -> Result<RawFrame> {
    let image = decode_image(buffer)?;
    // to_rgba8 converts any source color type to 8-bit RGBA, filling alpha
    // with 255 when the source has none.
    Ok(RawFrame::from_rgba(image.to_rgba8()))
}

/// Decode `buffer` into a [`RawFrame`], retrying transient decode failures.
///
/// Before each retry the failing buffer is handed to the logger as a debug
/// artifact. Permanent problems (empty buffer, unknown format, bad
/// dimensions) are returned immediately.
pub async fn normalize_frame(
    buffer: Bytes,
    policy: &RetryPolicy,
    logger: &Arc<dyn MonitorLogger>,
) -> Result<RawFrame> {
    let max_attempts = policy.max_attempts;

    let result = retry_with(
        policy,
        |_attempt| {
            let buffer = buffer.clone();
            async move {
                tokio::task::spawn_blocking(move || decode_canonical(&buffer)).await?
            }
        },
        WatchError::is_transient,
        |attempt, err| {
            logger.save_debug_image(&format!("normalization-failed-{}", attempt), &buffer);
            logger.warn(
                &format!("Image normalization attempt {}/{} failed", attempt, max_attempts),
                &json!({
                    "error": err.to_string(),
                    "attempt": attempt,
                    "buffer_len": buffer.len(),
                }),
            );
        },
    )
    .await;

    match result {
        Ok(frame) => {
            logger.debug(
                "Image normalized",
                &json!({ "width": frame.width(), "height": frame.height() }),
            );
            Ok(frame)
        }
        Err(RetryError::Permanent(e)) => Err(e),
        Err(RetryError::Exhausted { attempts, last }) => Err(WatchError::NormalizationFailed {
            attempts,
            source: Box::new(last),
        }),
    }
}
