//! Capture region geometry and clamping to the screen bounds

use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rectangle of the screen to watch, in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the region has a strictly positive area.
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Whether the region lies entirely inside `bounds`.
    pub fn fits_within(&self, bounds: ScreenDimensions) -> bool {
        self.has_area()
            && self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= bounds.width as i64
            && self.y as i64 + self.height as i64 <= bounds.height as i64
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Size of the captured display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenDimensions {
    pub width: u32,
    pub height: u32,
}

impl ScreenDimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ScreenDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Outcome of [`adjust_region_to_screen`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionAdjustment {
    pub region: Region,
    pub was_adjusted: bool,
}

/// Reject non-positive sizes.
pub fn validate_dimensions(width: i64, height: i64) -> Result<()> {
    if width <= 0 || height <= 0 {
        return Err(WatchError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Clamp `region` so it lies inside `screen`.
///
/// The origin is pulled onto the screen first, then width and height are
/// shrunk to what is left (never below one pixel). A screen with no area, or
/// a requested region with a non-positive size, is a configuration problem
/// and fails with [`WatchError::InvalidDimensions`].
pub fn adjust_region_to_screen(region: Region, screen: ScreenDimensions) -> Result<RegionAdjustment> {
    let screen_w = screen.width as i64;
    let screen_h = screen.height as i64;
    validate_dimensions(screen_w, screen_h)?;

    let mut x = region.x as i64;
    let mut y = region.y as i64;
    let mut width = region.width as i64;
    let mut height = region.height as i64;

    x = x.clamp(0, screen_w - 1);
    y = y.clamp(0, screen_h - 1);

    if x + width > screen_w {
        width = (screen_w - x).max(1);
    }
    if y + height > screen_h {
        height = (screen_h - y).max(1);
    }

    validate_dimensions(width, height)?;

    // Every value is bounded by the u32 screen size or the i32 input here.
    let adjusted = Region::new(x as i32, y as i32, width as i32, height as i32);

    Ok(RegionAdjustment {
        region: adjusted,
        was_adjusted: adjusted != region,
    })
}
