//! Frame fixtures shared by the unit tests

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

pub const WHITE: [u8; 4] = [255, 255, 255, 255];
pub const RED: [u8; 4] = [255, 0, 0, 255];

pub fn solid_image(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

/// `base` with a filled `size`×`size` block at (`x`, `y`)
pub fn with_block(mut base: RgbaImage, x: u32, y: u32, size: u32, color: [u8; 4]) -> RgbaImage {
    for py in y..(y + size).min(base.height()) {
        for px in x..(x + size).min(base.width()) {
            base.put_pixel(px, py, Rgba(color));
        }
    }
    base
}

pub fn encode_png(image: &DynamicImage) -> Bytes {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encoding a test image");
    Bytes::from(buf.into_inner())
}

pub fn png(image: RgbaImage) -> Bytes {
    encode_png(&DynamicImage::ImageRgba8(image))
}

/// A PNG cut off after its header: recognisable, but undecodable
pub fn truncated_png() -> Bytes {
    let full = png(solid_image(16, 16, RED));
    full.slice(..40)
}
