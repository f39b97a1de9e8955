//! Perceptual per-pixel difference between two equally sized RGBA buffers
//!
//! Colors are compared in YIQ space with the luminance/chrominance weights
//! of Kotsarenko & Ramos, "Measuring perceived color difference using YIQ
//! NTSC transmission color space in mobile applications" (2010). Pixels that
//! sit on a low-contrast edge in either image can be classified as
//! anti-aliasing and left out of the count.

use image::{Rgba, RgbaImage};

/// Largest possible YIQ delta (white vs. black)
const MAX_YIQ_DELTA: f64 = 35215.0;

const AA_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Opacity of unchanged pixels in the diff mask
const MASK_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffOptions {
    /// Matching threshold in [0, 1]; smaller is more sensitive
    pub threshold: f64,
    /// Count anti-aliased pixels as differences
    pub include_aa: bool,
    /// Render a mask highlighting differences
    pub render_mask: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            include_aa: false,
            render_mask: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffOutput {
    pub diff_pixels: u64,
    /// Pixels above threshold but classified as anti-aliasing
    pub aa_pixels: u64,
    /// Red for differences, yellow for anti-aliasing, faded original elsewhere
    pub mask: Option<RgbaImage>,
}

/// Count the pixels of `current` that differ perceptibly from `previous`.
///
/// Both images must have the same dimensions.
pub fn diff_images(previous: &RgbaImage, current: &RgbaImage, options: &DiffOptions) -> DiffOutput {
    assert_eq!(
        previous.dimensions(),
        current.dimensions(),
        "diff_images requires equally sized images"
    );

    let (width, height) = previous.dimensions();
    let mut mask = options
        .render_mask
        .then(|| RgbaImage::new(width, height));

    if previous.as_raw() == current.as_raw() {
        if let Some(mask) = mask.as_mut() {
            for (x, y, pixel) in previous.enumerate_pixels() {
                mask.put_pixel(x, y, faded(pixel));
            }
        }
        return DiffOutput {
            diff_pixels: 0,
            aa_pixels: 0,
            mask,
        };
    }

    let threshold = options.threshold.clamp(0.0, 1.0);
    let max_delta = MAX_YIQ_DELTA * threshold * threshold;
    let mut diff_pixels = 0;
    let mut aa_pixels = 0;

    for y in 0..height {
        for x in 0..width {
            let a = previous.get_pixel(x, y);
            let b = current.get_pixel(x, y);
            let delta = color_delta(a, b, false);

            let color = if delta.abs() > max_delta {
                if !options.include_aa
                    && (is_antialiased(previous, x, y, current)
                        || is_antialiased(current, x, y, previous))
                {
                    aa_pixels += 1;
                    AA_COLOR
                } else {
                    diff_pixels += 1;
                    DIFF_COLOR
                }
            } else {
                faded(a)
            };

            if let Some(mask) = mask.as_mut() {
                mask.put_pixel(x, y, color);
            }
        }
    }

    DiffOutput {
        diff_pixels,
        aa_pixels,
        mask,
    }
}

/// Squared YIQ distance between two pixels, signed by which one is brighter.
/// With `y_only`, just the luminance difference.
fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>, y_only: bool) -> f64 {
    if a == b {
        return 0.0;
    }

    let (r1, g1, b1) = blend_on_white(a);
    let (r2, g2, b2) = blend_on_white(b);

    let y1 = rgb_to_y(r1, g1, b1);
    let y2 = rgb_to_y(r2, g2, b2);
    let y = y1 - y2;

    if y_only {
        return y;
    }

    let i = rgb_to_i(r1, g1, b1) - rgb_to_i(r2, g2, b2);
    let q = rgb_to_q(r1, g1, b1) - rgb_to_q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;

    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

fn blend_on_white(pixel: &Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, a] = pixel.0;
    let (r, g, b) = (r as f64, g as f64, b as f64);
    if a == 255 {
        return (r, g, b);
    }
    let alpha = a as f64 / 255.0;
    let blend = |c: f64| 255.0 + (c - 255.0) * alpha;
    (blend(r), blend(g), blend(b))
}

fn rgb_to_y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb_to_i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb_to_q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

fn faded(pixel: &Rgba<u8>) -> Rgba<u8> {
    let (r, g, b) = blend_on_white(pixel);
    let value = 255.0 + (rgb_to_y(r, g, b) - 255.0) * MASK_ALPHA;
    let v = value.round().clamp(0.0, 255.0) as u8;
    Rgba([v, v, v, 255])
}

/// Inclusive 3×3 neighbourhood of (x, y), clipped to the image.
fn neighbourhood(x: u32, y: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    (
        x.saturating_sub(1),
        y.saturating_sub(1),
        (x + 1).min(width - 1),
        (y + 1).min(height - 1),
    )
}

/// Whether (x, y) in `image` looks like an anti-aliased edge pixel.
///
/// The pixel must have both a darker and a brighter neighbour, and at most
/// two neighbours identical to it; then the darkest or brightest neighbour
/// must sit inside a flat area in both images.
fn is_antialiased(image: &RgbaImage, x: u32, y: u32, other: &RgbaImage) -> bool {
    let (width, height) = image.dimensions();
    let (x0, y0, x2, y2) = neighbourhood(x, y, width, height);
    let center = image.get_pixel(x, y);

    let mut zeroes = u32::from(x == x0 || x == x2 || y == y0 || y == y2);
    let mut min = 0.0;
    let mut max = 0.0;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0, 0, 0, 0);

    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if nx == x && ny == y {
                continue;
            }

            let delta = color_delta(center, image.get_pixel(nx, ny), true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_x = nx;
                min_y = ny;
            } else if delta > max {
                max = delta;
                max_x = nx;
                max_y = ny;
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(image, min_x, min_y) && has_many_siblings(other, min_x, min_y))
        || (has_many_siblings(image, max_x, max_y) && has_many_siblings(other, max_x, max_y))
}

/// Whether (x, y) has more than two identical neighbours.
fn has_many_siblings(image: &RgbaImage, x: u32, y: u32) -> bool {
    let (width, height) = image.dimensions();
    let (x0, y0, x2, y2) = neighbourhood(x, y, width, height);
    let center = image.get_pixel(x, y);

    let mut zeroes = u32::from(x == x0 || x == x2 || y == y0 || y == y2);

    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if nx == x && ny == y {
                continue;
            }
            if image.get_pixel(nx, ny) == center {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::{solid_image, with_block, RED, WHITE};

    #[test]
    fn test_identical_images_have_no_difference() {
        let img = with_block(solid_image(40, 30, WHITE), 5, 5, 10, RED);
        for threshold in [0.0, 0.1, 1.0] {
            let out = diff_images(
                &img,
                &img.clone(),
                &DiffOptions {
                    threshold,
                    ..Default::default()
                },
            );
            assert_eq!(out.diff_pixels, 0);
        }
    }

    #[test]
    fn test_red_block_on_white_is_counted() {
        let before = solid_image(50, 50, WHITE);
        let after = with_block(before.clone(), 20, 20, 10, RED);

        let out = diff_images(&before, &after, &DiffOptions::default());
        assert_eq!(out.diff_pixels, 100);
        assert_eq!(out.aa_pixels, 0);
    }

    #[test]
    fn test_black_vs_white_is_near_max_delta() {
        let white = Rgba(WHITE);
        let black = Rgba([0, 0, 0, 255]);
        let delta = color_delta(&white, &black, false);
        // White is brighter, so the delta is negative.
        assert!(delta < 0.0);
        assert!(delta.abs() <= MAX_YIQ_DELTA);
        assert!(delta.abs() > 0.9 * MAX_YIQ_DELTA);
    }

    #[test]
    fn test_threshold_one_ignores_small_shift() {
        let before = solid_image(10, 10, [100, 100, 100, 255]);
        let after = solid_image(10, 10, [120, 120, 120, 255]);

        let strict = diff_images(
            &before,
            &after,
            &DiffOptions {
                threshold: 0.0,
                ..Default::default()
            },
        );
        let lenient = diff_images(
            &before,
            &after,
            &DiffOptions {
                threshold: 1.0,
                ..Default::default()
            },
        );

        assert_eq!(strict.diff_pixels, 100);
        assert_eq!(lenient.diff_pixels, 0);
    }

    #[test]
    fn test_antialiased_edge_is_suppressed() {
        // A hard black/white edge; the second image softens one edge pixel.
        let mut before = solid_image(9, 9, WHITE);
        for y in 0..9 {
            for x in 5..9 {
                before.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let mut after = before.clone();
        after.put_pixel(4, 4, Rgba([128, 128, 128, 255]));

        let ignored = diff_images(&before, &after, &DiffOptions::default());
        assert_eq!(ignored.diff_pixels, 0);
        assert_eq!(ignored.aa_pixels, 1);

        let counted = diff_images(
            &before,
            &after,
            &DiffOptions {
                include_aa: true,
                ..Default::default()
            },
        );
        assert_eq!(counted.diff_pixels, 1);
    }

    #[test]
    fn test_mask_marks_differences() {
        let before = solid_image(8, 8, WHITE);
        let after = with_block(before.clone(), 0, 0, 2, RED);

        let out = diff_images(
            &before,
            &after,
            &DiffOptions {
                render_mask: true,
                ..Default::default()
            },
        );

        let mask = out.mask.unwrap();
        assert_eq!(mask.dimensions(), (8, 8));
        assert_eq!(*mask.get_pixel(0, 0), DIFF_COLOR);
        assert_eq!(*mask.get_pixel(7, 7), Rgba([255, 255, 255, 255]));
    }
}
