//! Heuristic readers for tubes whose result is a texture or a hue family
//! rather than a single reference color.

use tracing::debug;

use super::{TestOutcome, center_patch, patch_pixels};
use crate::types::RasterImage;

/// Half-width of the sampled patch as a share of the shorter side.
pub const DETECTOR_PATCH_FRACTION: f64 = 0.2;
/// Only every n-th patch pixel is read.
pub const SAMPLE_STRIDE: usize = 3;
/// Pixels with alpha at or below this are skipped by the hue detectors.
pub const MIN_OPAQUE_ALPHA: u8 = 100;

fn sampled_pixels(raster: &RasterImage) -> impl Iterator<Item = [u8; 4]> + '_ {
    let patch = center_patch(raster, DETECTOR_PATCH_FRACTION);
    patch_pixels(raster, patch).step_by(SAMPLE_STRIDE)
}

fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

fn color_variation(r: u8, g: u8, b: u8) -> u32 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    ((r - g).abs() + (g - b).abs() + (r - b).abs()) as u32
}

fn outcome(positive: bool) -> TestOutcome {
    if positive {
        TestOutcome::Positive
    } else {
        TestOutcome::Negative
    }
}

/// Clear, bright liquid outnumbering dark or turbid samples reads positive.
pub fn detect_coagulase(raster: &RasterImage) -> TestOutcome {
    let (mut particles, mut clear) = (0usize, 0usize);
    for [r, g, b, _] in sampled_pixels(raster) {
        let lum = luminance(r, g, b);
        let variation = color_variation(r, g, b);
        if lum < 150.0 || variation > 60 {
            particles += 1;
        } else if lum > 200.0 && variation < 30 {
            clear += 1;
        }
    }
    debug!(particles, clear, "coagulase samples");
    outcome(clear > particles)
}

fn is_blue(r: u8, g: u8, b: u8) -> bool {
    b > r && b > g && b > 60 && b - r > 10 && b - g > 10
}

/// Positive when more than 15% of opaque samples are blue.
pub fn detect_citrate(raster: &RasterImage) -> TestOutcome {
    let (hits, total) = count_opaque(raster, is_blue);
    debug!(hits, total, "citrate samples");
    outcome(total > 0 && hits as f64 / total as f64 > 0.15)
}

fn is_purple(r: u8, g: u8, b: u8) -> bool {
    let lum = luminance(r, g, b);
    lum < 100.0 || (r > g && b > g && lum < 150.0)
}

/// Positive when more than 25% of opaque samples are purple or near black.
pub fn detect_oxidase(raster: &RasterImage) -> TestOutcome {
    let (hits, total) = count_opaque(raster, is_purple);
    debug!(hits, total, "oxidase samples");
    outcome(total > 0 && hits as f64 / total as f64 > 0.25)
}

fn count_opaque(raster: &RasterImage, hit: impl Fn(u8, u8, u8) -> bool) -> (usize, usize) {
    sampled_pixels(raster)
        .filter(|&[_, _, _, a]| a > MIN_OPAQUE_ALPHA)
        .fold((0, 0), |(hits, total), [r, g, b, _]| {
            (hits + hit(r, g, b) as usize, total + 1)
        })
}
