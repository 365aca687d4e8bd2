use image::{GrayImage, Luma};
use tracing::debug;

use crate::{
    error::Result,
    pipeline::AnalysisOptions,
    traits::ForegroundSegmenter,
    types::{Background, BackgroundMode, BinaryMask, CircleRegion, ColorToCount, RasterImage},
};

/// Median brightness below this means a dark plate.
pub const BACKGROUND_SPLIT: f64 = 127.0;

/// Upper bound on whole-image background samples.
pub const MAX_BACKGROUND_SAMPLES: usize = 2500;

/// Result of the background/foreground decision.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub mask: BinaryMask,
    pub background: Background,
    pub count_dark: bool,
    /// Threshold actually applied, after the polarity shift
    pub threshold: u8,
}

/// Otsu-based segmenter. The Otsu level is moved by `threshold_shift`
/// toward the side not being counted, so the counted side grows.
///
/// Light colonies on grey agar (agar luma within `threshold_shift` of the
/// Otsu level) merge with the background at the default shift of 20; use a
/// smaller `threshold_shift` for such plates.
#[derive(Debug, Clone)]
pub struct OtsuSegmenter {
    pub threshold_shift: u8,
}

impl Default for OtsuSegmenter {
    fn default() -> Self {
        Self { threshold_shift: 20 }
    }
}

impl ForegroundSegmenter for OtsuSegmenter {
    fn segment(&self, raster: &RasterImage, options: &AnalysisOptions) -> Result<Segmentation> {
        let region = options.region.as_ref();
        if let Some(region) = region {
            region.validate()?;
        }

        let gray = grayscale(raster);
        let background = match options.background_mode {
            BackgroundMode::Auto => detect_background(raster, region),
            BackgroundMode::Light => Background::Light,
            BackgroundMode::Dark => Background::Dark,
        };
        let count_dark = resolve_polarity(background, options.color_to_count, options.invert_detection);

        let Some(otsu) = otsu_threshold(&histogram(&gray)) else {
            debug!(%background, count_dark, "single gray level, nothing to segment");
            return Ok(Segmentation {
                mask: BinaryMask::from_fn(raster.width(), raster.height(), |_, _| false),
                background,
                count_dark,
                threshold: 0,
            });
        };
        let threshold = shift_threshold(otsu, count_dark, self.threshold_shift);
        debug!(
            %background, count_dark, otsu, threshold,
            "segmenting {}x{} raster", raster.width(), raster.height()
        );

        let mask = binarize(&gray, threshold, count_dark, region);
        Ok(Segmentation {
            mask,
            background,
            count_dark,
            threshold,
        })
    }
}

/// Rec. 601 luma, rounded to the nearest integer.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8
}

pub fn grayscale(raster: &RasterImage) -> GrayImage {
    let rgba = raster.as_image();
    GrayImage::from_fn(raster.width(), raster.height(), |x, y| {
        let [r, g, b, _] = rgba.get_pixel(x, y).0;
        Luma([luma(r, g, b)])
    })
}

/// Decide whether the plate background is dark or light from the median
/// brightness of a strided sample. No samples means light.
pub fn detect_background(raster: &RasterImage, region: Option<&CircleRegion>) -> Background {
    let mut samples = background_samples(raster, region);
    if samples.is_empty() {
        return Background::Light;
    }
    samples.sort_by(f64::total_cmp);
    let median = samples[samples.len() / 2];
    debug!(samples = samples.len(), median, "background sample");

    if median < BACKGROUND_SPLIT {
        Background::Dark
    } else {
        Background::Light
    }
}

/// `(R+G+B)/3` brightness samples. Within a region the grid step is a
/// twentieth of the radius and only points inside the circle count;
/// otherwise linear pixel indices are walked with a stride that keeps the
/// count at or under [`MAX_BACKGROUND_SAMPLES`].
fn background_samples(raster: &RasterImage, region: Option<&CircleRegion>) -> Vec<f64> {
    let raw = raster.as_raw();
    let brightness = |idx: usize| {
        let o = idx * 4;
        (raw[o] as f64 + raw[o + 1] as f64 + raw[o + 2] as f64) / 3.0
    };

    let mut samples = Vec::new();
    match region {
        Some(circle) => {
            let (width, height) = (raster.width() as i64, raster.height() as i64);
            let r2 = circle.radius * circle.radius;
            let step = ((circle.radius / 20.0).floor() as usize).max(1);
            let y0 = ((circle.center_y - circle.radius).floor() as i64).max(0);
            let y1 = ((circle.center_y + circle.radius).floor() as i64).min(height - 1);
            let x0 = ((circle.center_x - circle.radius).floor() as i64).max(0);
            let x1 = ((circle.center_x + circle.radius).floor() as i64).min(width - 1);

            for y in (y0..=y1).step_by(step) {
                for x in (x0..=x1).step_by(step) {
                    let dx = x as f64 - circle.center_x;
                    let dy = y as f64 - circle.center_y;
                    if dx * dx + dy * dy <= r2 {
                        samples.push(brightness((y * width + x) as usize));
                    }
                }
            }
        }
        None => {
            let step = raster.pixel_count().div_ceil(MAX_BACKGROUND_SAMPLES).max(1);
            samples.extend((0..raster.pixel_count()).step_by(step).map(brightness));
        }
    }
    samples
}

/// Returns true when dark pixels are the ones being counted.
pub fn resolve_polarity(background: Background, color_to_count: ColorToCount, invert: bool) -> bool {
    let count_dark = match color_to_count {
        ColorToCount::Auto => background == Background::Light,
        ColorToCount::Dark => true,
        ColorToCount::Light => false,
    };
    count_dark != invert
}

pub fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for &v in gray.as_raw() {
        hist[v as usize] += 1;
    }
    hist
}

/// Otsu's level, reported as the first gray level of the upper class.
/// The split maximizing between-class variance is searched in ascending
/// order and the first maximum wins. `None` when fewer than two levels
/// are populated.
pub fn otsu_threshold(hist: &[u64; 256]) -> Option<u8> {
    let total: u64 = hist.iter().sum();
    let sum: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_b = 0.0;
    let mut weight_b = 0u64;
    let mut max_variance = 0.0;
    let mut split = None;

    for (t, &count) in hist.iter().enumerate() {
        weight_b += count;
        if weight_b == 0 {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0 {
            break;
        }

        sum_b += t as f64 * count as f64;
        let mean_b = sum_b / weight_b as f64;
        let mean_f = (sum - sum_b) / weight_f as f64;
        let variance = weight_b as f64 * weight_f as f64 * (mean_b - mean_f).powi(2);

        if variance > max_variance {
            max_variance = variance;
            split = Some(t);
        }
    }

    // the loop stops before the last populated level, so t + 1 <= 255
    split.map(|t| (t + 1) as u8)
}

/// Widen the counted side: up when counting dark, down when counting light.
/// Saturates at 0 and 255.
pub fn shift_threshold(otsu: u8, count_dark: bool, shift: u8) -> u8 {
    if count_dark {
        otsu.saturating_add(shift)
    } else {
        otsu.saturating_sub(shift)
    }
}

/// A pixel is on iff it is on the counted side of the threshold and,
/// when a region is given, within it.
pub fn binarize(
    gray: &GrayImage,
    threshold: u8,
    count_dark: bool,
    region: Option<&CircleRegion>,
) -> BinaryMask {
    BinaryMask::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        let on = if count_dark { v < threshold } else { v > threshold };
        on && region.is_none_or(|c| c.contains(x as f64, y as f64))
    })
}
