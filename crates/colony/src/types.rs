use image::{Rgba, RgbaImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{ColonyError, Result};

/// Decoded RGBA raster. Immutable once built; every stage reads it by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    inner: RgbaImage,
}

impl RasterImage {
    /// Build a raster from a dense RGBA buffer (`width * height * 4` bytes).
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        RgbaImage::from_raw(width, height, data)
            .filter(|_| actual == expected)
            .map(|inner| Self { inner })
            .ok_or(ColonyError::InvalidRaster {
                width,
                height,
                expected,
                actual,
            })
    }

    pub fn from_rgba(image: RgbaImage) -> Self {
        Self { inner: image }
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// RGBA bytes in row-major order.
    pub fn as_raw(&self) -> &[u8] {
        self.inner.as_raw()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.inner
    }

    /// RGBA of the pixel at linear index `idx` (row-major).
    pub fn rgba_at(&self, idx: usize) -> [u8; 4] {
        let o = idx * 4;
        let raw = self.as_raw();
        [raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]
    }
}

/// Circular region of interest in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CircleRegion {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
}

impl CircleRegion {
    pub fn new(center_x: f64, center_y: f64, radius: f64) -> Result<Self> {
        let region = Self {
            center_x,
            center_y,
            radius,
        };
        region.validate()?;
        Ok(region)
    }

    /// The radius must be finite and strictly positive. The center may lie off-image.
    pub fn validate(&self) -> Result<()> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(ColonyError::invalid_parameter("radius", self.radius));
        }
        if !(self.center_x.is_finite() && self.center_y.is_finite()) {
            return Err(ColonyError::invalid_parameter(
                "center",
                format!("({}, {})", self.center_x, self.center_y),
            ));
        }
        Ok(())
    }

    /// Euclidean containment, boundary inclusive.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (x - self.center_x).hypot(y - self.center_y) <= self.radius
    }
}

/// One byte per pixel, 1 = foreground. Built once by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BinaryMask {
    pub(crate) fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    /// Build a mask from a predicate over pixel coordinates.
    pub fn from_fn(width: u32, height: u32, mut on: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(on(x, y) as u8);
            }
        }
        Self::from_vec(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn is_on(&self, idx: usize) -> bool {
        self.data[idx] == 1
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.is_on(y as usize * self.width as usize + x as usize)
    }

    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|&&v| v == 1).count()
    }

    /// Render as an opaque black/white image (white = foreground).
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let v = if self.get(x, y) { 255 } else { 0 };
            Rgba([v, v, v, 255])
        })
    }
}

/// How the plate background should be determined.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BackgroundMode {
    /// Sample the image and take the median brightness. `unsure` is the same thing.
    #[default]
    #[serde(alias = "unsure")]
    #[strum(to_string = "auto", serialize = "unsure")]
    Auto,
    Light,
    Dark,
}

/// Which luminance the colonies have relative to the threshold.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ColorToCount {
    /// Opposite of the background.
    #[default]
    Auto,
    Dark,
    Light,
}

#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Background {
    Dark,
    Light,
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
    PartialEq, Eq, Hash, PartialOrd, Ord
)]
pub enum SizeCategory {
    #[serde(rename = "Below Average")]
    #[strum(serialize = "Below Average")]
    BelowAverage,
    #[default]
    #[serde(rename = "Average")]
    #[strum(serialize = "Average")]
    Average,
    #[serde(rename = "Large (2x+)")]
    #[strum(serialize = "Large (2x+)")]
    Large2x,
    #[serde(rename = "Large (4x+)")]
    #[strum(serialize = "Large (4x+)")]
    Large4x,
}

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
    PartialEq, Eq, Hash
)]
pub enum ShapeType {
    #[default]
    Unknown,
    Round,
    Oval,
    #[serde(rename = "Irregular-Compact")]
    #[strum(serialize = "Irregular-Compact")]
    IrregularCompact,
    #[serde(rename = "Irregular-Sparse")]
    #[strum(serialize = "Irregular-Sparse")]
    IrregularSparse,
}

/// An accepted connected component with its measurements and classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Colony {
    /// 1-based, assigned in acceptance order
    pub id: u32,
    pub size_px: u32,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
    pub width: u32,
    pub height: u32,
    /// Isoperimetric ratio, clamped to [0, 1]
    pub circularity: f64,
    /// Fill ratio of the bounding box
    pub density: f64,
    pub color_r: u8,
    pub color_g: u8,
    pub color_b: u8,
    pub size_category: SizeCategory,
    pub shape_type: ShapeType,
    pub count_multiplier: u32,
    /// `Some(true)` once a containing colony claims this one. Never `Some(false)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_nested_in_parent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u32>,
}

impl Colony {
    pub fn is_nested(&self) -> bool {
        self.is_nested_in_parent == Some(true)
    }

    /// True if `other`'s bounding box lies within this colony's, edges inclusive.
    pub fn bbox_contains(&self, other: &Colony) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn color(&self) -> [u8; 3] {
        [self.color_r, self.color_g, self.color_b]
    }
}

/// Output of a full analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    #[serde(skip)]
    pub mask: BinaryMask,
    pub colonies: Vec<Colony>,
    /// Mean colony size in pixels, rounded; 0 without colonies
    pub avg_size: u32,
    pub effective_count: u32,
    pub background: Background,
    pub count_dark: bool,
    pub threshold: u8,
    pub image_width: u32,
    pub image_height: u32,
}

impl AnalysisResult {
    /// The binary mask as a renderable image, same dimensions as the input.
    pub fn mask_image(&self) -> RgbaImage {
        self.mask.to_rgba_image()
    }

    pub fn nested_count(&self) -> usize {
        self.colonies.iter().filter(|c| c.is_nested()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_raster_rejects_short_buffer() {
        let err = RasterImage::new(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, ColonyError::InvalidRaster { expected: 64, actual: 10, .. }));
    }

    #[test]
    fn test_raster_rgba_at() {
        let mut data = vec![0u8; 2 * 2 * 4];
        data[12..16].copy_from_slice(&[1, 2, 3, 4]);
        let raster = RasterImage::new(2, 2, data).expect("valid raster");
        assert_eq!(raster.rgba_at(3), [1, 2, 3, 4]);
        assert_eq!(raster.pixel_count(), 4);
    }

    #[test]
    fn test_circle_region_validation() {
        assert!(CircleRegion::new(10.0, 10.0, 0.0).is_err());
        assert!(CircleRegion::new(10.0, 10.0, -3.0).is_err());
        assert!(CircleRegion::new(10.0, 10.0, f64::NAN).is_err());
        // center outside the image is allowed
        let region = CircleRegion::new(-50.0, 1e4, 5.0).expect("valid region");
        assert!(region.contains(-50.0, 1e4 + 5.0));
        assert!(!region.contains(-50.0, 1e4 + 5.1));
    }

    #[test]
    fn test_unsure_is_auto() {
        assert_eq!(BackgroundMode::from_str("unsure").unwrap(), BackgroundMode::Auto);
        assert_eq!(BackgroundMode::from_str("auto").unwrap(), BackgroundMode::Auto);
        let parsed: BackgroundMode = serde_json::from_str("\"unsure\"").unwrap();
        assert_eq!(parsed, BackgroundMode::Auto);
        assert_eq!(BackgroundMode::Auto.to_string(), "auto");
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(SizeCategory::Large4x.to_string(), "Large (4x+)");
        assert_eq!(SizeCategory::BelowAverage.to_string(), "Below Average");
        assert_eq!(ShapeType::IrregularCompact.to_string(), "Irregular-Compact");
        assert_eq!(
            serde_json::to_string(&SizeCategory::Large2x).unwrap(),
            "\"Large (2x+)\""
        );
    }

    #[test]
    fn test_mask_render() {
        let mask = BinaryMask::from_fn(3, 1, |x, _| x == 1);
        let img = mask.to_rgba_image();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255, 255]);
        assert_eq!(mask.count_on(), 1);
    }
}
