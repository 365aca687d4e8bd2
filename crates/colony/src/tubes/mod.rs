//! Colorimetric tube reading: sample the middle of a tube photo and decide
//! which of two reference colors it is closer to.

pub mod detectors;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use crate::{
    error::{ColonyError, Result},
    types::RasterImage,
};

pub use detectors::{detect_citrate, detect_coagulase, detect_oxidase};

/// Share of the shorter image side used as the half-width of the sampled patch.
pub const CENTER_PATCH_FRACTION: f64 = 0.15;

/// Mean color with fractional channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA`; alpha is ignored.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => digits.to_string(),
            _ => return Err(ColonyError::invalid_parameter("hex color", hex)),
        };
        let channel = |range: std::ops::Range<usize>| {
            expanded
                .get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .map(f64::from)
                .ok_or_else(|| ColonyError::invalid_parameter("hex color", hex))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn distance(&self, other: &Rgb) -> f64 {
        ((self.r - other.r).powi(2) + (self.g - other.g).powi(2) + (self.b - other.b).powi(2)).sqrt()
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r as f64, g as f64, b as f64)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TestOutcome {
    Positive,
    Negative,
    #[default]
    Unknown,
}

/// Square patch centered on the image: `(x0, y0, width, height)`.
pub(crate) fn center_patch(raster: &RasterImage, fraction: f64) -> (u32, u32, u32, u32) {
    let (w, h) = (raster.width(), raster.height());
    let half = (w.min(h) as f64 * fraction).floor() as u32;
    let (cx, cy) = (w / 2, h / 2);
    let x0 = cx.saturating_sub(half);
    let y0 = cy.saturating_sub(half);
    (x0, y0, (w - x0).min(2 * half), (h - y0).min(2 * half))
}

/// Pixels of the patch in row-major order.
pub(crate) fn patch_pixels(
    raster: &RasterImage,
    (x0, y0, pw, ph): (u32, u32, u32, u32),
) -> impl Iterator<Item = [u8; 4]> + '_ {
    let image = raster.as_image();
    (y0..y0 + ph).flat_map(move |y| (x0..x0 + pw).map(move |x| image.get_pixel(x, y).0))
}

/// Mean RGB of the central patch. A patch too small to hold any pixel falls
/// back to the single center pixel.
pub fn sample_center_color(raster: &RasterImage) -> Result<Rgb> {
    if raster.pixel_count() == 0 {
        return Err(ColonyError::invalid_parameter(
            "image",
            format!("{}x{}", raster.width(), raster.height()),
        ));
    }

    let patch = center_patch(raster, CENTER_PATCH_FRACTION);
    let (mut sum, mut count) = ([0u64; 3], 0u64);
    for [r, g, b, _] in patch_pixels(raster, patch) {
        sum[0] += r as u64;
        sum[1] += g as u64;
        sum[2] += b as u64;
        count += 1;
    }

    if count == 0 {
        let [r, g, b, _] = raster
            .as_image()
            .get_pixel(raster.width() / 2, raster.height() / 2)
            .0;
        return Ok(Rgb::from([r, g, b]));
    }

    let n = count as f64;
    Ok(Rgb::new(sum[0] as f64 / n, sum[1] as f64 / n, sum[2] as f64 / n))
}

/// Nearest reference wins; a tie goes to positive.
pub fn classify_color(sample: &Rgb, positive: &Rgb, negative: &Rgb) -> TestOutcome {
    if sample.distance(positive) <= sample.distance(negative) {
        TestOutcome::Positive
    } else {
        TestOutcome::Negative
    }
}

/// The tube tests with a known reference palette.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BiochemicalTest {
    #[default]
    GramStain,
    Catalase,
    Oxidase,
    Coagulase,
    Indole,
    Citrate,
    Urease,
    LactoseFermentation,
}

impl BiochemicalTest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GramStain => "Gram Stain",
            Self::Catalase => "Catalase",
            Self::Oxidase => "Oxidase",
            Self::Coagulase => "Coagulase",
            Self::Indole => "Indole",
            Self::Citrate => "Citrate",
            Self::Urease => "Urease",
            Self::LactoseFermentation => "Lactose Fermentation",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Self::GramStain => "Gram",
            Self::Catalase => "CAT",
            Self::Oxidase => "OX",
            Self::Coagulase => "COA",
            Self::Indole => "IND",
            Self::Citrate => "CIT",
            Self::Urease => "URS",
            Self::LactoseFermentation => "LAC",
        }
    }

    /// `(positive, negative)` reference colors as hex strings
    pub fn reference_hex(&self) -> (&'static str, &'static str) {
        match self {
            Self::GramStain => ("#9370DB", "#FF6B6B"),
            Self::Catalase => ("#FFD93D", "#E8E8E8"),
            Self::Oxidase => ("#7B68EE", "#CCCCCC"),
            Self::Coagulase => ("#FF4757", "#F5F5F5"),
            Self::Indole => ("#E84393", "#F0F0F0"),
            Self::Citrate => ("#00D2D3", "#F5F5F5"),
            Self::Urease => ("#f2f568ff", "#FF9F1C"),
            Self::LactoseFermentation => ("#f2f568ff", "#FFB6C1"),
        }
    }

    pub fn reference_colors(&self) -> Result<(Rgb, Rgb)> {
        let (positive, negative) = self.reference_hex();
        Ok((Rgb::from_hex(positive)?, Rgb::from_hex(negative)?))
    }

    pub fn describe(&self, outcome: TestOutcome) -> &'static str {
        match (self, outcome) {
            (_, TestOutcome::Unknown) => "Not tested",
            (Self::GramStain, TestOutcome::Positive) => "Purple (Gram+)",
            (Self::GramStain, TestOutcome::Negative) => "Pink/Red (Gram-)",
            (Self::Catalase, TestOutcome::Positive) => "Bubbles (Positive)",
            (Self::Catalase, TestOutcome::Negative) => "No Bubbles (Negative)",
            (Self::Oxidase, TestOutcome::Positive) => "Purple/Black (Positive)",
            (Self::Oxidase, TestOutcome::Negative) => "Colorless (Negative)",
            (Self::Coagulase, TestOutcome::Positive) => "Clotted (Positive)",
            (Self::Coagulase, TestOutcome::Negative) => "Clear (Negative)",
            (Self::Indole, TestOutcome::Positive) => "Red Ring (Positive)",
            (Self::Indole, TestOutcome::Negative) => "No Color (Negative)",
            (Self::Citrate, TestOutcome::Positive) => "Blue/Green (Positive)",
            (Self::Citrate, TestOutcome::Negative) => "No Color (Negative)",
            (Self::Urease, TestOutcome::Positive) => "Yellow (Positive)",
            (Self::Urease, TestOutcome::Negative) => "Pink/Orange (Negative)",
            (Self::LactoseFermentation, TestOutcome::Positive) => "Yellow (Positive)",
            (Self::LactoseFermentation, TestOutcome::Negative) => "Red/Pink (Negative)",
        }
    }

    /// Read a tube photo by nearest reference color.
    pub fn classify(&self, raster: &RasterImage) -> Result<TestOutcome> {
        let (positive, negative) = self.reference_colors()?;
        let sample = sample_center_color(raster)?;
        let outcome = classify_color(&sample, &positive, &negative);
        debug!(test = %self, r = sample.r, g = sample.g, b = sample.b, %outcome, "classified tube");
        Ok(outcome)
    }

    /// Read a tube photo with the dedicated heuristic, where one exists.
    pub fn detect(&self, raster: &RasterImage) -> Option<TestOutcome> {
        match self {
            Self::Coagulase => Some(detect_coagulase(raster)),
            Self::Citrate => Some(detect_citrate(raster)),
            Self::Oxidase => Some(detect_oxidase(raster)),
            _ => None,
        }
    }
}
