use std::path::PathBuf;

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::debug;

use crate::{
    error::{ColonyError, Result},
    pipeline::{AnalysisOptions, Pipeline},
    types::{AnalysisResult, BackgroundMode, CircleRegion, ColorToCount, RasterImage},
};

/// Where the pixels come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// An image file on disk
    Path(PathBuf),
    /// Encoded image bytes (PNG, JPEG, TIFF)
    Bytes(Vec<u8>),
    /// A `data:image/...;base64,` URL
    DataUrl(String),
    /// Already decoded pixels
    Raster(RasterImage),
}

impl ImageSource {
    /// Decode into an RGBA raster
    pub fn load(&self) -> Result<RasterImage> {
        match self {
            Self::Path(path) => {
                let img = image::open(path)?;
                debug!(path = %path.display(), "decoded image file");
                Ok(RasterImage::from_rgba(img.to_rgba8()))
            }
            Self::Bytes(bytes) => decode_bytes(bytes),
            Self::DataUrl(url) => decode_bytes(&decode_data_url(url)?),
            Self::Raster(raster) => Ok(raster.clone()),
        }
    }
}

impl From<RasterImage> for ImageSource {
    fn from(raster: RasterImage) -> Self {
        Self::Raster(raster)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

fn decode_bytes(bytes: &[u8]) -> Result<RasterImage> {
    let img = image::load_from_memory(bytes)?;
    Ok(RasterImage::from_rgba(img.to_rgba8()))
}

/// Extract the payload of a base64 data URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ColonyError::DataUrl("missing data: prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ColonyError::DataUrl("missing ',' separator".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(ColonyError::DataUrl(format!("unsupported encoding in '{header}'")));
    }
    Ok(STANDARD.decode(payload.trim())?)
}

/// Decode the source and run the default pipeline over it.
pub fn analyze_image(
    source: &ImageSource,
    region: Option<CircleRegion>,
    background_mode: BackgroundMode,
    color_to_count: ColorToCount,
    invert_detection: bool,
) -> Result<AnalysisResult> {
    if let Some(region) = &region {
        region.validate()?;
    }
    let raster = source.load()?;
    let options = AnalysisOptions {
        region,
        background_mode,
        color_to_count,
        invert_detection,
    };
    Pipeline::default().analyze(&raster, &options)
}
