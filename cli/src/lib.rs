use colony::{
    AnalysisOptions, AnalysisResult, BiochemicalTests, ImageSource, Observations, Pipeline,
    PipelineBuilder, PipelineConfig, RasterImage, TestPanel,
};
use image::{Rgba, RgbaImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    ColonyError(#[from] colony::ColonyError),
    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
    #[error(transparent)]
    AcquireError(#[from] tokio::sync::AcquireError),
    #[error("Batch config lists no plates")]
    NoPlates,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One plate photo in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Plate {
    pub name: String,
    pub path: String,
    /// Overrides the batch-wide options for this plate
    #[serde(default)]
    pub options: Option<AnalysisOptions>,
}

/// Batch configuration: every plate is analyzed with the same pipeline and
/// its outputs land under `output_dir/<name>.*`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BatchConfig {
    pub output_dir: String,
    #[serde(default)]
    pub options: AnalysisOptions,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub plates: Vec<Plate>,
}

/// Observations, bench results and an optional tube panel for `identify`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct IdentifyRequest {
    pub observations: Observations,
    pub tests: BiochemicalTests,
    pub panel: Option<TestPanel>,
}

fn from_file<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(toml::from_str(&fs::read_to_string(path)?)?),
        Some("json") => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        _ => Err(CliError::UnsupportedFileFormat),
    }
}

impl BatchConfig {
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let config: Self = from_file(path.as_ref())?;
        if config.plates.is_empty() {
            return Err(CliError::NoPlates);
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, CliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn options_for<'a>(&'a self, plate: &'a Plate) -> &'a AnalysisOptions {
        plate.options.as_ref().unwrap_or(&self.options)
    }
}

impl IdentifyRequest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        from_file(path.as_ref())
    }
}

const TOP_LEVEL_OUTLINE: Rgba<u8> = Rgba([255, 0, 0, 255]);
const NESTED_OUTLINE: Rgba<u8> = Rgba([255, 215, 0, 255]);

/// The plate photo with each accepted colony's bounding box outlined.
/// Nested colonies get a second color.
pub fn render_overlay(raster: &RasterImage, result: &AnalysisResult) -> RgbaImage {
    let mut canvas = raster.as_image().clone();
    for colony in &result.colonies {
        let rect = Rect::at(colony.min_x as i32, colony.min_y as i32).of_size(colony.width, colony.height);
        let color = if colony.is_nested() { NESTED_OUTLINE } else { TOP_LEVEL_OUTLINE };
        draw_hollow_rect_mut(&mut canvas, rect, color);
    }
    canvas
}

/// Files written for one analyzed plate.
#[derive(Debug, Clone, Serialize)]
pub struct PlateOutputs {
    pub mask: PathBuf,
    pub overlay: PathBuf,
    pub csv: PathBuf,
    pub json: PathBuf,
    pub geojson: PathBuf,
}

pub fn write_outputs(
    raster: &RasterImage,
    result: &AnalysisResult,
    output_dir: &Path,
    stem: &str,
) -> Result<PlateOutputs, CliError> {
    fs::create_dir_all(output_dir)?;
    let outputs = PlateOutputs {
        mask: output_dir.join(format!("{stem}_mask.png")),
        overlay: output_dir.join(format!("{stem}_overlay.png")),
        csv: output_dir.join(format!("{stem}.csv")),
        json: output_dir.join(format!("{stem}.json")),
        geojson: output_dir.join(format!("{stem}.geojson")),
    };

    result.save_mask_png(&outputs.mask)?;
    render_overlay(raster, result).save(&outputs.overlay)?;
    result.save_csv(&outputs.csv)?;
    result.save_json(&outputs.json)?;
    result.save_geojson(&outputs.geojson)?;
    Ok(outputs)
}

/// Plates analyzed at once by default: one per available core.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Outcome of one batch plate: its effective count, or why it failed.
#[derive(Debug)]
pub struct PlateReport {
    pub name: String,
    pub result: Result<u32, CliError>,
}

fn process_plate(
    pipeline: &Pipeline,
    plate: &Plate,
    options: &AnalysisOptions,
    output_dir: &Path,
) -> Result<u32, CliError> {
    let raster = ImageSource::Path(PathBuf::from(&plate.path)).load()?;
    let result = pipeline.analyze(&raster, options)?;
    write_outputs(&raster, &result, output_dir, &plate.name)?;
    Ok(result.effective_count)
}

/// Analyze every plate on the blocking pool with at most `max_in_flight`
/// rasters alive at once. Reports come back in config order; a failing
/// plate does not stop the others.
pub async fn run_batch(batch: &BatchConfig, max_in_flight: usize) -> Result<Vec<PlateReport>, CliError> {
    fs::create_dir_all(&batch.output_dir)?;
    let pipeline = Arc::new(PipelineBuilder::build_from_config(&batch.pipeline));
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let output_dir = PathBuf::from(&batch.output_dir);

    let mut handles = Vec::with_capacity(batch.plates.len());
    for plate in &batch.plates {
        // a permit is taken before the task exists and released when it ends
        let permit = Arc::clone(&permits).acquire_owned().await?;
        let pipeline = Arc::clone(&pipeline);
        let options = batch.options_for(plate).clone();
        let output_dir = output_dir.clone();
        let plate = plate.clone();
        debug!(plate = %plate.name, "queued");
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = process_plate(&pipeline, &plate, &options, &output_dir);
            PlateReport { name: plate.name, result }
        }));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await?);
    }
    Ok(reports)
}
