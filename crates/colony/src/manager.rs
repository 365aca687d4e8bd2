use std::{path::Path, sync::Arc};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::info;

use crate::{
    error::{ColonyError, Result},
    pipeline::{AnalysisOptions, Pipeline, PipelineConfig, builder::PipelineBuilder},
    source::ImageSource,
    tubes::{BiochemicalTest, Rgb, TestOutcome, sample_center_color},
    types::{AnalysisResult, RasterImage},
};

#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisCommand {
    /// Segment, measure and classify colonies in the loaded plate photo
    #[serde(rename = "analyze")]
    Analyze {
        #[serde(default)]
        options: AnalysisOptions,
    },

    /// Analyze with a one-off pipeline configuration
    #[serde(rename = "analyze_with_config")]
    AnalyzeWithConfig {
        #[serde(default)]
        options: AnalysisOptions,
        #[serde(default)]
        config: PipelineConfig,
    },

    /// Read the loaded tube photo by nearest reference color
    #[serde(rename = "classify_tube")]
    ClassifyTube { test: BiochemicalTest },

    /// Read the loaded tube photo with the test's heuristic detector,
    /// falling back to the reference colors when it has none
    #[serde(rename = "detect_tube")]
    DetectTube { test: BiochemicalTest },
}

impl AnalysisCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisCommand)
    }

    /// Get a list of all available command names
    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Analyze { .. } => "Count and measure colonies on a plate photo",
            Self::AnalyzeWithConfig { .. } => "Count colonies with custom size floor, threshold shift and nesting ratio",
            Self::ClassifyTube { .. } => "Classify a tube photo against the test's positive and negative reference colors",
            Self::DetectTube { .. } => "Read a tube photo with a texture or hue heuristic",
        }
    }
}

/// How a tube outcome was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReadMethod {
    ReferenceColor,
    Heuristic,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutput {
    Analysis(AnalysisResult),
    Tube {
        test: BiochemicalTest,
        outcome: TestOutcome,
        method: ReadMethod,
        sample: Option<Rgb>,
    },
}

/// Holds one loaded photo and runs commands against it.
#[derive(Clone)]
pub struct AnalysisManager {
    raster: Option<RasterImage>,
    pipeline: Arc<Pipeline>,
}

impl AnalysisManager {
    pub fn new() -> Self {
        Self {
            raster: None,
            pipeline: Arc::new(Pipeline::default()),
        }
    }

    /// Create a new AnalysisManager with a custom pipeline
    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        Self {
            raster: None,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn load(&mut self, source: &ImageSource) -> Result<()> {
        let raster = source.load()?;
        info!(width = raster.width(), height = raster.height(), "image loaded");
        self.raster = Some(raster);
        Ok(())
    }

    /// Load an image from file
    pub fn load_image(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.load(&ImageSource::Path(path.as_ref().to_path_buf()))
    }

    /// Load an encoded image from memory
    pub fn load_image_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.load(&ImageSource::Bytes(bytes.to_vec()))
    }

    pub fn load_data_url(&mut self, url: &str) -> Result<()> {
        self.load(&ImageSource::DataUrl(url.to_string()))
    }

    /// Set the raster directly
    pub fn set_image(&mut self, raster: RasterImage) {
        self.raster = Some(raster);
    }

    pub fn image(&self) -> Option<&RasterImage> {
        self.raster.as_ref()
    }

    pub fn execute(&self, command: AnalysisCommand) -> Result<CommandOutput> {
        let raster = self.raster.as_ref().ok_or(ColonyError::NoImageLoaded)?;

        match command {
            AnalysisCommand::Analyze { options } => {
                Ok(CommandOutput::Analysis(self.pipeline.analyze(raster, &options)?))
            }
            AnalysisCommand::AnalyzeWithConfig { options, config } => {
                let pipeline = PipelineBuilder::build_from_config(&config);
                Ok(CommandOutput::Analysis(pipeline.analyze(raster, &options)?))
            }
            AnalysisCommand::ClassifyTube { test } => Ok(CommandOutput::Tube {
                test,
                outcome: test.classify(raster)?,
                method: ReadMethod::ReferenceColor,
                sample: Some(sample_center_color(raster)?),
            }),
            AnalysisCommand::DetectTube { test } => match test.detect(raster) {
                Some(outcome) => Ok(CommandOutput::Tube {
                    test,
                    outcome,
                    method: ReadMethod::Heuristic,
                    sample: None,
                }),
                None => self.execute(AnalysisCommand::ClassifyTube { test }),
            },
        }
    }
}

impl Default for AnalysisManager {
    fn default() -> Self {
        Self::new()
    }
}
