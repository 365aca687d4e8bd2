pub mod builder;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    algorithms::{Segmentation, effective_count},
    error::Result,
    traits::{BlobExtractor, ColonyAnalyzer, ColonyClassifier, FeatureComputer, ForegroundSegmenter},
    types::{AnalysisResult, BackgroundMode, CircleRegion, Colony, ColorToCount, RasterImage},
};

/// Per-call analysis inputs: region of interest and mode flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalysisOptions {
    pub region: Option<CircleRegion>,
    pub background_mode: BackgroundMode,
    pub color_to_count: ColorToCount,
    pub invert_detection: bool,
}

/// Tunable constants for the default stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    #[schemars(range(min = 1))]
    pub min_colony_size: usize,
    pub threshold_shift: u8,
    #[schemars(range(min = 0.0, max = 1.0))]
    pub nesting_size_ratio: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_colony_size: crate::algorithms::MIN_COLONY_SIZE,
            threshold_shift: 20,
            nesting_size_ratio: 0.5,
        }
    }
}

/// A colony analysis pipeline with swappable stages
pub struct Pipeline {
    segmenter: Box<dyn ForegroundSegmenter>,
    extractor: Box<dyn BlobExtractor>,
    feature_computer: Box<dyn FeatureComputer>,
    classifier: Box<dyn ColonyClassifier>,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(
        segmenter: Box<dyn ForegroundSegmenter>,
        extractor: Box<dyn BlobExtractor>,
        feature_computer: Box<dyn FeatureComputer>,
        classifier: Box<dyn ColonyClassifier>,
    ) -> Self {
        Self {
            segmenter,
            extractor,
            feature_computer,
            classifier,
        }
    }

    /// Run every stage over the raster
    pub fn analyze(&self, raster: &RasterImage, options: &AnalysisOptions) -> Result<AnalysisResult> {
        // Step 1: background decision and binarization
        let segmentation = self.segmenter.segment(raster, options)?;

        // Step 2: connected components in discovery order
        let blobs = self.extractor.extract_blobs(&segmentation.mask)?;

        // Step 3: measure and accept; ids are assigned here
        let mut colonies = self.feature_computer.extract_features(&blobs, raster)?;

        // Step 4: whole-set classification
        self.classifier.classify(&mut colonies)?;

        let result = assemble_result(raster, segmentation, colonies);
        info!(
            colonies = result.colonies.len(),
            effective_count = result.effective_count,
            avg_size = result.avg_size,
            "analysis complete"
        );
        Ok(result)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        builder::PipelineBuilder::new().build()
    }
}

impl ColonyAnalyzer for Pipeline {
    fn analyze(&self, raster: &RasterImage, options: &AnalysisOptions) -> Result<AnalysisResult> {
        Pipeline::analyze(self, raster, options)
    }
}

/// Aggregate classified colonies and the mask into the final result.
pub(crate) fn assemble_result(
    raster: &RasterImage,
    segmentation: Segmentation,
    colonies: Vec<Colony>,
) -> AnalysisResult {
    let avg_size = if colonies.is_empty() {
        0
    } else {
        let total: u64 = colonies.iter().map(|c| c.size_px as u64).sum();
        (total as f64 / colonies.len() as f64).round() as u32
    };
    let effective_count = effective_count(&colonies);

    AnalysisResult {
        mask: segmentation.mask,
        colonies,
        avg_size,
        effective_count,
        background: segmentation.background,
        count_dark: segmentation.count_dark,
        threshold: segmentation.threshold,
        image_width: raster.width(),
        image_height: raster.height(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Background, BinaryMask};

    #[test]
    fn test_assemble_empty() {
        let raster = RasterImage::new(2, 2, vec![0; 16]).unwrap();
        let segmentation = Segmentation {
            mask: BinaryMask::from_fn(2, 2, |_, _| false),
            background: Background::Light,
            count_dark: true,
            threshold: 0,
        };
        let result = assemble_result(&raster, segmentation, Vec::new());
        assert_eq!(result.avg_size, 0);
        assert_eq!(result.effective_count, 0);
        assert!(result.colonies.is_empty());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: AnalysisOptions =
            serde_json::from_str(r#"{"background_mode": "unsure", "invert_detection": true}"#)
                .expect("Should parse options");
        assert_eq!(options.background_mode, BackgroundMode::Auto);
        assert_eq!(options.color_to_count, ColorToCount::Auto);
        assert!(options.invert_detection);
        assert!(options.region.is_none());
    }
}
