pub mod threshold;
pub mod components;
pub mod features;
pub mod classify;

pub use threshold::*;
pub use components::*;
pub use features::*;
pub use classify::*;

use crate::{
    error::Result,
    pipeline::{AnalysisOptions, assemble_result},
    types::{AnalysisResult, RasterImage},
    traits::{ForegroundSegmenter, BlobExtractor, FeatureComputer, ColonyClassifier, ColonyAnalyzer},
};

/// Statically composed analyzer
#[derive(Debug)]
pub struct StandardColonyAnalyzer<S, E, F, C>
where
    S: ForegroundSegmenter,
    E: BlobExtractor,
    F: FeatureComputer,
    C: ColonyClassifier,
{
    pub segmenter: S,
    pub extractor: E,
    pub feature_computer: F,
    pub classifier: C,
}

impl<S, E, F, C> StandardColonyAnalyzer<S, E, F, C>
where
    S: ForegroundSegmenter,
    E: BlobExtractor,
    F: FeatureComputer,
    C: ColonyClassifier,
{
    pub fn new(segmenter: S, extractor: E, feature_computer: F, classifier: C) -> Self {
        Self {
            segmenter,
            extractor,
            feature_computer,
            classifier,
        }
    }
}

impl<S, E, F, C> ColonyAnalyzer for StandardColonyAnalyzer<S, E, F, C>
where
    S: ForegroundSegmenter,
    E: BlobExtractor,
    F: FeatureComputer,
    C: ColonyClassifier,
{
    fn analyze(&self, raster: &RasterImage, options: &AnalysisOptions) -> Result<AnalysisResult> {
        let segmentation = self.segmenter.segment(raster, options)?;
        let blobs = self.extractor.extract_blobs(&segmentation.mask)?;
        let mut colonies = self.feature_computer.extract_features(&blobs, raster)?;
        self.classifier.classify(&mut colonies)?;
        Ok(assemble_result(raster, segmentation, colonies))
    }
}
