use crate::{
    algorithms::{RawBlob, Segmentation},
    error::Result,
    pipeline::AnalysisOptions,
    types::{AnalysisResult, BinaryMask, Colony, RasterImage},
};

/// Trait for background/foreground decision algorithms
pub trait ForegroundSegmenter: Send + Sync {
    /// Decide which pixels are colony candidates
    fn segment(&self, raster: &RasterImage, options: &AnalysisOptions) -> Result<Segmentation>;
}

/// Trait for connected-component extraction
pub trait BlobExtractor: Send + Sync {
    /// Split the mask into disjoint blobs, in discovery order
    fn extract_blobs(&self, mask: &BinaryMask) -> Result<Vec<RawBlob>>;
}

/// Trait for per-blob measurement and acceptance
pub trait FeatureComputer: Send + Sync {
    /// Measure blobs and keep the ones that qualify as colonies
    fn extract_features(&self, blobs: &[RawBlob], raster: &RasterImage) -> Result<Vec<Colony>>;
}

/// Trait for whole-set colony classification
pub trait ColonyClassifier: Send + Sync {
    /// Fill in nesting, size and shape fields in place
    fn classify(&self, colonies: &mut [Colony]) -> Result<()>;
}

/// Main trait for end-to-end colony analysis
pub trait ColonyAnalyzer: Send + Sync {
    /// Segment, extract, measure and classify colonies in a raster
    fn analyze(&self, raster: &RasterImage, options: &AnalysisOptions) -> Result<AnalysisResult>;
}
