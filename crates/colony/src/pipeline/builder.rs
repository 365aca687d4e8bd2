use crate::{
    algorithms::{ColonyFeatureComputer, FloodFillExtractor, MedianColonyClassifier, OtsuSegmenter},
    pipeline::{Pipeline, PipelineConfig},
    traits::{BlobExtractor, ColonyClassifier, FeatureComputer, ForegroundSegmenter},
};

/// Builder for creating analysis pipelines with a fluent API
pub struct PipelineBuilder {
    segmenter: Option<Box<dyn ForegroundSegmenter>>,
    extractor: Option<Box<dyn BlobExtractor>>,
    feature_computer: Option<Box<dyn FeatureComputer>>,
    classifier: Option<Box<dyn ColonyClassifier>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            segmenter: None,
            extractor: None,
            feature_computer: None,
            classifier: None,
        }
    }

    /// Set the segmenter (replaces any existing one)
    pub fn set_segmenter<S>(mut self, segmenter: S) -> Self
    where
        S: ForegroundSegmenter + 'static,
    {
        self.segmenter = Some(Box::new(segmenter));
        self
    }

    /// Set the blob extractor (replaces any existing one)
    pub fn set_extractor<E>(mut self, extractor: E) -> Self
    where
        E: BlobExtractor + 'static,
    {
        self.extractor = Some(Box::new(extractor));
        self
    }

    /// Set the feature computer (replaces any existing one)
    pub fn set_feature_computer<F>(mut self, feature_computer: F) -> Self
    where
        F: FeatureComputer + 'static,
    {
        self.feature_computer = Some(Box::new(feature_computer));
        self
    }

    /// Set the classifier (replaces any existing one)
    pub fn set_classifier<C>(mut self, classifier: C) -> Self
    where
        C: ColonyClassifier + 'static,
    {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Use the default feature computer with a different size floor
    pub fn with_min_colony_size(self, min_colony_size: usize) -> Self {
        self.set_feature_computer(ColonyFeatureComputer { min_colony_size })
    }

    /// Use the default segmenter with a different threshold shift
    pub fn with_threshold_shift(self, threshold_shift: u8) -> Self {
        self.set_segmenter(OtsuSegmenter { threshold_shift })
    }

    /// Use the default classifier with a different nesting ratio
    pub fn with_nesting_ratio(self, nesting_size_ratio: f64) -> Self {
        self.set_classifier(MedianColonyClassifier { nesting_size_ratio })
    }

    /// Apply every tunable in a config
    pub fn with_config(self, config: &PipelineConfig) -> Self {
        self.with_min_colony_size(config.min_colony_size)
            .with_threshold_shift(config.threshold_shift)
            .with_nesting_ratio(config.nesting_size_ratio)
    }

    /// Build the pipeline with default components if not specified
    pub fn build(self) -> Pipeline {
        let segmenter = self
            .segmenter
            .unwrap_or_else(|| Box::new(OtsuSegmenter::default()));
        let extractor = self.extractor.unwrap_or_else(|| Box::new(FloodFillExtractor));
        let feature_computer = self
            .feature_computer
            .unwrap_or_else(|| Box::new(ColonyFeatureComputer::default()));
        let classifier = self
            .classifier
            .unwrap_or_else(|| Box::new(MedianColonyClassifier::default()));

        Pipeline::new(segmenter, extractor, feature_computer, classifier)
    }

    /// Build a pipeline from a config file's tunables
    pub fn build_from_config(config: &PipelineConfig) -> Pipeline {
        Self::new().with_config(config).build()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pipeline::AnalysisOptions, types::RasterImage};

    fn dark_square_on_white(side: u32) -> RasterImage {
        let size = 40u32;
        let mut data = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let inside = (10..10 + side).contains(&x) && (10..10 + side).contains(&y);
                let v = if inside { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        RasterImage::new(size, size, data).unwrap()
    }

    #[test]
    fn test_default_pipeline_finds_square() {
        let pipeline = PipelineBuilder::new().build();
        let result = pipeline
            .analyze(&dark_square_on_white(5), &AnalysisOptions::default())
            .unwrap();
        assert_eq!(result.colonies.len(), 1);
        assert_eq!(result.colonies[0].size_px, 25);
    }

    #[test]
    fn test_min_size_override_rejects_blob() {
        let pipeline = PipelineBuilder::new().with_min_colony_size(26).build();
        let result = pipeline
            .analyze(&dark_square_on_white(5), &AnalysisOptions::default())
            .unwrap();
        assert!(result.colonies.is_empty());
        assert_eq!(result.avg_size, 0);
    }

    #[test]
    fn test_config_roundtrip_builds() {
        let config = PipelineConfig {
            min_colony_size: 4,
            ..Default::default()
        };
        let pipeline = PipelineBuilder::build_from_config(&config);
        let result = pipeline
            .analyze(&dark_square_on_white(2), &AnalysisOptions::default())
            .unwrap();
        assert_eq!(result.colonies.len(), 1);
    }
}
