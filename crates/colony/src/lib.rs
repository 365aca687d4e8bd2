//! # Colony Counting Library
//!
//! Segments bacterial colonies from a petri dish photo and measures them,
//! reads colorimetric biochemical test tubes, and scores candidate species
//! from the combined evidence.
//!
//! ## Core Features
//!
//! - **Trait-based Architecture**: every stage (segmenter, blob extractor,
//!   feature computer, classifier) is a trait with a default implementation
//! - **Pipeline System**: swap stages at runtime through [`PipelineBuilder`]
//! - **Nesting-aware counting**: colonies inside much larger colonies are
//!   tracked and counted in place of their container
//! - **Exports**: CSV colony tables, PNG masks, JSON and GeoJSON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colony::{BackgroundMode, ColorToCount, ImageSource, analyze_image};
//!
//! let source = ImageSource::Path("plate.jpg".into());
//! let result = analyze_image(&source, None, BackgroundMode::Auto, ColorToCount::Auto, false)?;
//! println!("{} colonies, effective count {}", result.colonies.len(), result.effective_count);
//! result.save_csv("colonies.csv")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Pipeline
//!
//! ```rust,no_run
//! use colony::{AnalysisOptions, CircleRegion, Pipeline, algorithms::*};
//!
//! let pipeline = Pipeline::builder()
//!     .set_segmenter(OtsuSegmenter { threshold_shift: 30 })
//!     .with_min_colony_size(25)
//!     .build();
//! let raster = colony::ImageSource::Path("plate.png".into()).load()?;
//! let options = AnalysisOptions {
//!     region: Some(CircleRegion::new(512.0, 512.0, 480.0)?),
//!     ..Default::default()
//! };
//! let result = pipeline.analyze(&raster, &options)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod source;
pub mod io;
pub mod tubes;
pub mod identify;
pub mod manager;

// Re-exports for convenience
pub use error::{ColonyError, Result};
pub use types::*;
pub use traits::*;
pub use algorithms::StandardColonyAnalyzer;
pub use pipeline::{AnalysisOptions, Pipeline, PipelineConfig, builder::PipelineBuilder};
pub use source::{ImageSource, analyze_image};
pub use io::export;
pub use tubes::{BiochemicalTest, Rgb, TestOutcome, classify_color, sample_center_color};
pub use identify::{BiochemicalTests, Candidate, Observations, TestPanel, identify, identify_from_panel};
pub use manager::{AnalysisCommand, AnalysisManager, CommandOutput};

/// Analyzer with the default stages, composed statically
pub type DefaultAnalyzer = StandardColonyAnalyzer<
    algorithms::OtsuSegmenter,
    algorithms::FloodFillExtractor,
    algorithms::ColonyFeatureComputer,
    algorithms::MedianColonyClassifier,
>;

impl Default for DefaultAnalyzer {
    fn default() -> Self {
        Self::new(
            algorithms::OtsuSegmenter::default(),
            algorithms::FloodFillExtractor,
            algorithms::ColonyFeatureComputer::default(),
            algorithms::MedianColonyClassifier::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn create_test_image() -> RasterImage {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([235, 225, 200, 255]));
        for y in 20..40 {
            for x in 20..40 {
                img.put_pixel(x, y, Rgba([90, 60, 40, 255]));
            }
        }
        for y in 60..66 {
            for x in 70..76 {
                img.put_pixel(x, y, Rgba([90, 60, 40, 255]));
            }
        }
        RasterImage::from_rgba(img)
    }

    #[test]
    fn test_pipeline_basic() {
        let pipeline = Pipeline::builder().build();
        let result = pipeline
            .analyze(&create_test_image(), &AnalysisOptions::default())
            .expect("Should process successfully");

        assert_eq!(result.colonies.len(), 2);
        assert_eq!(result.image_width, 100);
        assert_eq!(result.image_height, 100);
        assert_eq!(result.background, Background::Light);
        assert!(result.count_dark);
        assert_eq!(result.avg_size, (400 + 36) / 2);
    }

    #[test]
    fn test_static_and_dynamic_agree() {
        let raster = create_test_image();
        let options = AnalysisOptions::default();
        let dynamic = Pipeline::default().analyze(&raster, &options).expect("Should analyze");
        let fixed = DefaultAnalyzer::default().analyze(&raster, &options).expect("Should analyze");
        assert_eq!(dynamic.colonies, fixed.colonies);
        assert_eq!(dynamic.effective_count, fixed.effective_count);
    }

    #[test]
    fn test_region_excludes_outside_colonies() {
        let options = AnalysisOptions {
            region: Some(CircleRegion::new(30.0, 30.0, 20.0).expect("Should build region")),
            ..Default::default()
        };
        let result = Pipeline::default()
            .analyze(&create_test_image(), &options)
            .expect("Should analyze");
        assert_eq!(result.colonies.len(), 1);
        assert_eq!(result.colonies[0].size_px, 400);
    }

    #[test]
    fn test_manager_roundtrip() {
        let mut manager = AnalysisManager::new();
        manager.set_image(create_test_image());
        let output = manager
            .execute(AnalysisCommand::Analyze { options: AnalysisOptions::default() })
            .expect("Should analyze");
        assert!(matches!(output, CommandOutput::Analysis(ref r) if r.colonies.len() == 2));
    }
}
