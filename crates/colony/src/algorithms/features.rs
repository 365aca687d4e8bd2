use std::f64::consts::PI;

use tracing::debug;

use crate::{
    algorithms::RawBlob,
    error::Result,
    traits::FeatureComputer,
    types::{Colony, RasterImage, ShapeType, SizeCategory},
};

/// Blobs smaller than this are never colonies.
pub const MIN_COLONY_SIZE: usize = 10;

/// Measures blobs and accepts the ones that pass the size floor and the
/// thin-filament test. Ids are handed out only on acceptance.
#[derive(Debug, Clone)]
pub struct ColonyFeatureComputer {
    pub min_colony_size: usize,
}

impl Default for ColonyFeatureComputer {
    fn default() -> Self {
        Self {
            min_colony_size: MIN_COLONY_SIZE,
        }
    }
}

impl FeatureComputer for ColonyFeatureComputer {
    fn extract_features(&self, blobs: &[RawBlob], raster: &RasterImage) -> Result<Vec<Colony>> {
        let mut colonies: Vec<Colony> = Vec::new();
        let mut too_small = 0usize;
        let mut filaments = 0usize;

        for blob in blobs {
            if blob.size() < self.min_colony_size.max(1) {
                too_small += 1;
                continue;
            }
            let features = measure_blob(blob, raster);
            if features.is_thin_filament() {
                filaments += 1;
                continue;
            }
            let id = colonies.len() as u32 + 1;
            colonies.push(features.into_colony(id));
        }

        debug!(
            accepted = colonies.len(),
            too_small, filaments, "feature extraction done"
        );
        Ok(colonies)
    }
}

/// Geometry, shape and color of a single blob.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobFeatures {
    pub size: u32,
    pub centroid_x: f64,
    pub centroid_y: f64,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
    pub width: u32,
    pub height: u32,
    pub perimeter: u64,
    /// Unclamped isoperimetric ratio
    pub circularity: f64,
    pub density: f64,
    pub color: [u8; 3],
}

impl BlobFeatures {
    pub fn is_thin_filament(&self) -> bool {
        is_thin_filament(self.width, self.height, self.density, self.circularity)
    }

    /// Materialize a colony with classification fields left at their defaults.
    pub fn into_colony(self, id: u32) -> Colony {
        Colony {
            id,
            size_px: self.size,
            centroid_x: self.centroid_x,
            centroid_y: self.centroid_y,
            min_x: self.min_x,
            max_x: self.max_x,
            min_y: self.min_y,
            max_y: self.max_y,
            width: self.width,
            height: self.height,
            circularity: self.circularity.min(1.0),
            density: self.density,
            color_r: self.color[0],
            color_g: self.color[1],
            color_b: self.color[2],
            size_category: SizeCategory::Average,
            shape_type: ShapeType::Unknown,
            count_multiplier: 1,
            is_nested_in_parent: None,
            parent_id: None,
        }
    }
}

/// Measure a non-empty blob against the raster it came from.
pub fn measure_blob(blob: &RawBlob, raster: &RasterImage) -> BlobFeatures {
    let image_width = raster.width();
    let size = blob.size();

    let (mut sum_x, mut sum_y) = (0u64, 0u64);
    let mut sum_rgb = [0u64; 3];
    let (mut min_x, mut max_x) = (u32::MAX, 0u32);
    let (mut min_y, mut max_y) = (u32::MAX, 0u32);

    for (&idx, (x, y)) in blob.pixels.iter().zip(blob.coords(image_width)) {
        sum_x += x as u64;
        sum_y += y as u64;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
        let [r, g, b, _] = raster.rgba_at(idx);
        sum_rgb[0] += r as u64;
        sum_rgb[1] += g as u64;
        sum_rgb[2] += b as u64;
    }

    let width = max_x - min_x + 1;
    let height = max_y - min_y + 1;
    let density = size as f64 / (width as f64 * height as f64);
    let perimeter = boundary_perimeter(blob, image_width, (min_x, min_y, width, height));
    let channel_mean = |sum: u64| (sum as f64 / size as f64).round() as u8;

    BlobFeatures {
        size: size as u32,
        centroid_x: sum_x as f64 / size as f64,
        centroid_y: sum_y as f64 / size as f64,
        min_x,
        max_x,
        min_y,
        max_y,
        width,
        height,
        perimeter,
        circularity: circularity(size, perimeter),
        density,
        color: [
            channel_mean(sum_rgb[0]),
            channel_mean(sum_rgb[1]),
            channel_mean(sum_rgb[2]),
        ],
    }
}

/// Number of (pixel, 4-neighbor) pairs where the neighbor is not in the
/// blob. Neighbors off the image count as outside.
pub fn boundary_perimeter(blob: &RawBlob, image_width: u32, bbox: (u32, u32, u32, u32)) -> u64 {
    let (min_x, min_y, width, height) = bbox;
    let (bw, bh) = (width as i64, height as i64);
    let mut member = vec![false; width as usize * height as usize];
    let local = |x: i64, y: i64| (y * bw + x) as usize;

    for (x, y) in blob.coords(image_width) {
        member[local((x - min_x) as i64, (y - min_y) as i64)] = true;
    }

    let is_member = |x: i64, y: i64| x >= 0 && y >= 0 && x < bw && y < bh && member[local(x, y)];

    let mut perimeter = 0u64;
    for (x, y) in blob.coords(image_width) {
        let (lx, ly) = ((x - min_x) as i64, (y - min_y) as i64);
        for (nx, ny) in [(lx - 1, ly), (lx + 1, ly), (lx, ly - 1), (lx, ly + 1)] {
            if !is_member(nx, ny) {
                perimeter += 1;
            }
        }
    }
    perimeter
}

/// `4π·area / perimeter²`. A zero perimeter yields 0.
pub fn circularity(size: usize, perimeter: u64) -> f64 {
    if perimeter == 0 {
        return 0.0;
    }
    let p = perimeter as f64;
    4.0 * PI * size as f64 / (p * p)
}

/// Long, sparse or very narrow blobs are scratches and hairs, not colonies.
pub fn is_thin_filament(width: u32, height: u32, density: f64, circularity: f64) -> bool {
    let (long, short) = (width.max(height) as f64, width.min(height) as f64);
    let aspect_ratio = long / (short + 1.0);
    if aspect_ratio > 5.0 && (density < 0.3 || circularity < 0.2) {
        return true;
    }
    short < 3.0 && aspect_ratio > 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::flood_fill_blobs;
    use crate::types::BinaryMask;
    use image::{Rgba, RgbaImage};

    fn raster_with_rect(width: u32, height: u32, rect: (u32, u32, u32, u32), color: [u8; 3]) -> RasterImage {
        let (x0, y0, w, h) = rect;
        let img = RgbaImage::from_fn(width, height, |x, y| {
            if x >= x0 && x < x0 + w && y >= y0 && y < y0 + h {
                Rgba([color[0], color[1], color[2], 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        RasterImage::from_rgba(img)
    }

    fn blob_for_rect(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> RawBlob {
        let (x0, y0, w, h) = rect;
        let mask = BinaryMask::from_fn(width, height, |x, y| x >= x0 && x < x0 + w && y >= y0 && y < y0 + h);
        flood_fill_blobs(&mask).remove(0)
    }

    #[test]
    fn test_square_measurements() {
        let rect = (5, 6, 10, 10);
        let raster = raster_with_rect(30, 30, rect, [10, 20, 30]);
        let features = measure_blob(&blob_for_rect(30, 30, rect), &raster);

        assert_eq!(features.size, 100);
        assert_eq!((features.min_x, features.max_x), (5, 14));
        assert_eq!((features.min_y, features.max_y), (6, 15));
        assert_eq!((features.width, features.height), (10, 10));
        assert!((features.centroid_x - 9.5).abs() < 1e-9);
        assert!((features.centroid_y - 10.5).abs() < 1e-9);
        assert!((features.density - 1.0).abs() < 1e-9);
        assert_eq!(features.perimeter, 40);
        assert!((features.circularity - 4.0 * PI * 100.0 / 1600.0).abs() < 1e-9);
        assert_eq!(features.color, [10, 20, 30]);
    }

    #[test]
    fn test_perimeter_counts_image_edge() {
        // blob touching the left and top edges: off-image neighbors still count
        let rect = (0, 0, 4, 3);
        let raster = raster_with_rect(10, 10, rect, [0, 0, 0]);
        let features = measure_blob(&blob_for_rect(10, 10, rect), &raster);
        assert_eq!(features.perimeter, 2 * (4 + 3));
    }

    #[test]
    fn test_perimeter_does_not_wrap_rows() {
        // pixels at the right edge of one row and left edge of the next are
        // adjacent in memory but not in the image
        let mask = BinaryMask::from_fn(4, 2, |x, y| (x == 3 && y == 0) || (x == 0 && y == 1));
        let raster = raster_with_rect(4, 2, (0, 0, 4, 2), [0, 0, 0]);
        for blob in flood_fill_blobs(&mask) {
            assert_eq!(measure_blob(&blob, &raster).perimeter, 4);
        }
    }

    #[test]
    fn test_zero_perimeter_gives_zero_circularity() {
        assert_eq!(circularity(25, 0), 0.0);
        assert!(circularity(1, 4) > 0.0);
    }

    #[test]
    fn test_circularity_is_clamped_on_colony() {
        // 4π·12 / 12² ≈ 1.047
        let features = BlobFeatures {
            size: 12,
            centroid_x: 0.0,
            centroid_y: 0.0,
            min_x: 0,
            max_x: 3,
            min_y: 0,
            max_y: 3,
            width: 4,
            height: 4,
            perimeter: 12,
            circularity: circularity(12, 12),
            density: 0.75,
            color: [0, 0, 0],
        };
        assert!(features.circularity > 1.0);
        assert_eq!(features.into_colony(1).circularity, 1.0);
    }

    #[test]
    fn test_thin_filament_rules() {
        // long and sparse
        assert!(is_thin_filament(60, 10, 0.2, 0.5));
        // long and not round
        assert!(is_thin_filament(60, 10, 0.9, 0.1));
        // long but dense and round enough
        assert!(!is_thin_filament(60, 10, 0.9, 0.5));
        // narrow: min < 3 with ar > 3
        assert!(is_thin_filament(2, 12, 1.0, 0.9));
        assert!(!is_thin_filament(2, 8, 1.0, 0.9));
        // compact square
        assert!(!is_thin_filament(10, 10, 1.0, 0.78));
    }

    #[test]
    fn test_ids_assigned_on_acceptance() {
        // tiny blob first, then a filament, then two real colonies
        let mask = BinaryMask::from_fn(60, 60, |x, y| {
            (x < 2 && y < 2)
                || (y == 10 && (5..40).contains(&x))
                || ((5..15).contains(&x) && (20..30).contains(&y))
                || ((30..42).contains(&x) && (40..52).contains(&y))
        });
        let raster = raster_with_rect(60, 60, (0, 0, 60, 60), [0, 0, 0]);
        let blobs = flood_fill_blobs(&mask);
        assert_eq!(blobs.len(), 4);

        let colonies = ColonyFeatureComputer::default()
            .extract_features(&blobs, &raster)
            .expect("Should extract features");
        assert_eq!(colonies.len(), 2);
        assert_eq!(colonies[0].id, 1);
        assert_eq!(colonies[1].id, 2);
        assert_eq!(colonies[0].size_px, 100);
        assert_eq!(colonies[1].size_px, 144);
        assert!(colonies.iter().all(|c| c.shape_type == ShapeType::Unknown));
        assert!(colonies.iter().all(|c| c.size_category == SizeCategory::Average));
        assert!(colonies.iter().all(|c| c.count_multiplier == 1 && c.is_nested_in_parent.is_none()));
    }

    #[test]
    fn test_size_floor_is_inclusive() {
        let mask = BinaryMask::from_fn(20, 20, |x, y| (2..7).contains(&x) && (2..4).contains(&y));
        let raster = raster_with_rect(20, 20, (0, 0, 20, 20), [0, 0, 0]);
        let blobs = flood_fill_blobs(&mask);
        assert_eq!(blobs[0].size(), 10);
        let colonies = ColonyFeatureComputer::default()
            .extract_features(&blobs, &raster)
            .expect("Should extract features");
        assert_eq!(colonies.len(), 1);
    }
}
