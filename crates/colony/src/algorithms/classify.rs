use tracing::debug;

use crate::{
    error::Result,
    traits::ColonyClassifier,
    types::{Colony, ShapeType, SizeCategory},
};

/// Median-relative size buckets, containment-based nesting and shape labels.
#[derive(Debug, Clone)]
pub struct MedianColonyClassifier {
    /// A contained colony must be smaller than this fraction of its container
    pub nesting_size_ratio: f64,
}

impl Default for MedianColonyClassifier {
    fn default() -> Self {
        Self {
            nesting_size_ratio: 0.5,
        }
    }
}

impl MedianColonyClassifier {
    pub fn apply(&self, colonies: &mut [Colony]) {
        let Some(median) = median_size(colonies) else {
            return;
        };

        mark_nested(colonies, self.nesting_size_ratio);
        for colony in colonies.iter_mut() {
            assign_size_category(colony, median);
            colony.shape_type = classify_shape(colony.circularity, colony.density);
        }

        debug!(
            median,
            colonies = colonies.len(),
            nested = colonies.iter().filter(|c| c.is_nested()).count(),
            "classified colonies"
        );
    }
}

impl ColonyClassifier for MedianColonyClassifier {
    fn classify(&self, colonies: &mut [Colony]) -> Result<()> {
        self.apply(colonies);
        Ok(())
    }
}

/// Classify with the default thresholds.
pub fn classify(colonies: &mut [Colony]) {
    MedianColonyClassifier::default().apply(colonies);
}

/// Upper median: element `n / 2` of the ascending sizes.
pub fn median_size(colonies: &[Colony]) -> Option<u32> {
    let mut sizes: Vec<u32> = colonies.iter().map(|c| c.size_px).collect();
    sizes.sort_unstable();
    sizes.get(sizes.len() / 2).copied()
}

/// Flag every colony whose bounding box sits inside a much larger colony's.
/// Pairs are visited container-major in slice order; the first container
/// to claim a colony keeps it.
pub fn mark_nested(colonies: &mut [Colony], size_ratio: f64) {
    for a in 0..colonies.len() {
        for b in 0..colonies.len() {
            if a == b || colonies[b].is_nested() {
                continue;
            }
            let (outer, inner) = (&colonies[a], &colonies[b]);
            let much_smaller = (inner.size_px as f64) < outer.size_px as f64 * size_ratio;
            if much_smaller && outer.bbox_contains(inner) {
                let parent = outer.id;
                colonies[b].is_nested_in_parent = Some(true);
                colonies[b].parent_id = Some(parent);
            }
        }
    }
}

/// Large buckets go only to top-level colonies; a nested colony keeps a
/// multiplier of 1 and gets the below-average/average label.
pub fn assign_size_category(colony: &mut Colony, median: u32) {
    let size = colony.size_px as u64;
    let median = median as u64;
    let top_level = colony.is_nested_in_parent.is_none();

    let (category, multiplier) = if top_level && size >= median * 4 {
        (SizeCategory::Large4x, 4)
    } else if top_level && size >= median * 2 {
        (SizeCategory::Large2x, 2)
    } else if size < median {
        (SizeCategory::BelowAverage, 1)
    } else {
        (SizeCategory::Average, 1)
    };
    colony.size_category = category;
    colony.count_multiplier = multiplier;
}

pub fn classify_shape(circularity: f64, density: f64) -> ShapeType {
    if circularity > 0.8 {
        ShapeType::Round
    } else if circularity > 0.6 {
        ShapeType::Oval
    } else if density > 0.8 {
        ShapeType::IrregularCompact
    } else {
        ShapeType::IrregularSparse
    }
}

/// Sum of multipliers over colonies that no other colony names as parent.
/// A colony with nested children is left out entirely; its children count.
pub fn effective_count(colonies: &[Colony]) -> u32 {
    colonies
        .iter()
        .filter(|col| !colonies.iter().any(|c| c.parent_id == Some(col.id)))
        .map(|col| col.count_multiplier)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::features::BlobFeatures;

    /// A square-ish colony at `(x, y)` with side `side` and pixel count `size`.
    fn colony(id: u32, x: u32, y: u32, side: u32, size: u32) -> Colony {
        BlobFeatures {
            size,
            centroid_x: x as f64 + side as f64 / 2.0,
            centroid_y: y as f64 + side as f64 / 2.0,
            min_x: x,
            max_x: x + side - 1,
            min_y: y,
            max_y: y + side - 1,
            width: side,
            height: side,
            perimeter: 4 * side as u64,
            circularity: 0.785,
            density: size as f64 / (side * side) as f64,
            color: [0, 0, 0],
        }
        .into_colony(id)
    }

    #[test]
    fn test_upper_median() {
        let cols: Vec<Colony> = [10, 40, 20, 30]
            .iter()
            .enumerate()
            .map(|(i, &s)| colony(i as u32 + 1, i as u32 * 50, 0, 10, s))
            .collect();
        // sorted [10, 20, 30, 40], element 2
        assert_eq!(median_size(&cols), Some(30));
        assert_eq!(median_size(&[]), None);
    }

    #[test]
    fn test_size_buckets() {
        let mut cols: Vec<Colony> = [50, 50, 50, 50, 400]
            .iter()
            .enumerate()
            .map(|(i, &s)| colony(i as u32 + 1, i as u32 * 100, 0, 25, s))
            .collect();
        classify(&mut cols);

        for c in &cols[..4] {
            assert_eq!(c.count_multiplier, 1);
            assert_eq!(c.size_category, SizeCategory::Average);
        }
        assert_eq!(cols[4].count_multiplier, 4);
        assert_eq!(cols[4].size_category, SizeCategory::Large4x);
        assert_eq!(effective_count(&cols), 8);
    }

    #[test]
    fn test_two_x_and_below_average() {
        let mut cols: Vec<Colony> = [20, 50, 50, 100, 150]
            .iter()
            .enumerate()
            .map(|(i, &s)| colony(i as u32 + 1, i as u32 * 100, 0, 20, s))
            .collect();
        classify(&mut cols);
        let cats: Vec<_> = cols.iter().map(|c| (c.size_category, c.count_multiplier)).collect();
        assert_eq!(
            cats,
            vec![
                (SizeCategory::BelowAverage, 1),
                (SizeCategory::Average, 1),
                (SizeCategory::Average, 1),
                (SizeCategory::Large2x, 2),
                (SizeCategory::Large2x, 2),
            ]
        );
    }

    #[test]
    fn test_nesting_scenario() {
        let mut cols = vec![
            colony(1, 10, 10, 40, 1600),
            colony(2, 25, 25, 10, 100),
        ];
        classify(&mut cols);

        assert_eq!(cols[1].is_nested_in_parent, Some(true));
        assert_eq!(cols[1].parent_id, Some(1));
        assert_eq!(cols[0].is_nested_in_parent, None);
        assert_eq!(cols[0].parent_id, None);
        // nested and under the upper median (1600): below average, never doubled
        assert_eq!(cols[1].size_category, SizeCategory::BelowAverage);
        assert_eq!(cols[1].count_multiplier, 1);
        // the parent is excluded, the child counts once; equal to the parent's multiplier
        assert_eq!(effective_count(&cols), 1);
        assert_eq!(effective_count(&cols), cols[0].count_multiplier);
    }

    #[test]
    fn test_nested_colony_never_gets_large_bucket() {
        // 16 small colonies keep the median low; the nested one is large
        // relative to it but stays at multiplier 1
        let mut cols: Vec<Colony> = (0..16)
            .map(|i| colony(i + 1, 500 + i * 20, 500, 10, 20))
            .collect();
        cols.push(colony(17, 0, 0, 100, 9000));
        cols.push(colony(18, 10, 10, 20, 400));
        classify(&mut cols);

        let nested = &cols[17];
        assert!(nested.is_nested());
        assert_eq!(nested.parent_id, Some(17));
        assert_eq!(nested.count_multiplier, 1);
        assert_eq!(nested.size_category, SizeCategory::Average);

        let parent = &cols[16];
        assert_eq!(parent.count_multiplier, 4);
        // 16 singles + the nested child; the parent is excluded
        assert_eq!(effective_count(&cols), 17);
    }

    #[test]
    fn test_first_container_wins() {
        // 1 contains 2 contains 3; 3 is claimed by 1 first (outer loop order)
        let mut cols = vec![
            colony(1, 0, 0, 100, 8000),
            colony(2, 10, 10, 50, 2000),
            colony(3, 20, 20, 10, 90),
        ];
        mark_nested(&mut cols, 0.5);
        assert_eq!(cols[1].parent_id, Some(1));
        assert_eq!(cols[2].parent_id, Some(1));
        assert_eq!(cols[0].parent_id, None);
    }

    #[test]
    fn test_containment_requires_size_ratio() {
        let mut cols = vec![
            colony(1, 0, 0, 20, 300),
            colony(2, 5, 5, 10, 160),
        ];
        mark_nested(&mut cols, 0.5);
        assert!(cols.iter().all(|c| c.is_nested_in_parent.is_none()));
    }

    #[test]
    fn test_shape_labels() {
        assert_eq!(classify_shape(0.9, 0.1), ShapeType::Round);
        assert_eq!(classify_shape(0.7, 0.1), ShapeType::Oval);
        assert_eq!(classify_shape(0.8, 0.9), ShapeType::Oval);
        assert_eq!(classify_shape(0.5, 0.85), ShapeType::IrregularCompact);
        assert_eq!(classify_shape(0.5, 0.8), ShapeType::IrregularSparse);
    }

    #[test]
    fn test_empty_is_noop() {
        let mut cols: Vec<Colony> = Vec::new();
        classify(&mut cols);
        assert_eq!(effective_count(&cols), 0);
    }
}
