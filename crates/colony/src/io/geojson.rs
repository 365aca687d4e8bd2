use geo_types::{Polygon, Rect, coord};
use geojson::{Feature, FeatureCollection, Geometry, Value, feature::Id};

use crate::{
    error::{ColonyError, Result},
    types::{AnalysisResult, Colony},
};

/// Pixel-edge rectangle around a colony's bounding box.
pub fn colony_bbox_polygon(colony: &Colony) -> Polygon<f64> {
    Rect::new(
        coord! { x: colony.min_x as f64, y: colony.min_y as f64 },
        coord! { x: colony.max_x as f64 + 1.0, y: colony.max_y as f64 + 1.0 },
    )
    .to_polygon()
}

impl AnalysisResult {
    /// One polygon feature per colony, with the colony's fields as properties
    pub fn to_geojson(&self) -> Result<FeatureCollection> {
        let mut features = Vec::with_capacity(self.colonies.len());

        for colony in &self.colonies {
            let properties = match serde_json::to_value(colony)? {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            };

            features.push(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&colony_bbox_polygon(colony)))),
                id: Some(Id::Number(colony.id.into())),
                properties: Some(properties),
                foreign_members: None,
            });
        }

        // Image-level metadata rides on the collection
        let mut foreign_members = serde_json::Map::new();
        foreign_members.insert("image_width".to_string(), self.image_width.into());
        foreign_members.insert("image_height".to_string(), self.image_height.into());
        foreign_members.insert("colony_count".to_string(), self.colonies.len().into());
        foreign_members.insert("effective_count".to_string(), self.effective_count.into());
        foreign_members.insert("avg_size".to_string(), self.avg_size.into());

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        })
    }

    pub fn to_geojson_string(&self) -> Result<String> {
        let geojson = self.to_geojson()?;
        Ok(serde_json::to_string_pretty(&geojson)?)
    }

    pub fn save_geojson(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        std::fs::write(path, self.to_geojson_string()?)?;
        Ok(())
    }
}

/// Read colonies back from a collection written by [`AnalysisResult::to_geojson`].
pub fn colonies_from_geojson_str(geojson_str: &str) -> Result<Vec<Colony>> {
    let collection: FeatureCollection = geojson_str.parse()?;
    collection
        .features
        .into_iter()
        .map(|feature| {
            let properties = feature
                .properties
                .ok_or_else(|| ColonyError::invalid_parameter("properties", "missing on feature"))?;
            Ok(serde_json::from_value(serde_json::Value::Object(properties))?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::{AnalysisOptions, Pipeline},
        types::RasterImage,
    };

    fn create_test_result() -> AnalysisResult {
        let raster = RasterImage::from_rgba(image::RgbaImage::from_fn(40, 40, |x, y| {
            let inside = (5..15).contains(&x) && (20..28).contains(&y);
            if inside {
                image::Rgba([10, 10, 10, 255])
            } else {
                image::Rgba([250, 250, 250, 255])
            }
        }));
        Pipeline::default()
            .analyze(&raster, &AnalysisOptions::default())
            .expect("Should analyze")
    }

    #[test]
    fn test_geojson_export() {
        let result = create_test_result();
        let geojson = result.to_geojson().expect("Should create GeoJSON");
        assert_eq!(geojson.features.len(), 1);

        let geometry = geojson.features[0].geometry.as_ref().expect("Should have geometry");
        let Value::Polygon(rings) = &geometry.value else {
            panic!("expected a polygon");
        };
        let xs: Vec<f64> = rings[0].iter().map(|p| p[0]).collect();
        let ys: Vec<f64> = rings[0].iter().map(|p| p[1]).collect();
        assert_eq!(xs.iter().cloned().fold(f64::MAX, f64::min), 5.0);
        assert_eq!(xs.iter().cloned().fold(f64::MIN, f64::max), 15.0);
        assert_eq!(ys.iter().cloned().fold(f64::MAX, f64::min), 20.0);
        assert_eq!(ys.iter().cloned().fold(f64::MIN, f64::max), 28.0);

        let members = geojson.foreign_members.as_ref().expect("Should carry metadata");
        assert_eq!(members["image_width"], 40);
        assert_eq!(members["effective_count"], 1);
    }

    #[test]
    fn test_geojson_colonies_read_back() {
        let result = create_test_result();
        let text = result.to_geojson_string().expect("Should serialize");
        let colonies = colonies_from_geojson_str(&text).expect("Should parse colonies");
        assert_eq!(colonies.len(), result.colonies.len());
        assert_eq!(colonies[0].id, result.colonies[0].id);
        assert_eq!(colonies[0].size_px, 80);
        assert_eq!(colonies[0].size_category, result.colonies[0].size_category);
        assert_eq!((colonies[0].width, colonies[0].height), (10, 8));
    }
}
