use std::{fs::File, io::{Cursor, Write}, path::Path};

use image::ImageFormat;

use crate::{
    error::Result,
    types::{AnalysisResult, Colony},
};

pub const CSV_HEADERS: [&str; 13] = [
    "Colony ID",
    "Color RGB",
    "Size (px)",
    "Size Category",
    "Count Multiplier",
    "Is Nested",
    "Shape",
    "Circularity",
    "Density",
    "Centroid X",
    "Centroid Y",
    "Width",
    "Height",
];

/// One CSV record per colony, in the column order of [`CSV_HEADERS`].
fn csv_record(colony: &Colony) -> [String; 13] {
    let nested = match (colony.is_nested(), colony.parent_id) {
        (true, Some(parent)) => format!("Yes (Parent: {parent})"),
        _ => "No".to_string(),
    };
    [
        colony.id.to_string(),
        format!("{},{},{}", colony.color_r, colony.color_g, colony.color_b),
        colony.size_px.to_string(),
        colony.size_category.to_string(),
        colony.count_multiplier.max(1).to_string(),
        nested,
        colony.shape_type.to_string(),
        format!("{:.3}", colony.circularity),
        format!("{:.1}", colony.density * 100.0),
        format!("{:.1}", colony.centroid_x),
        format!("{:.1}", colony.centroid_y),
        colony.width.to_string(),
        colony.height.to_string(),
    ]
}

/// Write the colony table to any writer.
pub fn write_colonies_csv<W: Write>(colonies: &[Colony], writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    csv_writer.write_record(CSV_HEADERS)?;
    for colony in colonies {
        csv_writer.write_record(csv_record(colony))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Render the colony table as a CSV string.
pub fn colonies_to_csv(colonies: &[Colony]) -> Result<String> {
    let mut buffer = Vec::new();
    write_colonies_csv(colonies, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

impl AnalysisResult {
    pub fn to_csv(&self) -> Result<String> {
        colonies_to_csv(&self.colonies)
    }

    /// Save the colony table as CSV
    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        write_colonies_csv(&self.colonies, File::create(path)?)
    }

    /// PNG-encoded rendering of the binary mask
    pub fn mask_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.mask_image()
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    pub fn save_mask_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.mask_image().save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
