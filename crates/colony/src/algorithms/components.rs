use tracing::debug;

use crate::{error::Result, traits::BlobExtractor, types::BinaryMask};

/// A maximal 4-connected set of on pixels, before any acceptance filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlob {
    /// Position in row-major discovery order. Not the colony id.
    pub discovery_index: usize,
    /// Linear pixel indices; order is fill order and carries no meaning.
    pub pixels: Vec<usize>,
}

impl RawBlob {
    pub fn size(&self) -> usize {
        self.pixels.len()
    }

    /// Pixel coordinates for an image of the given width.
    pub fn coords(&self, width: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        let w = width as usize;
        self.pixels.iter().map(move |&p| ((p % w) as u32, (p / w) as u32))
    }
}

/// Iterative stack-based flood fill over 4-neighbors.
#[derive(Debug, Clone, Default)]
pub struct FloodFillExtractor;

impl BlobExtractor for FloodFillExtractor {
    fn extract_blobs(&self, mask: &BinaryMask) -> Result<Vec<RawBlob>> {
        let blobs = flood_fill_blobs(mask);
        debug!(blobs = blobs.len(), on_pixels = mask.count_on(), "extracted blobs");
        Ok(blobs)
    }
}

/// Label every on pixel exactly once. Seeds are taken in row-major order,
/// so blob order follows the first pixel of each blob in raster scan.
pub fn flood_fill_blobs(mask: &BinaryMask) -> Vec<RawBlob> {
    let width = mask.width() as usize;
    let height = mask.height() as usize;
    let mut visited = vec![false; width * height];
    let mut stack = Vec::new();
    let mut blobs = Vec::new();

    for seed in 0..width * height {
        if visited[seed] || !mask.is_on(seed) {
            continue;
        }

        let mut pixels = Vec::new();
        visited[seed] = true;
        stack.push(seed);

        while let Some(cur) = stack.pop() {
            pixels.push(cur);
            let (cx, cy) = (cur % width, cur / width);
            let neighbors = [
                (cx > 0).then(|| cur - 1),
                (cx + 1 < width).then(|| cur + 1),
                (cy > 0).then(|| cur - width),
                (cy + 1 < height).then(|| cur + width),
            ];
            for n in neighbors.into_iter().flatten() {
                if !visited[n] && mask.is_on(n) {
                    visited[n] = true;
                    stack.push(n);
                }
            }
        }

        blobs.push(RawBlob {
            discovery_index: blobs.len(),
            pixels,
        });
    }

    blobs
}
