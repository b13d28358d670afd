use crate::{
    enums::TableKind,
    error::RoiError,
    roi::{PixelIndexRange, PixelSize, PyramidGeometry, RoiTable},
};

use tracing::{debug, warn};

/// Two ROIs whose pixel boxes share at least one voxel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlapPair {
    pub first: String,
    pub second: String,
}

/// Find every pair of rows of `table` whose boxes overlap in 3D.
///
/// Boxes are compared in full-resolution pixel indices. Pairs are listed in
/// row order, `first` always coming before `second` in the table. Boxes that
/// only touch are not reported.
pub fn find_overlaps(
    table: &RoiTable,
    pixel_size: PixelSize,
) -> Result<Vec<OverlapPair>, RoiError> {
    let geometry = PyramidGeometry::new(pixel_size, 1)?;
    let ranges = geometry.to_pixel_indices(table, 0)?;
    Ok(overlapping_pairs(&ranges)
        .into_iter()
        .map(|(i, j)| OverlapPair {
            first: table.rows()[i].id.clone(),
            second: table.rows()[j].id.clone(),
        })
        .collect())
}

/// Indices `(i, j)`, `i < j`, of all intersecting ranges
pub fn overlapping_pairs(ranges: &[PixelIndexRange]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, a) in ranges.iter().enumerate() {
        for (j, b) in ranges.iter().enumerate().skip(i + 1) {
            if a.intersects(b) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Collects bounding boxes batch by batch and re-checks the whole
/// collection for overlaps after every batch
#[derive(Debug, Clone)]
pub struct OverlapTracker {
    pixel_size: PixelSize,
    accumulated: RoiTable,
}

impl OverlapTracker {
    pub fn new(pixel_size: PixelSize, kind: TableKind) -> Self {
        Self {
            pixel_size,
            accumulated: RoiTable::empty(kind),
        }
    }

    /// Add `batch` and return all overlapping pairs of the accumulated set
    pub fn push_batch(&mut self, batch: &RoiTable) -> Result<Vec<OverlapPair>, RoiError> {
        self.accumulated = self.accumulated.concat(batch)?;
        let pairs = find_overlaps(&self.accumulated, self.pixel_size)?;
        if pairs.is_empty() {
            debug!("No overlaps among {} bounding boxes", self.accumulated.len());
        } else {
            warn!("{} bounding-box pairs overlap", pairs.len());
        }
        Ok(pairs)
    }

    pub fn accumulated(&self) -> &RoiTable {
        &self.accumulated
    }

    pub fn into_table(self) -> RoiTable {
        self.accumulated
    }
}
