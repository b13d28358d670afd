use crate::{
    enums::TableKind,
    error::ConfigError,
    roi::{PhysicalRoi, PixelSize, RoiTable},
};

use ndarray::{ArrayView3, Axis};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Inclusive voxel bounds of one label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VoxelBounds {
    min: [usize; 3],
    max: [usize; 3],
}

impl VoxelBounds {
    fn at(voxel: [usize; 3]) -> Self {
        Self {
            min: voxel,
            max: voxel,
        }
    }

    fn include(&mut self, voxel: [usize; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(voxel[axis]);
            self.max[axis] = self.max[axis].max(voxel[axis]);
        }
    }

    fn merge(&mut self, other: &VoxelBounds) {
        self.include(other.min);
        self.include(other.max);
    }
}

pub struct BoundingBoxExtractor;

impl BoundingBoxExtractor {
    /// Build one bounding-box ROI per distinct positive value of `labels`.
    ///
    /// Rows are sorted by label, named after it and carry it in
    /// [`PhysicalRoi::label`]. Positions are `min_index * pixel_size`, shifted
    /// by `origin_shift_zyx` pixels; lengths cover up to `max_index + 1` and do
    /// not depend on the shift. An array without positive labels gives an
    /// empty table.
    ///
    /// # Arguments
    ///
    /// * `labels` - Label array (ZYX), `0` is background
    /// * `pixel_size` - Physical pixel size of `labels`
    /// * `origin_shift_zyx` - Offset of `labels` within the full array, in pixels
    pub fn extract(
        labels: ArrayView3<'_, u32>,
        pixel_size: PixelSize,
        origin_shift_zyx: [usize; 3],
    ) -> Result<RoiTable, ConfigError> {
        let bounds = Self::label_bounds(labels);
        let size = pixel_size.zyx();

        let rows = bounds
            .into_iter()
            .map(|(label, bounds)| {
                let mut position = [0.0; 3];
                let mut length = [0.0; 3];
                for axis in 0..3 {
                    let min = bounds.min[axis] as f64 * size[axis];
                    let max = (bounds.max[axis] + 1) as f64 * size[axis];
                    length[axis] = max - min;
                    position[axis] = min + origin_shift_zyx[axis] as f64 * size[axis];
                }
                PhysicalRoi::from_zyx(label.to_string(), position, length).with_label(label)
            })
            .collect();

        RoiTable::new(TableKind::BoundingBox, rows)
    }

    /// Bounds of every positive label, scanning Z planes in parallel
    fn label_bounds(labels: ArrayView3<'_, u32>) -> BTreeMap<u32, VoxelBounds> {
        let depth = labels.len_of(Axis(0));

        (0..depth)
            .into_par_iter()
            .map(|z| {
                let mut plane_bounds = BTreeMap::<u32, VoxelBounds>::new();
                let plane = labels.index_axis(Axis(0), z);
                for ((y, x), &label) in plane.indexed_iter() {
                    if label == 0 {
                        continue;
                    }
                    plane_bounds
                        .entry(label)
                        .and_modify(|bounds| bounds.include([z, y, x]))
                        .or_insert_with(|| VoxelBounds::at([z, y, x]));
                }
                plane_bounds
            })
            .reduce(BTreeMap::new, |mut acc, plane_bounds| {
                for (label, bounds) in plane_bounds {
                    acc.entry(label)
                        .and_modify(|existing| existing.merge(&bounds))
                        .or_insert(bounds);
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, s};

    fn pixel_size() -> PixelSize {
        PixelSize::new(1.0, 0.325, 0.325)
    }

    #[test]
    fn test_single_box_round_trip() {
        let mut labels = Array3::<u32>::zeros((6, 40, 50));
        labels.slice_mut(s![1..4, 10..30, 5..45]).fill(7);

        let table = BoundingBoxExtractor::extract(labels.view(), pixel_size(), [0, 0, 0]).unwrap();
        assert_eq!(table.kind(), TableKind::BoundingBox);
        assert_eq!(table.len(), 1);

        let roi = &table.rows()[0];
        assert_eq!(roi.label, Some(7));
        assert_eq!(roi.id, "7");
        assert_abs_diff_eq!(roi.z, 1.0);
        assert_abs_diff_eq!(roi.len_z, 3.0);
        assert_abs_diff_eq!(roi.y, 10.0 * 0.325, epsilon = 1e-9);
        assert_abs_diff_eq!(roi.len_y, 20.0 * 0.325, epsilon = 1e-9);
        assert_abs_diff_eq!(roi.x, 5.0 * 0.325, epsilon = 1e-9);
        assert_abs_diff_eq!(roi.len_x, 40.0 * 0.325, epsilon = 1e-9);
    }

    #[test]
    fn test_labels_are_sorted_and_boxes_cover_scattered_voxels() {
        let mut labels = Array3::<u32>::zeros((3, 8, 8));
        labels[[2, 7, 7]] = 9;
        labels[[0, 1, 2]] = 3;
        labels[[2, 4, 0]] = 3;
        labels[[1, 5, 5]] = 9;

        let table =
            BoundingBoxExtractor::extract(labels.view(), PixelSize::new(1.0, 1.0, 1.0), [0, 0, 0])
                .unwrap();
        let found: Vec<_> = table.iter().map(|roi| roi.label.unwrap()).collect();
        assert_eq!(found, [3, 9]);

        let three = &table.rows()[0];
        assert_eq!(three.position_zyx(), [0.0, 1.0, 0.0]);
        assert_eq!(three.length_zyx(), [3.0, 4.0, 3.0]);

        let nine = &table.rows()[1];
        assert_eq!(nine.position_zyx(), [1.0, 5.0, 5.0]);
        assert_eq!(nine.length_zyx(), [2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_origin_shift_moves_positions_only() {
        let mut labels = Array3::<u32>::zeros((2, 4, 4));
        labels.slice_mut(s![.., 1..3, 1..3]).fill(1);

        let plain = BoundingBoxExtractor::extract(labels.view(), pixel_size(), [0, 0, 0]).unwrap();
        let shifted =
            BoundingBoxExtractor::extract(labels.view(), pixel_size(), [3, 100, 200]).unwrap();
        let (a, b) = (&plain.rows()[0], &shifted.rows()[0]);

        assert_abs_diff_eq!(b.z - a.z, 3.0);
        assert_abs_diff_eq!(b.y - a.y, 100.0 * 0.325, epsilon = 1e-9);
        assert_abs_diff_eq!(b.x - a.x, 200.0 * 0.325, epsilon = 1e-9);
        assert_eq!(a.length_zyx(), b.length_zyx());
    }

    #[test]
    fn test_background_only_gives_empty_table() {
        let labels = Array3::<u32>::zeros((2, 5, 5));
        let table = BoundingBoxExtractor::extract(labels.view(), pixel_size(), [0, 0, 0]).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.kind(), TableKind::BoundingBox);

        let empty = Array3::<u32>::zeros((0, 0, 0));
        let table = BoundingBoxExtractor::extract(empty.view(), pixel_size(), [0, 0, 0]).unwrap();
        assert!(table.is_empty());
    }
}
