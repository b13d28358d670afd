use crate::{
    enums::{Axis, TableKind},
    error::{ConfigError, DomainError, RoiError},
};

use ndarray::{ArrayBase, ArrayView3, Data, Ix3, SliceInfo, SliceInfoElem, s};
use std::collections::{BTreeMap, HashSet};

/// Physical size of one voxel, in micrometers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSize {
    pub z: f64,
    pub y: f64,
    pub x: f64,
}

impl PixelSize {
    pub fn new(z: f64, y: f64, x: f64) -> Self {
        Self { z, y, x }
    }

    pub fn from_zyx(zyx: [f64; 3]) -> Self {
        Self::new(zyx[0], zyx[1], zyx[2])
    }

    pub fn zyx(&self) -> [f64; 3] {
        [self.z, self.y, self.x]
    }

    fn is_valid(&self) -> bool {
        self.zyx().iter().all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Pixel sizes of a multiresolution pyramid. Every level coarsens X and Y
/// by `coarsening_xy`; Z is never coarsened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidGeometry {
    pub full_res_pixel_size: PixelSize,
    pub coarsening_xy: u32,
}

impl PyramidGeometry {
    pub fn new(full_res_pixel_size: PixelSize, coarsening_xy: u32) -> Result<Self, ConfigError> {
        if !full_res_pixel_size.is_valid() || coarsening_xy == 0 {
            return Err(ConfigError::InvalidPixelSize {
                pixel_size_zyx: full_res_pixel_size.zyx(),
                coarsening_xy,
            });
        }
        Ok(Self {
            full_res_pixel_size,
            coarsening_xy,
        })
    }

    pub fn pixel_size_at(&self, level: usize) -> PixelSize {
        let prefactor = (self.coarsening_xy as f64).powi(level as i32);
        PixelSize {
            z: self.full_res_pixel_size.z,
            y: self.full_res_pixel_size.y * prefactor,
            x: self.full_res_pixel_size.x * prefactor,
        }
    }

    /// Convert a shift measured in pixels at `level` into micrometers.
    ///
    /// `shift` is either ZYX or YX; a YX shift gets a zero Z component. Every
    /// component is scaled by `coarsening_xy^level` times the full-resolution
    /// pixel size of its axis, as registration shifts are.
    ///
    /// # Errors
    ///
    /// Returns error if `shift` has neither two nor three components
    pub fn physical_shift(&self, shift: &[f64], level: usize) -> Result<[f64; 3], ConfigError> {
        let prefactor = f64::from(self.coarsening_xy).powi(level as i32);
        let factors = self.full_res_pixel_size.zyx().map(|size| size * prefactor);
        match *shift {
            [y, x] => Ok([0.0, y * factors[1], x * factors[2]]),
            [z, y, x] => Ok([z * factors[0], y * factors[1], x * factors[2]]),
            _ => Err(ConfigError::InvalidShift(shift.len())),
        }
    }

    /// Convert every row of `table` into array indices at `level`.
    ///
    /// Start and end of each axis are `position / pixel_size` and
    /// `(position + length) / pixel_size`, rounded to the nearest integer
    /// with ties going to the even neighbour. The output keeps the row order
    /// of the table.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NegativePixelIndex`] if any index of any row is
    /// negative, which happens for legacy tables with a non-zero origin.
    pub fn to_pixel_indices(
        &self,
        table: &RoiTable,
        level: usize,
    ) -> Result<Vec<PixelIndexRange>, DomainError> {
        let pixel_size = self.pixel_size_at(level);
        let pixel_size_zyx = pixel_size.zyx();

        table
            .iter()
            .map(|roi| {
                let start = roi.position_zyx();
                let end = roi.end_zyx();
                let mut indices = [0usize; 6];
                for (axis_index, axis) in Axis::ZYX.into_iter().enumerate() {
                    let bounds = [start[axis_index], end[axis_index]];
                    for (bound_index, bound) in bounds.into_iter().enumerate() {
                        let index = (bound / pixel_size_zyx[axis_index]).round_ties_even();
                        if index < 0.0 {
                            return Err(DomainError::NegativePixelIndex {
                                roi_id: roi.id.clone(),
                                axis,
                                position_zyx: start,
                                pixel_size_zyx,
                                level,
                            });
                        }
                        indices[2 * axis_index + bound_index] = index as usize;
                    }
                }
                Ok(PixelIndexRange::from_array(indices))
            })
            .collect()
    }
}

/// Convert a ROI table into array indices, see [`PyramidGeometry::to_pixel_indices`]
pub fn to_pixel_indices(
    table: &RoiTable,
    full_res_pixel_size_zyx: [f64; 3],
    level: usize,
    coarsening_xy: u32,
) -> Result<Vec<PixelIndexRange>, RoiError> {
    let full_res_pixel_size = PixelSize::from_zyx(full_res_pixel_size_zyx);
    let geometry = PyramidGeometry::new(full_res_pixel_size, coarsening_xy)?;
    Ok(geometry.to_pixel_indices(table, level)?)
}

/// Half-open ZYX index box at one pyramid level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelIndexRange {
    pub z0: usize,
    pub z1: usize,
    pub y0: usize,
    pub y1: usize,
    pub x0: usize,
    pub x1: usize,
}

impl PixelIndexRange {
    /// Build from `[start_z, end_z, start_y, end_y, start_x, end_x]`
    pub fn from_array(indices: [usize; 6]) -> Self {
        let [z0, z1, y0, y1, x0, x1] = indices;
        Self {
            z0,
            z1,
            y0,
            y1,
            x0,
            x1,
        }
    }

    pub fn as_array(&self) -> [usize; 6] {
        [self.z0, self.z1, self.y0, self.y1, self.x0, self.x1]
    }

    pub fn start_zyx(&self) -> [usize; 3] {
        [self.z0, self.y0, self.x0]
    }

    pub fn end_zyx(&self) -> [usize; 3] {
        [self.z1, self.y1, self.x1]
    }

    pub fn shape(&self) -> [usize; 3] {
        [
            self.z1.saturating_sub(self.z0),
            self.y1.saturating_sub(self.y0),
            self.x1.saturating_sub(self.x0),
        ]
    }

    /// True if both boxes share at least one voxel. Boxes that only touch
    /// do not intersect.
    pub fn intersects(&self, other: &PixelIndexRange) -> bool {
        let (a0, a1) = (self.start_zyx(), self.end_zyx());
        let (b0, b1) = (other.start_zyx(), other.end_zyx());
        (0..3).all(|axis| a0[axis].max(b0[axis]) < a1[axis].min(b1[axis]))
    }

    pub fn fits_in(&self, shape: [usize; 3]) -> bool {
        let end = self.end_zyx();
        let start = self.start_zyx();
        (0..3).all(|axis| start[axis] <= end[axis] && end[axis] <= shape[axis])
    }

    pub fn slice_info(&self) -> SliceInfo<[SliceInfoElem; 3], Ix3, Ix3> {
        s![self.z0..self.z1, self.y0..self.y1, self.x0..self.x1]
    }

    pub fn view<'a, S: Data>(&self, array: &'a ArrayBase<S, Ix3>) -> ArrayView3<'a, S::Elem> {
        array.slice(self.slice_info())
    }
}

/// One row of a ROI table. Positions and lengths are in micrometers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhysicalRoi {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub len_x: f64,
    pub len_y: f64,
    pub len_z: f64,
    pub x_original: Option<f64>,
    pub y_original: Option<f64>,
    pub label: Option<u32>,
    pub metadata: BTreeMap<String, String>,
}

impl PhysicalRoi {
    pub fn from_zyx(id: impl Into<String>, position_zyx: [f64; 3], length_zyx: [f64; 3]) -> Self {
        Self {
            id: id.into(),
            z: position_zyx[0],
            y: position_zyx[1],
            x: position_zyx[2],
            len_z: length_zyx[0],
            len_y: length_zyx[1],
            len_x: length_zyx[2],
            ..Default::default()
        }
    }

    pub fn with_original(mut self, x_original: f64, y_original: f64) -> Self {
        self.x_original = Some(x_original);
        self.y_original = Some(y_original);
        self
    }

    pub fn with_label(mut self, label: u32) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn position_zyx(&self) -> [f64; 3] {
        [self.z, self.y, self.x]
    }

    pub fn length_zyx(&self) -> [f64; 3] {
        [self.len_z, self.len_y, self.len_x]
    }

    pub fn end_zyx(&self) -> [f64; 3] {
        [self.z + self.len_z, self.y + self.len_y, self.x + self.len_x]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("x_micrometer", Some(self.x)),
            ("y_micrometer", Some(self.y)),
            ("z_micrometer", Some(self.z)),
            ("len_x_micrometer", Some(self.len_x)),
            ("len_y_micrometer", Some(self.len_y)),
            ("len_z_micrometer", Some(self.len_z)),
            ("x_micrometer_original", self.x_original),
            ("y_micrometer_original", self.y_original),
        ];
        for (field, value) in fields {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(ConfigError::NonFinite {
                    roi_id: self.id.clone(),
                    field,
                });
            }
        }

        for (axis, length) in Axis::ZYX.into_iter().zip(self.length_zyx()) {
            if length <= 0.0 {
                return Err(ConfigError::DegenerateExtent {
                    roi_id: self.id.clone(),
                    axis,
                    length,
                });
            }
        }
        Ok(())
    }
}

/// An ordered, immutable table of ROIs sharing one origin.
///
/// Rows are validated once when the table is built; every transformation
/// returns a new table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoiTable {
    kind: TableKind,
    rows: Vec<PhysicalRoi>,
}

impl RoiTable {
    /// Build a table from rows
    ///
    /// # Errors
    ///
    /// Returns error if a value is not finite, an extent is not positive,
    /// a row id is repeated, or a bounding-box row has no label
    pub fn new(kind: TableKind, rows: Vec<PhysicalRoi>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(rows.len());
        for roi in &rows {
            roi.validate()?;
            if !seen.insert(roi.id.as_str()) {
                return Err(ConfigError::DuplicateRowId(roi.id.clone()));
            }
            if kind == TableKind::BoundingBox && roi.label.is_none() {
                return Err(ConfigError::MissingLabel(roi.id.clone()));
            }
        }
        Ok(Self { kind, rows })
    }

    pub fn empty(kind: TableKind) -> Self {
        Self {
            kind,
            rows: Vec::new(),
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn rows(&self) -> &[PhysicalRoi] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<PhysicalRoi> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PhysicalRoi> {
        self.rows.iter()
    }

    pub fn get(&self, id: &str) -> Option<&PhysicalRoi> {
        self.rows.iter().find(|roi| roi.id == id)
    }

    /// Rows of `self` followed by rows of `other`, keeping the kind of `self`
    pub fn concat(&self, other: &RoiTable) -> Result<Self, ConfigError> {
        let rows = self.rows.iter().chain(other.rows.iter()).cloned().collect();
        Self::new(self.kind, rows)
    }

    /// Copy of the table with positions shifted so that the minimum position
    /// along every axis is zero. `x_original`/`y_original` are kept as they are.
    pub fn reset_origin(&self) -> Self {
        let Some(origin) = self.min_position_zyx() else {
            return self.clone();
        };
        let rows = self
            .rows
            .iter()
            .map(|roi| PhysicalRoi {
                z: roi.z - origin[0],
                y: roi.y - origin[1],
                x: roi.x - origin[2],
                ..roi.clone()
            })
            .collect();
        Self {
            kind: self.kind,
            rows,
        }
    }

    pub fn min_position_zyx(&self) -> Option<[f64; 3]> {
        self.rows.iter().map(PhysicalRoi::position_zyx).reduce(|acc, pos| {
            [acc[0].min(pos[0]), acc[1].min(pos[1]), acc[2].min(pos[2])]
        })
    }

    /// Compress every ROI to a single Z plane of thickness `pixel_size_z`
    pub fn project_to_2d(&self, pixel_size_z: f64) -> Result<Self, ConfigError> {
        let rows = self
            .rows
            .iter()
            .map(|roi| PhysicalRoi {
                len_z: pixel_size_z,
                ..roi.clone()
            })
            .collect();
        Self::new(self.kind, rows)
    }

    /// Copy of the table with a per-ROI ZYX shift (micrometers) added to
    /// every position. `shifts` must hold exactly one entry per row id.
    pub fn translated(&self, shifts: &BTreeMap<String, [f64; 3]>) -> Result<Self, ConfigError> {
        let mismatch = || ConfigError::ShiftTableMismatch {
            shifts: shifts.len(),
            rows: self.rows.len(),
        };
        if shifts.len() != self.rows.len() {
            return Err(mismatch());
        }
        let rows = self
            .rows
            .iter()
            .map(|roi| {
                let shift = shifts.get(&roi.id).ok_or_else(mismatch)?;
                Ok(PhysicalRoi {
                    z: roi.z + shift[0],
                    y: roi.y + shift[1],
                    x: roi.x + shift[2],
                    ..roi.clone()
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Self::new(self.kind, rows)
    }
}

impl<'a> IntoIterator for &'a RoiTable {
    type Item = &'a PhysicalRoi;
    type IntoIter = std::slice::Iter<'a, PhysicalRoi>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    fn geometry() -> PyramidGeometry {
        PyramidGeometry::new(PixelSize::new(1.0, 0.1625, 0.1625), 2).unwrap()
    }

    fn fov_table() -> RoiTable {
        RoiTable::new(
            TableKind::FieldOfView,
            vec![
                PhysicalRoi::from_zyx("FOV_1", [0.0, 0.0, 0.0], [2.0, 416.0, 416.0]),
                PhysicalRoi::from_zyx("FOV_2", [0.0, 0.0, 416.0], [2.0, 416.0, 416.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_pixel_size_at_level() {
        let size = geometry().pixel_size_at(2);
        assert_abs_diff_eq!(size.z, 1.0);
        assert_abs_diff_eq!(size.y, 0.65);
        assert_abs_diff_eq!(size.x, 0.65);
    }

    #[test]
    fn test_to_pixel_indices_level_0() {
        let indices = geometry().to_pixel_indices(&fov_table(), 0).unwrap();
        assert_eq!(indices.len(), 2);
        assert_eq!(indices[0].as_array(), [0, 2, 0, 2560, 0, 2560]);
        assert_eq!(indices[1].as_array(), [0, 2, 0, 2560, 2560, 5120]);
    }

    #[test]
    fn test_to_pixel_indices_is_monotonic_in_level() {
        let table = fov_table();
        let geometry = geometry();
        let mut previous = geometry.to_pixel_indices(&table, 0).unwrap();
        for level in 1..5 {
            let current = geometry.to_pixel_indices(&table, level).unwrap();
            for (prev, cur) in previous.iter().zip(&current) {
                for (p, c) in prev.as_array().iter().zip(cur.as_array()) {
                    assert!(c <= *p);
                }
                assert_eq!(prev.z0, cur.z0);
                assert_eq!(prev.z1, cur.z1);
            }
            previous = current;
        }
    }

    #[test]
    fn test_rounding_ties_to_even() {
        let geometry = PyramidGeometry::new(PixelSize::new(1.0, 1.0, 1.0), 2).unwrap();
        let table = RoiTable::new(
            TableKind::Other,
            vec![PhysicalRoi::from_zyx("roi", [0.5, 1.5, 2.5], [1.0, 1.0, 1.0])],
        )
        .unwrap();
        let indices = geometry.to_pixel_indices(&table, 0).unwrap();
        assert_eq!(indices[0].as_array(), [0, 2, 2, 2, 2, 4]);
    }

    #[test]
    fn test_to_pixel_indices_empty_table() {
        let table = RoiTable::empty(TableKind::FieldOfView);
        assert!(geometry().to_pixel_indices(&table, 3).unwrap().is_empty());
    }

    #[test]
    fn test_negative_indices_fail() {
        let table = RoiTable::new(
            TableKind::FieldOfView,
            vec![PhysicalRoi::from_zyx("FOV_7", [0.0, -100.0, 0.0], [1.0, 416.0, 416.0])],
        )
        .unwrap();
        let err = geometry().to_pixel_indices(&table, 1).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("FOV_7"));
        assert!(message.contains("along Y"));
        assert!(message.contains("level=1"));
        assert!(message.contains("non-zero origins"));
    }

    #[test]
    fn test_free_function_rejects_bad_pixel_size() {
        let result = to_pixel_indices(&fov_table(), [0.0, 1.0, 1.0], 0, 2);
        assert!(matches!(
            result,
            Err(RoiError::Config(ConfigError::InvalidPixelSize { .. }))
        ));
    }

    #[test]
    fn test_reset_origin() {
        let table = RoiTable::new(
            TableKind::FieldOfView,
            vec![
                PhysicalRoi::from_zyx("FOV_1", [2.0, -1448.3, -1517.7], [1.0, 351.0, 416.0])
                    .with_original(-1517.7, -1448.3),
                PhysicalRoi::from_zyx("FOV_2", [3.0, -1032.3, -1517.7], [1.0, 351.0, 416.0])
                    .with_original(-1517.7, -1032.3),
            ],
        )
        .unwrap();
        let reset = table.reset_origin();
        assert_eq!(reset.min_position_zyx(), Some([0.0, 0.0, 0.0]));
        assert_abs_diff_eq!(reset.rows()[1].y, 416.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reset.rows()[1].z, 1.0);
        assert_eq!(reset.rows()[0].x_original, Some(-1517.7));
        assert_eq!(reset.reset_origin(), reset);
        // The source table is untouched
        assert_abs_diff_eq!(table.rows()[0].y, -1448.3);
    }

    #[test]
    fn test_table_rejects_zero_extent() {
        let result = RoiTable::new(
            TableKind::Other,
            vec![PhysicalRoi::from_zyx("flat", [0.0, 0.0, 0.0], [0.0, 1.0, 1.0])],
        );
        assert!(matches!(
            result,
            Err(ConfigError::DegenerateExtent { axis: Axis::Z, .. })
        ));
    }

    #[test]
    fn test_table_rejects_duplicates_and_unlabeled_boxes() {
        let roi = PhysicalRoi::from_zyx("a", [0.0; 3], [1.0; 3]);
        let result = RoiTable::new(TableKind::Other, vec![roi.clone(), roi.clone()]);
        assert!(matches!(result, Err(ConfigError::DuplicateRowId(_))));

        let result = RoiTable::new(TableKind::BoundingBox, vec![roi]);
        assert!(matches!(result, Err(ConfigError::MissingLabel(_))));
    }

    #[test]
    fn test_project_to_2d() {
        let projected = fov_table().project_to_2d(1.0).unwrap();
        assert!(projected.iter().all(|roi| roi.len_z == 1.0));
        assert_eq!(projected.len(), 2);
    }

    #[test]
    fn test_translated() {
        let mut shifts = BTreeMap::new();
        shifts.insert("FOV_1".to_string(), [0.0, 7.8, 32.5]);
        shifts.insert("FOV_2".to_string(), [0.0, 7.8, 32.5]);
        let moved = fov_table().translated(&shifts).unwrap();
        assert_abs_diff_eq!(moved.rows()[1].x, 448.5);
        assert_abs_diff_eq!(moved.rows()[0].y, 7.8);

        shifts.remove("FOV_2");
        let err = fov_table().translated(&shifts).unwrap_err();
        assert!(err.to_string().contains("different length"));
    }

    #[test]
    fn test_physical_shift() {
        let geometry = PyramidGeometry::new(PixelSize::new(3.0, 4.0, 5.0), 2).unwrap();

        let shift = geometry.physical_shift(&[10.0, 20.0], 1).unwrap();
        assert_eq!(shift, [0.0, 80.0, 200.0]);

        let shift = geometry.physical_shift(&[10.0, 20.0, 30.0], 1).unwrap();
        assert_eq!(shift, [60.0, 160.0, 300.0]);

        let shift = geometry.physical_shift(&[1.0, 1.0, 1.0], 0).unwrap();
        assert_eq!(shift, [3.0, 4.0, 5.0]);

        let bad_shifts: [&[f64]; 3] = [&[10.0], &[], &[1.0, 2.0, 3.0, 4.0]];
        for bad in bad_shifts {
            assert!(matches!(
                geometry.physical_shift(bad, 1),
                Err(ConfigError::InvalidShift(n)) if n == bad.len()
            ));
        }
    }

    #[test]
    fn test_range_intersection_and_view() {
        let a = PixelIndexRange::from_array([0, 10, 0, 10, 0, 10]);
        let b = PixelIndexRange::from_array([5, 15, 5, 15, 5, 15]);
        let c = PixelIndexRange::from_array([0, 10, 0, 10, 10, 20]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.fits_in([10, 10, 10]));
        assert!(!b.fits_in([10, 10, 10]));

        let array = Array3::from_shape_fn((4, 4, 4), |(z, y, x)| z * 16 + y * 4 + x);
        let range = PixelIndexRange::from_array([1, 2, 2, 4, 0, 1]);
        let region = range.view(&array);
        assert_eq!(region.shape(), &[1, 2, 1]);
        assert_eq!(region[[0, 0, 0]], 24);
    }
}
