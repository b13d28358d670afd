use crate::{
    enums::TableKind,
    error::ConfigError,
    roi::{PhysicalRoi, PixelSize, RoiTable},
};

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Per-field-of-view acquisition metadata, one record per camera tile
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FovMetadata {
    pub id: String,
    pub x_micrometer: f64,
    pub y_micrometer: f64,
    pub z_micrometer: f64,
    pub x_pixel: u64,
    pub y_pixel: u64,
    pub z_pixel: u64,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
    pub pixel_size_z: f64,
    pub x_micrometer_original: f64,
    pub y_micrometer_original: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl FovMetadata {
    fn length_zyx(&self) -> [f64; 3] {
        [
            self.z_pixel as f64 * self.pixel_size_z,
            self.y_pixel as f64 * self.pixel_size_y,
            self.x_pixel as f64 * self.pixel_size_x,
        ]
    }

    fn position_zyx(&self) -> [f64; 3] {
        [self.z_micrometer, self.y_micrometer, self.x_micrometer]
    }
}

pub struct RoiTableBuilder;

impl RoiTableBuilder {
    /// Build a table with one ROI per field of view
    ///
    /// # Arguments
    ///
    /// * `fovs` - Acquisition metadata, one record per field of view
    ///
    /// # Errors
    ///
    /// Returns error if `fovs` is empty or a field of view has no extent
    pub fn build_field_of_view_table(fovs: &[FovMetadata]) -> Result<RoiTable, ConfigError> {
        if fovs.is_empty() {
            return Err(ConfigError::EmptyTable);
        }

        let rows = fovs
            .iter()
            .map(|fov| {
                let roi = PhysicalRoi::from_zyx(
                    format!("FOV_{}", fov.id),
                    fov.position_zyx(),
                    fov.length_zyx(),
                )
                .with_original(fov.x_micrometer_original, fov.y_micrometer_original);
                PhysicalRoi {
                    metadata: fov.metadata.clone(),
                    ..roi
                }
            })
            .collect();

        let table = RoiTable::new(TableKind::FieldOfView, rows)?.reset_origin();
        debug!("Built FOV ROI table with {} rows", table.len());
        Ok(table)
    }

    /// Build a table with a single ROI spanning all fields of view
    ///
    /// # Errors
    ///
    /// Returns error if `fovs` is empty or the union has no extent
    pub fn build_well_table(fovs: &[FovMetadata]) -> Result<RoiTable, ConfigError> {
        let first = fovs.first().ok_or(ConfigError::EmptyTable)?;

        let mut start = first.position_zyx();
        let mut end = [f64::MIN; 3];
        for fov in fovs {
            let position = fov.position_zyx();
            let length = fov.length_zyx();
            for axis in 0..3 {
                start[axis] = start[axis].min(position[axis]);
                end[axis] = end[axis].max(position[axis] + length[axis]);
            }
        }
        let length = [end[0] - start[0], end[1] - start[1], end[2] - start[2]];

        let roi = PhysicalRoi::from_zyx(format!("well_{}", first.id), start, length);
        let roi = PhysicalRoi {
            metadata: first.metadata.clone(),
            ..roi
        };
        Ok(RoiTable::new(TableKind::Well, vec![roi])?.reset_origin())
    }

    /// Build a table with a single ROI covering a whole image
    ///
    /// # Arguments
    ///
    /// * `shape_zyx` - Array shape at the level `pixel_size` refers to
    /// * `pixel_size` - Physical pixel size
    pub fn build_whole_image_roi(
        shape_zyx: [usize; 3],
        pixel_size: PixelSize,
    ) -> Result<RoiTable, ConfigError> {
        let size = pixel_size.zyx();
        let length = [
            shape_zyx[0] as f64 * size[0],
            shape_zyx[1] as f64 * size[1],
            shape_zyx[2] as f64 * size[2],
        ];
        let roi = PhysicalRoi::from_zyx("image_1", [0.0; 3], length).with_original(0.0, 0.0);
        RoiTable::new(TableKind::Image, vec![roi])
    }

    /// Split an image into a `grid_shape_yx` grid of ROIs.
    ///
    /// Cells have `ceil(shape / grid)` pixels along Y and X; the last cell of
    /// each row/column is cut at the image edge. Z is never split. Rows are
    /// ordered Y-major and named `ROI_1`, `ROI_2`, ...
    ///
    /// # Errors
    ///
    /// Returns error if a grid dimension is zero, or if the grid is so fine
    /// that a cell would be empty
    pub fn build_grid_rois(
        shape_zyx: [usize; 3],
        pixel_size: PixelSize,
        grid_shape_yx: [usize; 2],
    ) -> Result<RoiTable, ConfigError> {
        let [grid_y, grid_x] = grid_shape_yx;
        if grid_y == 0 || grid_x == 0 {
            return Err(ConfigError::InvalidGridShape(grid_shape_yx));
        }
        let [shape_z, shape_y, shape_x] = shape_zyx;

        let cells_y = Self::grid_cells(shape_y, grid_y);
        let cells_x = Self::grid_cells(shape_x, grid_x);

        let mut rows = Vec::with_capacity(grid_y * grid_x);
        for &(start_y, len_y) in &cells_y {
            for &(start_x, len_x) in &cells_x {
                let id = format!("ROI_{}", rows.len() + 1);
                let position = [
                    0.0,
                    start_y as f64 * pixel_size.y,
                    start_x as f64 * pixel_size.x,
                ];
                let length = [
                    shape_z as f64 * pixel_size.z,
                    len_y as f64 * pixel_size.y,
                    len_x as f64 * pixel_size.x,
                ];
                rows.push(
                    PhysicalRoi::from_zyx(id, position, length)
                        .with_original(position[2], position[1]),
                );
            }
        }
        RoiTable::new(TableKind::Grid, rows)
    }

    /// `(start, length)` in pixels of each cell along one axis
    fn grid_cells(shape: usize, cells: usize) -> Vec<(usize, usize)> {
        let nominal = shape.div_ceil(cells);
        (0..cells)
            .map(|index| {
                let start = index * nominal;
                let end = shape.min(start + nominal);
                (start, end.saturating_sub(start))
            })
            .collect()
    }
}
