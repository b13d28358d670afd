use crate::enums::Axis;

use thiserror::Error;

const LEGACY_ORIGIN_HINT: &str = "Hint: FOV/well ROI tables with non-zero origins \
(as written by older table versions) are not supported.";

/// Data that violates an invariant of the engine. Never recoverable inside
/// the engine; the caller decides whether to abort or skip the ROI.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(
        "ROI {roi_id} converted into negative array indices along {axis}.\n\
         ZYX position: {}, {}, {}\n\
         ZYX pixel sizes: {}, {}, {} (level={level})\n\
         {}",
        .position_zyx[0], .position_zyx[1], .position_zyx[2],
        .pixel_size_zyx[0], .pixel_size_zyx[1], .pixel_size_zyx[2],
        LEGACY_ORIGIN_HINT
    )]
    NegativePixelIndex {
        roi_id: String,
        axis: Axis,
        position_zyx: [f64; 3],
        pixel_size_zyx: [f64; 3],
        level: usize,
    },

    #[error(
        "{axis} component of ROI indices for table `{table}` do not start with 0, \
         but with {min_index}.\n{}",
        LEGACY_ORIGIN_HINT
    )]
    NonZeroOrigin {
        axis: Axis,
        min_index: usize,
        table: String,
    },

    #[error("Intensity array must be four-dimensional (CZYX), got shape {0:?}")]
    NotFourDimensional(Vec<usize>),

    #[error("Shape mismatch: {left_name} has ZYX shape {left:?} but {right_name} has {right:?}")]
    ShapeMismatch {
        left_name: &'static str,
        left: [usize; 3],
        right_name: &'static str,
        right: [usize; 3],
    },

    #[error("Label {0} is not present in the primary label array for this region")]
    MissingLabel(u32),

    #[error("Region {range:?} is out of bounds for array of shape {shape:?}")]
    RegionOutOfBounds { range: [usize; 6], shape: [usize; 3] },

    #[error("Relabeling reached {0} labels, which does not fit the u32 label type")]
    LabelOverflow(u64),
}

/// Malformed input or configuration, detected at a table or config boundary
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Column {0} is not present in ROI table")]
    MissingColumn(String),

    #[error("Column {column} has {found} values, expected {expected}")]
    ColumnLength {
        column: String,
        found: usize,
        expected: usize,
    },

    #[error("Column {0} must be numeric")]
    NonNumericColumn(String),

    #[error("ROI {roi_id} has invalid label value {value}")]
    InvalidLabel { roi_id: String, value: f64 },

    #[error("ROI {0} of a bounding-box table has no label")]
    MissingLabel(String),

    #[error("ROI {roi_id} has non-positive extent {length} along {axis}")]
    DegenerateExtent {
        roi_id: String,
        axis: Axis,
        length: f64,
    },

    #[error("ROI {roi_id} has a non-finite {field}")]
    NonFinite { roi_id: String, field: &'static str },

    #[error("ROI id {0} appears more than once")]
    DuplicateRowId(String),

    #[error("Cannot build a ROI table from zero fields of view")]
    EmptyTable,

    #[error("Invalid grid shape {0:?}, both dimensions must be positive")]
    InvalidGridShape([usize; 2]),

    #[error("Invalid pixel sizes ZYX {pixel_size_zyx:?} with coarsening factor {coarsening_xy}")]
    InvalidPixelSize {
        pixel_size_zyx: [f64; 3],
        coarsening_xy: u32,
    },

    #[error("Shifts and ROI table have different length or ids ({shifts} shifts, {rows} ROIs)")]
    ShiftTableMismatch { shifts: usize, rows: usize },

    #[error("Inhomogeneous coarsening: {0}")]
    InhomogeneousCoarsening(String),

    #[error("Unsupported OME-NGFF metadata: {0}")]
    UnsupportedNgff(String),

    #[error("Segmentation model `{0}` is not available")]
    UnsupportedModel(String),

    #[error("Masked segmentation requires a bounding-box table with labels, got {0}")]
    NotAMaskingTable(String),

    #[error("Table `{0}` not found")]
    TableNotFound(String),

    #[error("Segmentation needs at least one input channel")]
    NoChannels,

    #[error("Table `{0}` already exists and overwriting is not allowed")]
    TableExists(String),

    #[error("Missing attribute `type` for table `{0}`")]
    MissingTableType(String),

    #[error("Shifts must have two (YX) or three (ZYX) components, got {0}")]
    InvalidShift(usize),

    #[error("XY anisotropy detected: pixel_size_y={y}, pixel_size_x={x}")]
    AnisotropicXy { y: f64, x: f64 },
}

#[derive(Debug, Error)]
pub enum RoiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
