//! # NGFF-ROI library
//!
//! This crate places regions of interest (ROIs) on OME-NGFF image pyramids.
//! ROIs are kept in physical units (micrometers) in tables of rows, and are
//! converted into array index boxes at any pyramid level on demand.
//!
//! On top of the coordinate model the library provides:
//!  - Construction of field-of-view, well, whole-image and grid ROI tables
//!  - Zero-origin validation of FOV and well tables
//!  - Bounding-box tables from label arrays (Z planes scanned in parallel
//!    using rayon)
//!  - Pairwise overlap detection of bounding boxes
//!  - Masked segmentation input and restoration of prior labels outside
//!    the masked object
//!  - A per-ROI segmentation driver over pluggable array stores and
//!    segmentation backends
//!
//! Storage of arrays and tables is left to the caller through the traits in
//! [`store`]; an in-memory array and a CSV table store are included.
//!
//! # Examples
//!
//! ## Splitting an image into a grid and reading ROI indices at level 1
//!
//! ```no_run
//! # use ngff_roi::{PixelSize, PyramidGeometry, RoiTableBuilder};
//! let pixel_size = PixelSize::new(1.0, 0.1625, 0.1625);
//! let grid = RoiTableBuilder::build_grid_rois([10, 2160, 2560], pixel_size, [2, 2])
//!     .expect("should have built a 2x2 grid");
//! let geometry = PyramidGeometry::new(pixel_size, 2).expect("should be a valid pyramid");
//! let ranges = geometry
//!     .to_pixel_indices(&grid, 1)
//!     .expect("should have converted grid into indices");
//! assert_eq!(ranges[3].start_zyx(), [0, 540, 640]);
//! ```
//!
//! ## Reading a bounding-box table from disk
//!
//! ```no_run
//! # use ngff_roi::{CsvTableStore, read_roi_table};
//! let store = CsvTableStore::new("plate.zarr/B/03/0/tables");
//! let (table, attrs) = read_roi_table(&store, "nuclei_ROI_table")
//!     .expect("should have read table");
//! assert!(attrs.is_valid_masking_table());
//! println!("{} nuclei", table.len());
//! ```

pub mod bounding_box;
pub mod enums;
pub mod error;
pub mod masked_region;
pub mod ngff;
pub mod overlap;
pub mod roi;
pub mod roi_table_builder;
pub mod segmentation;
pub mod store;
pub mod table_io;
pub mod validator;

pub use bounding_box::BoundingBoxExtractor;
pub use enums::{Axis, SegmentationModel, TableKind, TableVersion};
pub use error::{ConfigError, DomainError, RoiError};
pub use masked_region::{LabelRelabeler, MaskedRegion, Masking};
pub use ngff::ImageMeta;
pub use overlap::{OverlapPair, OverlapTracker, find_overlaps};
pub use roi::{
    PhysicalRoi, PixelIndexRange, PixelSize, PyramidGeometry, RoiTable, to_pixel_indices,
};
pub use roi_table_builder::{FovMetadata, RoiTableBuilder};
pub use segmentation::{RoiSegmentation, SegmentationConfig, SegmentationParams};
pub use store::{ArrayStore, InMemoryArray, Segmenter, TableStore};
pub use table_io::{ColumnTable, CsvTableStore, TableAttrs, read_roi_table, write_roi_table};
pub use validator::check_zero_origin;
