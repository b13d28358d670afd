//! Seams to the outside world: chunked array storage, table storage and the
//! segmentation model.

use crate::{
    error::{DomainError, RoiError},
    roi::PixelIndexRange,
    segmentation::SegmentationParams,
    table_io::{ColumnTable, TableAttrs},
};

use ndarray::{Array3, ArrayView3, ArrayView4};

/// A 3D (ZYX) array that can be read and written one region at a time
pub trait ArrayStore<T> {
    fn shape(&self) -> [usize; 3];

    /// # Errors
    ///
    /// Returns error if `range` does not lie within [`ArrayStore::shape`]
    fn read_region(&self, range: &PixelIndexRange) -> Result<Array3<T>, RoiError>;

    /// # Errors
    ///
    /// Returns error if `range` does not lie within [`ArrayStore::shape`] or
    /// if `data` does not have the shape of `range`
    fn write_region(
        &mut self,
        range: &PixelIndexRange,
        data: ArrayView3<'_, T>,
    ) -> Result<(), RoiError>;
}

pub trait TableStore {
    fn read_table(&self, name: &str) -> Result<(ColumnTable, TableAttrs), RoiError>;

    /// # Errors
    ///
    /// Returns error if the table exists and `overwrite` is false, or if
    /// `attrs` lacks a table type
    fn write_table(
        &mut self,
        name: &str,
        table: &ColumnTable,
        attrs: &TableAttrs,
        overwrite: bool,
    ) -> Result<(), RoiError>;
}

/// A segmentation model that turns a (channel, Z, Y, X) intensity array into
/// a ZYX label array of the same spatial shape
pub trait Segmenter {
    /// Identifiers of the models this backend can run
    fn model_ids(&self) -> Vec<String>;

    fn segment(
        &self,
        intensity: ArrayView4<'_, f32>,
        params: &SegmentationParams,
    ) -> Result<Array3<u32>, RoiError>;
}

/// [`ArrayStore`] kept entirely in memory
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryArray<T> {
    data: Array3<T>,
}

impl<T: Clone> InMemoryArray<T> {
    pub fn new(data: Array3<T>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn into_inner(self) -> Array3<T> {
        self.data
    }

    fn check_bounds(&self, range: &PixelIndexRange) -> Result<(), DomainError> {
        let shape = self.shape();
        if range.fits_in(shape) {
            Ok(())
        } else {
            Err(DomainError::RegionOutOfBounds {
                range: range.as_array(),
                shape,
            })
        }
    }
}

impl<T: Clone> ArrayStore<T> for InMemoryArray<T> {
    fn shape(&self) -> [usize; 3] {
        let (z, y, x) = self.data.dim();
        [z, y, x]
    }

    fn read_region(&self, range: &PixelIndexRange) -> Result<Array3<T>, RoiError> {
        self.check_bounds(range)?;
        Ok(range.view(&self.data).to_owned())
    }

    fn write_region(
        &mut self,
        range: &PixelIndexRange,
        data: ArrayView3<'_, T>,
    ) -> Result<(), RoiError> {
        self.check_bounds(range)?;
        let (z, y, x) = data.dim();
        if [z, y, x] != range.shape() {
            return Err(DomainError::ShapeMismatch {
                left_name: "region",
                left: range.shape(),
                right_name: "data",
                right: [z, y, x],
            }
            .into());
        }
        self.data.slice_mut(range.slice_info()).assign(&data);
        Ok(())
    }
}
