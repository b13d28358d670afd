use crate::{
    enums::{Axis, TableKind},
    error::DomainError,
    roi::PixelIndexRange,
};

/// Check that the ranges of a FOV or well table start at zero on every axis.
///
/// Only field-of-view and well tables cover a contiguous acquisition and
/// must have a zero origin; ROI tables obtained from segmentation can start
/// anywhere, so for every other kind (and for an empty list) this is a no-op.
///
/// # Errors
///
/// Returns [`DomainError::NonZeroOrigin`] naming the first axis (in ZYX
/// order) whose smallest start index is not zero.
pub fn check_zero_origin(ranges: &[PixelIndexRange], kind: TableKind) -> Result<(), DomainError> {
    if !kind.requires_zero_origin() {
        return Ok(());
    }

    let Some(min_start) = ranges.iter().map(PixelIndexRange::start_zyx).reduce(|acc, start| {
        [acc[0].min(start[0]), acc[1].min(start[1]), acc[2].min(start[2])]
    }) else {
        return Ok(());
    };

    for (axis, min_index) in Axis::ZYX.into_iter().zip(min_start) {
        if min_index != 0 {
            return Err(DomainError::NonZeroOrigin {
                axis,
                min_index,
                table: kind.to_string(),
            });
        }
    }
    Ok(())
}
