use crate::error::DomainError;

use ndarray::{Array, Array3, Array4, ArrayView3, Dimension, Ix4, Zip};
use tracing::debug;

/// How the input of one ROI is restricted before segmentation
#[derive(Debug, Clone)]
pub enum Masking<'a> {
    Disabled,
    /// Keep only voxels where `primary == label_value`; `prior_output` is
    /// the current content of the output label array for the same region.
    Enabled {
        label_value: u32,
        primary: ArrayView3<'a, u32>,
        prior_output: ArrayView3<'a, u32>,
    },
}

/// State carried from masking the input of a ROI to restoring its output
#[derive(Debug, Clone, PartialEq)]
pub enum MaskedRegion {
    Unmasked,
    Masked {
        background: Array3<bool>,
        prior_labels: Array3<u32>,
    },
}

fn zyx(shape: &[usize]) -> [usize; 3] {
    let n = shape.len();
    [shape[n - 3], shape[n - 2], shape[n - 1]]
}

fn ensure_same_shape(
    left_name: &'static str,
    left: [usize; 3],
    right_name: &'static str,
    right: [usize; 3],
) -> Result<(), DomainError> {
    if left == right {
        Ok(())
    } else {
        Err(DomainError::ShapeMismatch {
            left_name,
            left,
            right_name,
            right,
        })
    }
}

impl MaskedRegion {
    /// Prepare the segmentation input of one ROI.
    ///
    /// `intensity` must be four-dimensional (channel, Z, Y, X). With masking
    /// enabled, every voxel outside the primary object is set to
    /// `T::default()` in all channels, and the background mask plus the
    /// prior output labels are kept for [`MaskedRegion::restore`].
    ///
    /// # Errors
    ///
    /// Returns error if `intensity` is not 4D, if the ZYX shapes of the arrays
    /// differ, or if `label_value` does not occur in the primary array
    pub fn prepare<T, D>(
        intensity: Array<T, D>,
        masking: Masking<'_>,
    ) -> Result<(Array4<T>, MaskedRegion), DomainError>
    where
        T: Copy + Default,
        D: Dimension,
    {
        let shape = intensity.shape().to_vec();
        let mut intensity = intensity
            .into_dimensionality::<Ix4>()
            .map_err(|_| DomainError::NotFourDimensional(shape))?;

        let Masking::Enabled {
            label_value,
            primary,
            prior_output,
        } = masking
        else {
            return Ok((intensity, MaskedRegion::Unmasked));
        };

        let image_zyx = zyx(intensity.shape());
        ensure_same_shape("intensity", image_zyx, "primary labels", zyx(primary.shape()))?;
        ensure_same_shape(
            "intensity",
            image_zyx,
            "prior output labels",
            zyx(prior_output.shape()),
        )?;

        if !primary.iter().any(|&value| value == label_value) {
            return Err(DomainError::MissingLabel(label_value));
        }
        let background = primary.mapv(|value| value != label_value);

        for mut channel in intensity.outer_iter_mut() {
            Zip::from(&mut channel)
                .and(&background)
                .for_each(|voxel, &is_background| {
                    if is_background {
                        *voxel = T::default();
                    }
                });
        }
        debug!(
            "Masked input for label {label_value}: {} of {} voxels kept",
            background.iter().filter(|&&b| !b).count(),
            background.len()
        );

        Ok((
            intensity,
            MaskedRegion::Masked {
                background,
                prior_labels: prior_output.to_owned(),
            },
        ))
    }

    /// Put the prior labels back on every background voxel of `new_labels`.
    /// Without masking `new_labels` is returned unchanged.
    pub fn restore(&self, mut new_labels: Array3<u32>) -> Result<Array3<u32>, DomainError> {
        let MaskedRegion::Masked {
            background,
            prior_labels,
        } = self
        else {
            return Ok(new_labels);
        };

        let new_zyx = zyx(new_labels.shape());
        ensure_same_shape("new labels", new_zyx, "background mask", zyx(background.shape()))?;
        ensure_same_shape("new labels", new_zyx, "prior output labels", zyx(prior_labels.shape()))?;

        Zip::from(&mut new_labels)
            .and(background)
            .and(prior_labels)
            .for_each(|label, &is_background, &prior| {
                if is_background {
                    *label = prior;
                }
            });
        Ok(new_labels)
    }

    /// Voxels a fresh segmentation may write to, if masking is enabled
    pub fn foreground(&self) -> Option<Array3<bool>> {
        match self {
            MaskedRegion::Unmasked => None,
            MaskedRegion::Masked { background, .. } => Some(background.mapv(|b| !b)),
        }
    }
}

/// Makes labels unique across ROIs by shifting every ROI's labels past
/// those of the ROIs before it
#[derive(Debug, Clone, Default)]
pub struct LabelRelabeler {
    total: u64,
}

impl LabelRelabeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels handed out so far
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Shift all positive labels of `labels` by the running total, and
    /// return the number of labels of this ROI (its maximum label).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::LabelOverflow`] if the new total does not fit
    /// in `u32`; `labels` is left untouched in that case.
    pub fn relabel(&mut self, labels: &mut Array3<u32>) -> Result<u32, DomainError> {
        let count = labels.iter().copied().max().unwrap_or(0);
        let new_total = self.total + u64::from(count);
        if new_total > u64::from(u32::MAX) {
            return Err(DomainError::LabelOverflow(new_total));
        }

        // self.total <= u32::MAX here
        let offset = self.total as u32;
        labels.mapv_inplace(|label| if label > 0 { label + offset } else { 0 });
        self.total = new_total;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn primary() -> Array3<u32> {
        let mut primary = Array3::<u32>::zeros((2, 4, 4));
        primary.slice_mut(s![.., 1..3, 1..3]).fill(5);
        primary[[0, 0, 0]] = 6;
        primary
    }

    #[test]
    fn test_prepare_masks_every_channel() {
        let intensity = Array::from_elem((2, 2, 4, 4), 100.0f32);
        let primary = primary();
        let prior = Array3::<u32>::from_elem((2, 4, 4), 9);

        let (masked, region) = MaskedRegion::prepare(
            intensity,
            Masking::Enabled {
                label_value: 5,
                primary: primary.view(),
                prior_output: prior.view(),
            },
        )
        .unwrap();

        for channel in masked.outer_iter() {
            for ((z, y, x), &value) in channel.indexed_iter() {
                let expected = if primary[[z, y, x]] == 5 { 100.0 } else { 0.0 };
                assert_eq!(value, expected);
            }
        }
        let MaskedRegion::Masked {
            background,
            prior_labels,
        } = &region
        else {
            panic!("expected a masked region");
        };
        assert_eq!(background.iter().filter(|&&b| !b).count(), 8);
        assert_eq!(prior_labels, &prior);
        assert!(region.foreground().unwrap()[[0, 1, 1]]);
    }

    #[test]
    fn test_prepare_without_masking_is_identity() {
        let intensity =
            Array::from_shape_fn((1, 2, 3, 3), |(_, z, y, x)| (z * 9 + y * 3 + x) as u16);
        let (same, region) = MaskedRegion::prepare(intensity.clone(), Masking::Disabled).unwrap();
        assert_eq!(same, intensity);
        assert_eq!(region, MaskedRegion::Unmasked);
        assert!(region.foreground().is_none());

        let labels = Array3::<u32>::from_elem((2, 3, 3), 4);
        assert_eq!(region.restore(labels.clone()).unwrap(), labels);
    }

    #[test]
    fn test_prepare_requires_four_dimensions() {
        let intensity = Array3::<f32>::zeros((2, 4, 4));
        let err = MaskedRegion::prepare(intensity, Masking::Disabled).unwrap_err();
        assert!(matches!(err, DomainError::NotFourDimensional(ref shape) if shape == &[2, 4, 4]));
    }

    #[test]
    fn test_prepare_rejects_shape_mismatch() {
        let intensity = Array::from_elem((1, 2, 4, 5), 1.0f32);
        let primary = primary();
        let prior = Array3::<u32>::zeros((2, 4, 4));
        let err = MaskedRegion::prepare(
            intensity,
            Masking::Enabled {
                label_value: 5,
                primary: primary.view(),
                prior_output: prior.view(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("[2, 4, 5]"));
        assert!(err.to_string().contains("[2, 4, 4]"));
    }

    #[test]
    fn test_prepare_rejects_missing_label() {
        let intensity = Array::from_elem((1, 2, 4, 4), 1.0f32);
        let primary = primary();
        let prior = Array3::<u32>::zeros((2, 4, 4));
        let err = MaskedRegion::prepare(
            intensity,
            Masking::Enabled {
                label_value: 42,
                primary: primary.view(),
                prior_output: prior.view(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::MissingLabel(42)));
    }

    #[test]
    fn test_restore_with_full_background_returns_prior() {
        let region = MaskedRegion::Masked {
            background: Array3::from_elem((2, 2, 2), true),
            prior_labels: Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (z * 4 + y * 2 + x) as u32),
        };
        let fresh = Array3::from_elem((2, 2, 2), 77);
        let restored = region.restore(fresh).unwrap();
        let MaskedRegion::Masked { prior_labels, .. } = &region else {
            unreachable!()
        };
        assert_eq!(&restored, prior_labels);
    }

    #[test]
    fn test_restore_keeps_new_foreground() {
        let primary = primary();
        let prior = Array3::<u32>::from_elem((2, 4, 4), 3);
        let (_, region) = MaskedRegion::prepare(
            Array::from_elem((1, 2, 4, 4), 1u8),
            Masking::Enabled {
                label_value: 5,
                primary: primary.view(),
                prior_output: prior.view(),
            },
        )
        .unwrap();

        let restored = region.restore(Array3::from_elem((2, 4, 4), 1)).unwrap();
        assert_eq!(restored[[0, 1, 1]], 1);
        assert_eq!(restored[[1, 2, 2]], 1);
        assert_eq!(restored[[0, 0, 0]], 3);
        assert_eq!(restored[[1, 3, 3]], 3);

        let err = region.restore(Array3::zeros((2, 4, 3))).unwrap_err();
        assert!(matches!(err, DomainError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_relabeler_shifts_and_counts() {
        let mut relabeler = LabelRelabeler::new();
        let mut first = Array3::<u32>::zeros((1, 2, 2));
        first[[0, 0, 0]] = 1;
        first[[0, 1, 1]] = 3;
        assert_eq!(relabeler.relabel(&mut first).unwrap(), 3);
        assert_eq!(first[[0, 1, 1]], 3);

        let mut second = Array3::<u32>::zeros((1, 2, 2));
        second[[0, 0, 1]] = 2;
        assert_eq!(relabeler.relabel(&mut second).unwrap(), 2);
        assert_eq!(second[[0, 0, 1]], 5);
        assert_eq!(second[[0, 0, 0]], 0);
        assert_eq!(relabeler.total(), 5);
    }

    #[test]
    fn test_relabeler_overflow() {
        let mut relabeler = LabelRelabeler::new();
        let mut big = Array3::<u32>::from_elem((1, 1, 1), u32::MAX - 1);
        relabeler.relabel(&mut big).unwrap();

        let mut more = Array3::<u32>::from_elem((1, 1, 1), 2);
        let err = relabeler.relabel(&mut more).unwrap_err();
        assert!(matches!(err, DomainError::LabelOverflow(_)));
        assert_eq!(more[[0, 0, 0]], 2);
    }
}
