use crate::{
    bounding_box::BoundingBoxExtractor,
    enums::{SegmentationModel, TableKind, TableVersion},
    error::{ConfigError, DomainError, RoiError},
    masked_region::{LabelRelabeler, MaskedRegion, Masking},
    overlap::OverlapTracker,
    roi::{PhysicalRoi, PixelIndexRange, PyramidGeometry, RoiTable},
    store::{ArrayStore, Segmenter},
    validator::check_zero_origin,
};

use ndarray::{Array3, Array4, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Options of a per-ROI segmentation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Pyramid level to segment at
    pub level: usize,
    /// Restrict each ROI to the object of the same label in the primary
    /// label array. Requires a bounding-box table.
    pub use_masks: bool,
    /// Make labels unique across ROIs
    pub relabeling: bool,
    pub model: SegmentationModel,
    /// Path to a custom model; takes precedence over `model`
    pub pretrained_model: Option<String>,
    /// Expected object diameter in pixels at level 0
    pub diameter_level0: f64,
    /// Z to XY pixel size ratio for 3D segmentation. Derived from the pixel
    /// sizes of the segmented level when unset.
    pub anisotropy: Option<f64>,
    pub cellprob_threshold: f64,
    pub flow_threshold: f64,
    /// Objects with fewer pixels are dropped by the model
    pub min_size: u32,
    pub augment: bool,
    pub net_avg: bool,
    pub table_version: TableVersion,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            level: 0,
            use_masks: false,
            relabeling: true,
            model: SegmentationModel::Cyto2,
            pretrained_model: None,
            diameter_level0: 30.0,
            anisotropy: None,
            cellprob_threshold: 0.0,
            flow_threshold: 0.4,
            min_size: 15,
            augment: false,
            net_avg: false,
            table_version: TableVersion::default(),
        }
    }
}

impl SegmentationConfig {
    /// Parameters handed to the segmenter for this level
    ///
    /// # Arguments
    ///
    /// * `geometry` - Pyramid the configured level belongs to
    /// * `depth` - Number of Z planes of the segmented array; more than one
    ///   plane means 3D segmentation
    ///
    /// # Errors
    ///
    /// Returns error if the anisotropy has to be derived but the Y and X
    /// pixel sizes differ
    pub fn params(
        &self,
        geometry: &PyramidGeometry,
        depth: usize,
    ) -> Result<SegmentationParams, ConfigError> {
        let scale = f64::from(geometry.coarsening_xy).powi(self.level as i32);
        let do_3d = depth > 1;
        let anisotropy = match self.anisotropy {
            None if do_3d => {
                let pixel_size = geometry.pixel_size_at(self.level);
                if (pixel_size.y - pixel_size.x).abs() > 1e-8 + 1e-5 * pixel_size.x.abs() {
                    return Err(ConfigError::AnisotropicXy {
                        y: pixel_size.y,
                        x: pixel_size.x,
                    });
                }
                Some(pixel_size.z / pixel_size.x)
            }
            anisotropy => anisotropy,
        };
        Ok(SegmentationParams {
            model: self.model,
            pretrained_model: self.pretrained_model.clone(),
            diameter: self.diameter_level0 / scale,
            do_3d,
            anisotropy,
            cellprob_threshold: self.cellprob_threshold,
            flow_threshold: self.flow_threshold,
            min_size: self.min_size,
            augment: self.augment,
            net_avg: self.net_avg,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationParams {
    pub model: SegmentationModel,
    pub pretrained_model: Option<String>,
    /// Expected object diameter in pixels at the segmented level
    pub diameter: f64,
    pub do_3d: bool,
    pub anisotropy: Option<f64>,
    pub cellprob_threshold: f64,
    pub flow_threshold: f64,
    pub min_size: u32,
    pub augment: bool,
    pub net_avg: bool,
}

/// Runs a segmenter ROI by ROI over a pyramid level and collects the
/// bounding boxes of the labels it finds
pub struct RoiSegmentation<'a, S: Segmenter> {
    config: SegmentationConfig,
    geometry: PyramidGeometry,
    segmenter: &'a S,
}

impl<'a, S: Segmenter> RoiSegmentation<'a, S> {
    pub fn new(config: SegmentationConfig, geometry: PyramidGeometry, segmenter: &'a S) -> Self {
        Self {
            config,
            geometry,
            segmenter,
        }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Segment every ROI of `rois` and write the labels into `output`.
    ///
    /// ROIs are processed one after the other in table order, so each output
    /// region has a single writer and later ROIs see what earlier ones wrote.
    /// Returns the bounding boxes of all new labels.
    ///
    /// # Arguments
    ///
    /// * `rois` - ROIs to segment, a bounding-box table when masking is on
    /// * `channels` - Intensity arrays at the configured level, one per channel
    /// * `primary_labels` - Label array the bounding-box table was built from,
    ///   needed when masking is on
    /// * `output` - Label array receiving the segmentation
    ///
    /// # Errors
    ///
    /// Returns error if the model is not offered by the segmenter and no
    /// pretrained model is given, if masking is requested without a
    /// bounding-box table and its label array, or if any ROI fails to
    /// convert, read, segment or write
    pub fn run<C: ArrayStore<f32>>(
        &self,
        rois: &RoiTable,
        channels: &[C],
        primary_labels: Option<&dyn ArrayStore<u32>>,
        output: &mut dyn ArrayStore<u32>,
    ) -> Result<RoiTable, RoiError> {
        match &self.config.pretrained_model {
            Some(path) => debug!("Using pretrained model {path}"),
            None => self.config.model.validate_against(&self.segmenter.model_ids())?,
        }
        if channels.is_empty() {
            return Err(ConfigError::NoChannels.into());
        }
        let primary_labels = if self.config.use_masks {
            if rois.kind() != TableKind::BoundingBox {
                return Err(ConfigError::NotAMaskingTable(rois.kind().to_string()).into());
            }
            Some(primary_labels.ok_or_else(|| {
                ConfigError::NotAMaskingTable("a table without its label array".to_string())
            })?)
        } else {
            None
        };

        let level = self.config.level;
        let ranges = self.geometry.to_pixel_indices(rois, level)?;
        check_zero_origin(&ranges, rois.kind())?;

        let pixel_size = self.geometry.pixel_size_at(level);
        let params = self.config.params(&self.geometry, output.shape()[0])?;
        let mut relabeler = LabelRelabeler::new();
        let mut tracker = OverlapTracker::new(pixel_size, TableKind::BoundingBox);

        for (index, (roi, range)) in rois.iter().zip(&ranges).enumerate() {
            info!("Now processing ROI {}/{} ({})", index + 1, rois.len(), roi.id);

            let intensity = Self::read_channels(channels, range)?;
            let (primary, prior) = match primary_labels {
                Some(store) => (Some(store.read_region(range)?), Some(output.read_region(range)?)),
                None => (None, None),
            };
            let masking = match (roi.label, &primary, &prior) {
                (Some(label_value), Some(primary), Some(prior)) => Masking::Enabled {
                    label_value,
                    primary: primary.view(),
                    prior_output: prior.view(),
                },
                _ => Masking::Disabled,
            };
            let (input, region) = MaskedRegion::prepare(intensity, masking)?;

            let mut labels = self.segmenter.segment(input.view(), &params)?;
            let (z, y, x) = labels.dim();
            if [z, y, x] != range.shape() {
                return Err(DomainError::ShapeMismatch {
                    left_name: "segmenter output",
                    left: [z, y, x],
                    right_name: "region",
                    right: range.shape(),
                }
                .into());
            }

            if self.config.relabeling {
                let count = relabeler.relabel(&mut labels)?;
                debug!("ROI {} produced {count} labels, {} in total", roi.id, relabeler.total());
            }

            let fresh = match region.foreground() {
                Some(foreground) => {
                    let mut fresh = labels.clone();
                    Zip::from(&mut fresh).and(&foreground).for_each(|label, &keep| {
                        if !keep {
                            *label = 0;
                        }
                    });
                    fresh
                }
                None => labels.clone(),
            };
            let boxes =
                BoundingBoxExtractor::extract(fresh.view(), pixel_size, range.start_zyx())?;
            let boxes = if self.config.relabeling {
                boxes
            } else {
                Self::prefix_ids(boxes, &roi.id)?
            };
            tracker.push_batch(&boxes)?;

            let labels = region.restore(labels)?;
            output.write_region(range, labels.view())?;
        }

        let table = tracker.into_table();
        info!("Segmentation found {} objects in {} ROIs", table.len(), rois.len());
        Ok(table)
    }

    fn read_channels<C: ArrayStore<f32>>(
        channels: &[C],
        range: &PixelIndexRange,
    ) -> Result<Array4<f32>, RoiError> {
        let [z, y, x] = range.shape();
        let mut intensity = Array4::<f32>::zeros((channels.len(), z, y, x));
        for (channel, mut target) in channels.iter().zip(intensity.outer_iter_mut()) {
            let data: Array3<f32> = channel.read_region(range)?;
            let (dz, dy, dx) = data.dim();
            if [dz, dy, dx] != [z, y, x] {
                return Err(DomainError::ShapeMismatch {
                    left_name: "channel region",
                    left: [dz, dy, dx],
                    right_name: "region",
                    right: [z, y, x],
                }
                .into());
            }
            target.assign(&data);
        }
        Ok(intensity)
    }

    /// Without relabeling, label values repeat across ROIs; the ROI id keeps
    /// the bounding-box ids unique
    fn prefix_ids(boxes: RoiTable, roi_id: &str) -> Result<RoiTable, ConfigError> {
        let rows = boxes
            .into_rows()
            .into_iter()
            .map(|row| PhysicalRoi {
                id: format!("{roi_id}_{}", row.id),
                ..row
            })
            .collect();
        RoiTable::new(TableKind::BoundingBox, rows)
    }
}
