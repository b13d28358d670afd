//! OME-NGFF 0.4 image metadata, reduced to what is needed to place ROIs on
//! a multiscale pyramid.

use crate::{
    error::{ConfigError, RoiError},
    roi::{PixelSize, PyramidGeometry},
};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AxisMeta {
    pub name: String,
    #[serde(rename = "type", default)]
    pub axis_type: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Dataset {
    pub path: String,
    #[serde(rename = "coordinateTransformations")]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Multiscale {
    #[serde(default)]
    pub name: Option<String>,
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub version: Option<String>,
    pub axes: Vec<AxisMeta>,
    #[serde(rename = "coordinateTransformations", default)]
    pub coordinate_transformations: Option<Vec<CoordinateTransformation>>,
}

/// Attributes of an OME-NGFF image group
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageMeta {
    pub multiscales: Vec<Multiscale>,
}

impl ImageMeta {
    /// Parse and validate image attributes (the `.zattrs` JSON document)
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed, if there is not exactly one
    /// multiscale, if it has global coordinate transformations or no
    /// datasets, if X or Y axes are missing, or if a dataset does not start
    /// with a scale transformation matching the axes
    pub fn from_json(json: &str) -> Result<Self, RoiError> {
        let meta: ImageMeta = serde_json::from_str(json)?;
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.multiscales.len() != 1 {
            return Err(ConfigError::UnsupportedNgff(format!(
                "only images with one multiscale are supported (given: {})",
                self.multiscales.len()
            )));
        }
        let multiscale = self.multiscale();
        if multiscale.coordinate_transformations.is_some() {
            return Err(ConfigError::UnsupportedNgff(
                "global coordinateTransformations at the multiscales level".to_string(),
            ));
        }
        if multiscale.datasets.is_empty() {
            return Err(ConfigError::UnsupportedNgff("multiscale has no datasets".to_string()));
        }
        for axis in ["x", "y"] {
            if self.axis_index(axis).is_none() {
                return Err(ConfigError::UnsupportedNgff(format!("missing {axis} axis")));
            }
        }
        for dataset in &multiscale.datasets {
            match dataset.coordinate_transformations.first() {
                Some(CoordinateTransformation::Scale { scale })
                    if scale.len() == multiscale.axes.len() => {}
                _ => {
                    return Err(ConfigError::UnsupportedNgff(format!(
                        "dataset {} does not start with a scale transformation over {} axes",
                        dataset.path,
                        multiscale.axes.len()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn multiscale(&self) -> &Multiscale {
        &self.multiscales[0]
    }

    pub fn num_levels(&self) -> usize {
        self.multiscale().datasets.len()
    }

    fn axis_index(&self, name: &str) -> Option<usize> {
        self.multiscale().axes.iter().position(|axis| axis.name == name)
    }

    /// ZYX pixel sizes of every level. Images without a Z axis get a Z
    /// pixel size of 1.
    pub fn pixel_sizes_zyx(&self) -> Vec<PixelSize> {
        let x_index = self.axis_index("x");
        let y_index = self.axis_index("y");
        let z_index = self.axis_index("z");
        if z_index.is_none() {
            warn!("Z axis is not present, Z pixel size is set to 1");
        }

        self.multiscale()
            .datasets
            .iter()
            .map(|dataset| {
                let scale: &[f64] = match dataset.coordinate_transformations.first() {
                    Some(CoordinateTransformation::Scale { scale }) => scale.as_slice(),
                    _ => &[],
                };
                let at = |index: Option<usize>| index.and_then(|i| scale.get(i).copied());
                PixelSize::new(
                    at(z_index).unwrap_or(1.0),
                    at(y_index).unwrap_or(1.0),
                    at(x_index).unwrap_or(1.0),
                )
            })
            .collect()
    }

    /// Linear X/Y coarsening factor between consecutive levels. A single
    /// level pyramid reports a factor of 1.
    ///
    /// # Errors
    ///
    /// Returns error if X and Y are coarsened differently, or if the factor
    /// changes from one level to the next
    pub fn coarsening_xy(&self) -> Result<u32, ConfigError> {
        let sizes = self.pixel_sizes_zyx();
        let mut current: Option<u32> = None;
        for pair in sizes.windows(2) {
            let ratio_x = (pair[1].x / pair[0].x).round() as u32;
            let ratio_y = (pair[1].y / pair[0].y).round() as u32;
            if ratio_x != ratio_y {
                return Err(ConfigError::InhomogeneousCoarsening(format!(
                    "X/Y ratios {ratio_x} and {ratio_y} differ, pixel sizes {sizes:?}"
                )));
            }
            match current {
                None => current = Some(ratio_x),
                Some(ratio) if ratio != ratio_x => {
                    return Err(ConfigError::InhomogeneousCoarsening(format!(
                        "ratio changes across levels, pixel sizes {sizes:?}"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(current.unwrap_or(1))
    }

    pub fn pyramid_geometry(&self) -> Result<PyramidGeometry, ConfigError> {
        let full_res = self
            .pixel_sizes_zyx()
            .first()
            .copied()
            .ok_or_else(|| ConfigError::UnsupportedNgff("multiscale has no datasets".to_string()))?;
        PyramidGeometry::new(full_res, self.coarsening_xy()?)
    }
}
