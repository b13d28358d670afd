use crate::error::ConfigError;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Z,
    Y,
    X,
}

impl Axis {
    /// Axes in array order
    pub const ZYX: [Axis; 3] = [Axis::Z, Axis::Y, Axis::X];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Z => "Z",
            Axis::Y => "Y",
            Axis::X => "X",
        };
        f.write_str(name)
    }
}

/// What a ROI table describes. Only field-of-view and well tables are
/// bound to a zero origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    FieldOfView,
    Well,
    Image,
    Grid,
    BoundingBox,
    #[default]
    Other,
}

impl TableKind {
    /// Map a conventional table name onto its kind
    pub fn from_table_name(name: &str) -> Self {
        match name {
            "FOV_ROI_table" => TableKind::FieldOfView,
            "well_ROI_table" => TableKind::Well,
            "image_ROI_table" => TableKind::Image,
            "grid_ROI_table" => TableKind::Grid,
            _ => TableKind::Other,
        }
    }

    pub fn requires_zero_origin(&self) -> bool {
        matches!(self, TableKind::FieldOfView | TableKind::Well)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableKind::FieldOfView => "FOV_ROI_table",
            TableKind::Well => "well_ROI_table",
            TableKind::Image => "image_ROI_table",
            TableKind::Grid => "grid_ROI_table",
            TableKind::BoundingBox => "bounding-box ROI table",
            TableKind::Other => "ROI table",
        };
        f.write_str(name)
    }
}

/// True for `FOV_ROI_table`, `well_ROI_table` and names derived from them
/// (e.g. `registered_FOV_ROI_table`).
pub fn is_standard_roi_table(name: &str) -> bool {
    name.contains("well_ROI_table") || name.contains("FOV_ROI_table")
}

/// Version tag written alongside every table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableVersion {
    #[default]
    #[serde(rename = "1")]
    V1,
}

impl fmt::Display for TableVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableVersion::V1 => f.write_str("1"),
        }
    }
}

/// Segmentation models this crate knows how to drive. The set the
/// segmenter actually ships is checked at call time, see
/// [`SegmentationModel::validate_against`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SegmentationModel {
    Cyto,
    #[default]
    Cyto2,
    Nuclei,
    TissueNet,
    LiveCell,
    General,
    Cp,
    Cpx,
    Tn1,
    Tn2,
    Tn3,
    Lc1,
    Lc2,
    Lc3,
    Lc4,
}

impl SegmentationModel {
    pub const ALL: [SegmentationModel; 15] = [
        SegmentationModel::Cyto,
        SegmentationModel::Cyto2,
        SegmentationModel::Nuclei,
        SegmentationModel::TissueNet,
        SegmentationModel::LiveCell,
        SegmentationModel::General,
        SegmentationModel::Cp,
        SegmentationModel::Cpx,
        SegmentationModel::Tn1,
        SegmentationModel::Tn2,
        SegmentationModel::Tn3,
        SegmentationModel::Lc1,
        SegmentationModel::Lc2,
        SegmentationModel::Lc3,
        SegmentationModel::Lc4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationModel::Cyto => "cyto",
            SegmentationModel::Cyto2 => "cyto2",
            SegmentationModel::Nuclei => "nuclei",
            SegmentationModel::TissueNet => "tissuenet",
            SegmentationModel::LiveCell => "livecell",
            SegmentationModel::General => "general",
            SegmentationModel::Cp => "CP",
            SegmentationModel::Cpx => "CPx",
            SegmentationModel::Tn1 => "TN1",
            SegmentationModel::Tn2 => "TN2",
            SegmentationModel::Tn3 => "TN3",
            SegmentationModel::Lc1 => "LC1",
            SegmentationModel::Lc2 => "LC2",
            SegmentationModel::Lc3 => "LC3",
            SegmentationModel::Lc4 => "LC4",
        }
    }

    /// Fail unless the segmenter reports this model among its identifiers
    pub fn validate_against<S: AsRef<str>>(&self, reported: &[S]) -> Result<(), ConfigError> {
        if reported.iter().any(|id| id.as_ref() == self.as_str()) {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedModel(self.as_str().to_string()))
        }
    }
}

impl FromStr for SegmentationModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedModel(s.to_string()))
    }
}

impl TryFrom<String> for SegmentationModel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SegmentationModel> for String {
    fn from(model: SegmentationModel) -> Self {
        model.as_str().to_string()
    }
}

impl fmt::Display for SegmentationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
