use crate::{
    enums::{TableKind, TableVersion},
    error::{ConfigError, RoiError},
    roi::{PhysicalRoi, RoiTable},
    store::TableStore,
};

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fs, path::PathBuf};
use tracing::{debug, info, warn};

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "x_micrometer",
    "y_micrometer",
    "z_micrometer",
    "len_x_micrometer",
    "len_y_micrometer",
    "len_z_micrometer",
];
pub const ORIGINAL_COLUMNS: [&str; 2] = ["x_micrometer_original", "y_micrometer_original"];
pub const LABEL_COLUMN: &str = "label";

const ROW_ID_HEADER: &str = "roi_id";

const MASKING_TABLE_TYPES: [&str; 2] = ["masking_roi_table", "ngff:region_table"];
const KNOWN_TABLE_TYPES: [&str; 4] = [
    "roi_table",
    "masking_roi_table",
    "ngff:region_table",
    "feature_table",
];

/// Columns whose values are numbers in every ROI table
fn is_numeric_column(name: &str) -> bool {
    REQUIRED_COLUMNS.contains(&name) || ORIGINAL_COLUMNS.contains(&name) || name == LABEL_COLUMN
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(values) => values.len(),
            ColumnValues::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn text_at(&self, row: usize) -> String {
        match self {
            ColumnValues::Numeric(values) => values[row].to_string(),
            ColumnValues::Text(values) => values[row].clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }
}

/// Rows addressed by id, columns addressed by name. This is the shape in
/// which tables come in from and go out to a table store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnTable {
    row_ids: Vec<String>,
    columns: Vec<Column>,
}

impl ColumnTable {
    /// # Errors
    ///
    /// Returns error if a column does not have one value per row
    pub fn new(row_ids: Vec<String>, columns: Vec<Column>) -> Result<Self, ConfigError> {
        for column in &columns {
            if column.values.len() != row_ids.len() {
                return Err(ConfigError::ColumnLength {
                    column: column.name.clone(),
                    found: column.values.len(),
                    expected: row_ids.len(),
                });
            }
        }
        Ok(Self { row_ids, columns })
    }

    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    fn numeric(&self, name: &str) -> Result<Option<&[f64]>, ConfigError> {
        match self.column(name).map(|column| &column.values) {
            None => Ok(None),
            Some(ColumnValues::Numeric(values)) => Ok(Some(values)),
            Some(ColumnValues::Text(_)) => {
                Err(ConfigError::NonNumericColumn(name.to_string()))
            }
        }
    }

    fn required(&self, name: &str) -> Result<&[f64], ConfigError> {
        self.numeric(name)?
            .ok_or_else(|| ConfigError::MissingColumn(name.to_string()))
    }
}

fn parse_label(roi_id: &str, value: f64) -> Result<u32, ConfigError> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as u32)
    } else {
        Err(ConfigError::InvalidLabel {
            roi_id: roi_id.to_string(),
            value,
        })
    }
}

impl RoiTable {
    /// Read a ROI table from its column form.
    ///
    /// The six position/length columns are required; the `*_original` and
    /// `label` columns are picked up when present, any other column is kept
    /// as string metadata.
    pub fn from_columns(table: &ColumnTable, kind: TableKind) -> Result<Self, ConfigError> {
        let [x, y, z, len_x, len_y, len_z] = REQUIRED_COLUMNS.map(|name| table.required(name));
        let (x, y, z, len_x, len_y, len_z) = (x?, y?, z?, len_x?, len_y?, len_z?);
        let x_original = table.numeric(ORIGINAL_COLUMNS[0])?;
        let y_original = table.numeric(ORIGINAL_COLUMNS[1])?;
        let labels = table.numeric(LABEL_COLUMN)?;

        let extra: Vec<&Column> = table
            .columns()
            .iter()
            .filter(|column| !is_numeric_column(&column.name))
            .collect();

        let rows = table
            .row_ids()
            .iter()
            .enumerate()
            .map(|(row, id)| {
                let label = labels.map(|values| parse_label(id, values[row])).transpose()?;
                Ok(PhysicalRoi {
                    id: id.clone(),
                    x: x[row],
                    y: y[row],
                    z: z[row],
                    len_x: len_x[row],
                    len_y: len_y[row],
                    len_z: len_z[row],
                    x_original: x_original.map(|values| values[row]),
                    y_original: y_original.map(|values| values[row]),
                    label,
                    metadata: extra
                        .iter()
                        .map(|column| (column.name.clone(), column.values.text_at(row)))
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        RoiTable::new(kind, rows)
    }

    /// Column form of the table.
    ///
    /// Bounding-box tables always get a `label` column, and FOV, well, image
    /// and grid tables always get the `*_original` columns, even with zero
    /// rows. Other tables get them when every row has a value. Metadata keys
    /// missing on a row become empty strings.
    pub fn to_columns(&self) -> ColumnTable {
        let rows = self.rows();
        let numeric = |name: &str, get: fn(&PhysicalRoi) -> f64| {
            Column::numeric(name, rows.iter().map(get).collect())
        };

        let mut columns = vec![
            numeric("x_micrometer", |roi| roi.x),
            numeric("y_micrometer", |roi| roi.y),
            numeric("z_micrometer", |roi| roi.z),
            numeric("len_x_micrometer", |roi| roi.len_x),
            numeric("len_y_micrometer", |roi| roi.len_y),
            numeric("len_z_micrometer", |roi| roi.len_z),
        ];

        let kind = self.kind();
        let has_originals = matches!(
            kind,
            TableKind::FieldOfView | TableKind::Well | TableKind::Image | TableKind::Grid
        );
        let originals: Option<Vec<(f64, f64)>> = rows
            .iter()
            .map(|roi| roi.x_original.zip(roi.y_original))
            .collect();
        if let Some(originals) = originals.filter(|values| has_originals || !values.is_empty()) {
            columns.push(Column::numeric(
                ORIGINAL_COLUMNS[0],
                originals.iter().map(|(x, _)| *x).collect(),
            ));
            columns.push(Column::numeric(
                ORIGINAL_COLUMNS[1],
                originals.iter().map(|(_, y)| *y).collect(),
            ));
        }

        let has_labels = kind == TableKind::BoundingBox;
        let labels: Option<Vec<f64>> = rows.iter().map(|roi| roi.label.map(f64::from)).collect();
        if let Some(labels) = labels.filter(|values| has_labels || !values.is_empty()) {
            columns.push(Column::numeric(LABEL_COLUMN, labels));
        }

        let keys: BTreeSet<&String> = rows.iter().flat_map(|roi| roi.metadata.keys()).collect();
        for key in keys {
            let values = rows
                .iter()
                .map(|roi| roi.metadata.get(key).cloned().unwrap_or_default())
                .collect();
            columns.push(Column::text(key.clone(), values));
        }

        ColumnTable {
            row_ids: rows.iter().map(|roi| roi.id.clone()).collect(),
            columns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    pub path: String,
}

/// Attributes stored next to a table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableAttrs {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub table_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<TableRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_key: Option<String>,
    #[serde(default)]
    pub table_version: TableVersion,
}

impl TableAttrs {
    pub fn roi_table(version: TableVersion) -> Self {
        Self {
            table_type: Some("roi_table".to_string()),
            table_version: version,
            ..Default::default()
        }
    }

    /// Attributes of a bounding-box table whose `label` column refers to
    /// the label image at `label_path`
    pub fn masking_roi_table(label_path: impl Into<String>, version: TableVersion) -> Self {
        Self {
            table_type: Some("masking_roi_table".to_string()),
            region: Some(TableRegion {
                path: label_path.into(),
            }),
            instance_key: Some(LABEL_COLUMN.to_string()),
            table_version: version,
        }
    }

    fn is_masking_type(&self) -> bool {
        self.table_type
            .as_deref()
            .is_some_and(|table_type| MASKING_TABLE_TYPES.contains(&table_type))
    }

    /// Check attributes before a table is written under `name`.
    ///
    /// Masking and feature tables missing `region.path` or `instance_key`, and
    /// unknown table types, are written anyway with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if the attributes have no `type`
    pub fn check_for_write(&self, name: &str) -> Result<(), ConfigError> {
        let Some(table_type) = self.table_type.as_deref() else {
            return Err(ConfigError::MissingTableType(name.to_string()));
        };
        if !KNOWN_TABLE_TYPES.contains(&table_type) {
            warn!("Unknown table type `{table_type}` for table `{name}`");
        } else if table_type != "roi_table"
            && (self.region.is_none() || self.instance_key.is_none())
        {
            warn!(
                "Attributes of table `{name}` ({table_type}) do not comply with \
                 the table specification: `region.path` and `instance_key` are required"
            );
        }
        Ok(())
    }

    /// Whether the table can drive masked segmentation
    pub fn is_valid_masking_table(&self) -> bool {
        let type_ok = match self.table_type.as_deref() {
            Some("masking_roi_table") => true,
            Some("ngff:region_table") => {
                warn!(
                    "Table type `ngff:region_table` is currently accepted for masked loading, \
                     but will be deprecated in the future. \
                     Please switch to type `masking_roi_table`."
                );
                true
            }
            _ => false,
        };
        let valid = type_ok && self.region.is_some() && self.instance_key.is_some();
        if valid {
            info!("ROI table can be used for masked loading");
        } else {
            info!("ROI table cannot be used for masked loading");
        }
        valid
    }
}

/// Read a table by name and convert it into a ROI table.
///
/// Tables without a standard name are read as bounding-box tables if they
/// have a `label` column or masking-table attributes.
pub fn read_roi_table(
    store: &impl TableStore,
    name: &str,
) -> Result<(RoiTable, TableAttrs), RoiError> {
    let (columns, attrs) = store.read_table(name)?;
    let mut kind = TableKind::from_table_name(name);
    if kind == TableKind::Other
        && (columns.column(LABEL_COLUMN).is_some() || attrs.is_masking_type())
    {
        kind = TableKind::BoundingBox;
    }
    debug!("Reading ROI table `{name}` ({kind}, version {})", attrs.table_version);
    Ok((RoiTable::from_columns(&columns, kind)?, attrs))
}

pub fn write_roi_table(
    store: &mut impl TableStore,
    name: &str,
    table: &RoiTable,
    attrs: &TableAttrs,
    overwrite: bool,
) -> Result<(), RoiError> {
    store.write_table(name, &table.to_columns(), attrs, overwrite)
}

/// Table store backed by a directory: `<name>.csv` holds the rows,
/// `<name>.attrs.json` the attributes
#[derive(Debug, Clone)]
pub struct CsvTableStore {
    root: PathBuf,
}

impl CsvTableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.csv"))
    }

    fn attrs_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.attrs.json"))
    }

    /// Columns of ROI coordinates and labels are parsed as numbers; every
    /// other column is kept verbatim
    fn parse_columns(headers: &[String], records: &[Vec<String>]) -> Vec<Column> {
        headers
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let raw: Vec<String> = records.iter().map(|record| record[index].clone()).collect();
                if !is_numeric_column(name) {
                    return Column::text(name.clone(), raw);
                }
                let parsed: Result<Vec<f64>, _> = raw.iter().map(|value| value.parse()).collect();
                match parsed {
                    Ok(values) => Column::numeric(name.clone(), values),
                    Err(_) => Column::text(name.clone(), raw),
                }
            })
            .collect()
    }
}

impl TableStore for CsvTableStore {
    fn read_table(&self, name: &str) -> Result<(ColumnTable, TableAttrs), RoiError> {
        let path = self.csv_path(name);
        if !path.exists() {
            return Err(ConfigError::TableNotFound(name.to_string()).into());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.first().map(String::as_str) != Some(ROW_ID_HEADER) {
            return Err(ConfigError::MissingColumn(ROW_ID_HEADER.to_string()).into());
        }

        let mut row_ids = Vec::new();
        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut fields = record.iter().map(str::to_string);
            row_ids.push(fields.next().unwrap_or_default());
            records.push(fields.collect::<Vec<_>>());
        }

        let columns = Self::parse_columns(&headers[1..], &records);
        let table = ColumnTable::new(row_ids, columns)?;

        let attrs_path = self.attrs_path(name);
        let attrs: TableAttrs = if attrs_path.exists() {
            serde_json::from_str(&fs::read_to_string(attrs_path)?)?
        } else {
            TableAttrs::default()
        };
        Ok((table, attrs))
    }

    fn write_table(
        &mut self,
        name: &str,
        table: &ColumnTable,
        attrs: &TableAttrs,
        overwrite: bool,
    ) -> Result<(), RoiError> {
        attrs.check_for_write(name)?;
        let csv_path = self.csv_path(name);
        if !overwrite && csv_path.exists() {
            return Err(ConfigError::TableExists(name.to_string()).into());
        }
        fs::create_dir_all(&self.root)?;

        let mut writer = csv::Writer::from_path(csv_path)?;
        let mut header = vec![ROW_ID_HEADER.to_string()];
        header.extend(table.columns().iter().map(|column| column.name.clone()));
        writer.write_record(&header)?;
        for (row, id) in table.row_ids().iter().enumerate() {
            let mut record = vec![id.clone()];
            record.extend(table.columns().iter().map(|column| column.values.text_at(row)));
            writer.write_record(&record)?;
        }
        writer.flush()?;

        fs::write(self.attrs_path(name), serde_json::to_string_pretty(attrs)?)?;
        debug!("Wrote table `{name}` with {} rows", table.num_rows());
        Ok(())
    }
}
