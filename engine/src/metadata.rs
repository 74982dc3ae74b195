//! FILENAME: engine/src/metadata.rs
//! PURPOSE: The Metadata Catalog - column descriptors for every dataset.
//! CONTEXT: Metadata is loaded once from a JSON document. Selecting a dataset
//! yields a `MetadataCatalog`, an immutable per-dataset context that is passed
//! explicitly into every pipeline call. Nothing here is mutated after load.

use crate::number_format::{format_number, NumberFormat};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Native name (and default alias) of the synthetic record-count column.
pub const SUM_RECORDS: &str = "# Records";

/// Suffix appended to a numeric alias to name its per-record average.
pub const AVG_SUFFIX: &str = " (Avg)";

/// User filter: column name -> allowed values (as display strings).
pub type Filter = BTreeMap<String, Vec<String>>;

/// Distinct values per categorical column, keyed by native column name.
pub type CategoricalValues = BTreeMap<String, Vec<String>>;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error reading metadata: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dataset \"{0}\" does not exist")]
    UnknownDataset(String),

    #[error("Dataset \"{dataset}\" declares column \"{column}\" more than once")]
    DuplicateColumn { dataset: String, column: String },

    #[error("Dataset \"{dataset}\": {message}")]
    InvalidDefinition { dataset: String, message: String },
}

// ============================================================================
// COLUMN DESCRIPTORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    Categorical,
    DateString,
    IsoDate,
    Date,
    Vector,
    Singleton,
}

/// Boolean tags a column may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnFlag {
    NoAxis,
    NoXAxis,
    NoYAxis,
    NoColor,
    NoRadius,
    NoPareto,
    NoWhatIf,
    NoAverage,
    NoAggregate,
    NoSummary,
    Datapoint,
    Animation,
    Summary,
    UseFormat,
    Searchable,
    Geo,
}

/// How a datapoint column's values are bucketed before grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Binner {
    ByMonth,
}

/// Declaration of a calculated field. `transform` and `pre_transform` are
/// symbolic names resolved against the transform registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedSpec {
    #[serde(default)]
    pub fields: Vec<String>,
    pub transform: String,
    #[serde(default)]
    pub pre_transform: Option<String>,
    #[serde(default)]
    pub idx: i32,
}

/// Per-axis default selection. `"self"` selects the column itself; any other
/// value selects the categorical count `"<alias>:<value>"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisDefaults {
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub radius: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub flags: BTreeSet<ColumnFlag>,
    #[serde(default)]
    pub calculated: Option<CalculatedSpec>,
    /// Output column for DateString normalization.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    /// When non-empty, the column is only offered with these datapoints.
    #[serde(default)]
    pub only_with_datapoint: Vec<String>,
    /// Singleton carry-over: the datapoint it applies to, or "" for all.
    #[serde(default)]
    pub singleton: Option<String>,
    /// What-if header that redistributes this column.
    #[serde(default)]
    pub what_if_target: Option<String>,
    #[serde(default)]
    pub format: Option<NumberFormat>,
    #[serde(default)]
    pub binner: Option<Binner>,
    /// Label used in the datapoint ("Aggregate By") control.
    #[serde(default)]
    pub datapoint_alias: Option<String>,
    #[serde(default)]
    pub defaults: AxisDefaults,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnDescriptor {
            name: name.into(),
            alias: None,
            column_type,
            flags: BTreeSet::new(),
            calculated: None,
            output: None,
            subtype: None,
            only_with_datapoint: Vec::new(),
            singleton: None,
            what_if_target: None,
            format: None,
            binner: None,
            datapoint_alias: None,
            defaults: AxisDefaults::default(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_flag(mut self, flag: ColumnFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_calculated(mut self, spec: CalculatedSpec) -> Self {
        self.calculated = Some(spec);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_singleton(mut self, datapoint: impl Into<String>) -> Self {
        self.singleton = Some(datapoint.into());
        self
    }

    pub fn with_what_if_target(mut self, header: impl Into<String>) -> Self {
        self.what_if_target = Some(header.into());
        self
    }

    pub fn with_format(mut self, format: NumberFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_binner(mut self, binner: Binner) -> Self {
        self.binner = Some(binner);
        self
    }

    pub fn only_with(mut self, datapoints: &[&str]) -> Self {
        self.only_with_datapoint = datapoints.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn has_flag(&self, flag: ColumnFlag) -> bool {
        self.flags.contains(&flag)
    }
}

// ============================================================================
// DATASET METADATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMeta {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    /// Dataset-level reshape hook (symbolic name).
    #[serde(default)]
    pub transform: Option<String>,
    #[serde(default)]
    pub transform_fields: Vec<String>,
    /// Fixed datapoint column (used by synthetic datasets).
    #[serde(default)]
    pub datapoint_col: Option<String>,
    /// For synthetic datasets: the dataset they are derived from.
    #[serde(default)]
    pub actual_dataset: Option<String>,
    /// Filter applied when the dataset is first opened.
    #[serde(default)]
    pub filters: Filter,
}

impl DatasetMeta {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        DatasetMeta {
            name: name.into(),
            alias: None,
            columns,
            transform: None,
            transform_fields: Vec::new(),
            datapoint_col: None,
            actual_dataset: None,
            filters: Filter::new(),
        }
    }

    fn validate(&self) -> Result<(), MetadataError> {
        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(MetadataError::DuplicateColumn {
                    dataset: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        for column in &self.columns {
            if let Some(output) = &column.output {
                if !seen.contains(output.as_str()) {
                    return Err(MetadataError::InvalidDefinition {
                        dataset: self.name.clone(),
                        message: format!(
                            "column \"{}\" outputs to undeclared column \"{}\"",
                            column.name, output
                        ),
                    });
                }
            }
        }
        if let Some(dp) = &self.datapoint_col {
            if !seen.contains(dp.as_str()) {
                return Err(MetadataError::InvalidDefinition {
                    dataset: self.name.clone(),
                    message: format!("datapoint column \"{}\" is not declared", dp),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// CATALOG (per-dataset context)
// ============================================================================

/// Read-only view of one dataset's metadata. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MetadataCatalog {
    meta: Arc<DatasetMeta>,
    by_name: Arc<HashMap<String, usize>>,
}

impl MetadataCatalog {
    pub fn new(meta: DatasetMeta) -> Result<Self, MetadataError> {
        meta.validate()?;
        Ok(Self::from_validated(Arc::new(meta)))
    }

    fn from_validated(meta: Arc<DatasetMeta>) -> Self {
        let by_name = meta
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        MetadataCatalog {
            meta,
            by_name: Arc::new(by_name),
        }
    }

    pub fn dataset(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn dataset_name(&self) -> &str {
        &self.meta.name
    }

    pub fn column(&self, col: &str) -> Option<&ColumnDescriptor> {
        self.by_name.get(col).map(|&i| &self.meta.columns[i])
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.meta.columns
    }

    /// Display name for a column; falls back to the column name itself.
    pub fn get_alias<'a>(&'a self, col: &'a str) -> &'a str {
        self.column(col).map(ColumnDescriptor::alias).unwrap_or(col)
    }

    /// Label used in the datapoint control.
    pub fn get_datapoint_alias<'a>(&'a self, col: &'a str) -> &'a str {
        match self.column(col) {
            Some(c) => c.datapoint_alias.as_deref().unwrap_or_else(|| c.alias()),
            None => col,
        }
    }

    /// Alias of the record-count column.
    pub fn sum_records_alias(&self) -> &str {
        self.get_alias(SUM_RECORDS)
    }

    pub fn has_flag(&self, col: &str, flag: ColumnFlag) -> bool {
        self.column(col).is_some_and(|c| c.has_flag(flag))
    }

    pub fn has_type(&self, col: &str, column_type: ColumnType) -> bool {
        self.column(col).is_some_and(|c| c.column_type == column_type)
    }

    pub fn column_type(&self, col: &str) -> Option<ColumnType> {
        self.column(col).map(|c| c.column_type)
    }

    /// A column restricted with `onlyWithDatapoint` is only offered while one
    /// of its listed datapoints is active.
    pub fn is_allowed_for_datapoint(&self, datapoint: Option<&str>, col: &str) -> bool {
        match self.column(col) {
            Some(c) if !c.only_with_datapoint.is_empty() => {
                datapoint.is_some_and(|dp| c.only_with_datapoint.iter().any(|d| d == dp))
            }
            _ => true,
        }
    }

    pub fn columns_with_flag(&self, flag: ColumnFlag) -> Vec<&str> {
        self.meta
            .columns
            .iter()
            .filter(|c| c.has_flag(flag))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn columns_of_type(&self, column_type: ColumnType) -> Vec<&str> {
        self.meta
            .columns
            .iter()
            .filter(|c| c.column_type == column_type)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn all_columns(&self) -> Vec<&str> {
        self.meta.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn non_calculated_columns(&self) -> Vec<&str> {
        self.meta
            .columns
            .iter()
            .filter(|c| c.calculated.is_none())
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn numerics(&self) -> Vec<&str> {
        self.columns_of_type(ColumnType::Numeric)
    }

    pub fn categoricals(&self) -> Vec<&str> {
        self.columns_of_type(ColumnType::Categorical)
    }

    pub fn vectors(&self) -> Vec<&str> {
        self.columns_of_type(ColumnType::Vector)
    }

    /// Numeric columns that are summed during aggregation and averaged after
    /// it: not calculated, not singletons, not flagged `noAverage`.
    pub fn averageable_numerics(&self) -> Vec<&str> {
        self.meta
            .columns
            .iter()
            .filter(|c| {
                c.column_type == ColumnType::Numeric
                    && c.name != SUM_RECORDS
                    && c.calculated.is_none()
                    && c.singleton.is_none()
                    && !c.has_flag(ColumnFlag::NoAverage)
            })
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Categorical columns whose value distribution is counted per group.
    pub fn aggregate_categoricals(&self) -> Vec<&str> {
        self.meta
            .columns
            .iter()
            .filter(|c| {
                c.column_type == ColumnType::Categorical && !c.has_flag(ColumnFlag::NoAggregate)
            })
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn searchable(&self) -> Vec<&str> {
        self.columns_with_flag(ColumnFlag::Searchable)
    }

    /// Singleton columns for `datapoint`: those declared for it plus those
    /// declared for every datapoint (empty singleton value).
    pub fn singleton_columns(&self, datapoint: &str) -> Vec<&str> {
        let for_datapoint = self
            .meta
            .columns
            .iter()
            .filter(|c| c.singleton.as_deref() == Some(datapoint) && !datapoint.is_empty());
        let for_all = self
            .meta
            .columns
            .iter()
            .filter(|c| c.singleton.as_deref() == Some(""));
        for_datapoint
            .chain(for_all)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn calculated_columns(&self) -> Vec<(&ColumnDescriptor, &CalculatedSpec)> {
        self.meta
            .columns
            .iter()
            .filter_map(|c| c.calculated.as_ref().map(|spec| (c, spec)))
            .collect()
    }

    /// Reverse map of the `whatIfTarget` attribute: header -> target columns.
    pub fn what_if_reverse_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for c in &self.meta.columns {
            if let Some(header) = &c.what_if_target {
                map.entry(header.clone()).or_default().push(c.name.clone());
            }
        }
        map
    }

    pub fn binner(&self, col: &str) -> Option<Binner> {
        self.column(col).and_then(|c| c.binner)
    }

    /// Declared output column of a DateString column.
    pub fn date_output_col(&self, col: &str) -> Option<&str> {
        self.column(col)
            .filter(|c| c.column_type == ColumnType::DateString)
            .and_then(|c| c.output.as_deref())
            .filter(|o| !o.is_empty())
    }

    pub fn geo_columns(&self) -> Vec<&str> {
        self.columns_with_flag(ColumnFlag::Geo)
    }

    /// The dataset-level transform and its input fields, if declared.
    pub fn dataset_transform(&self) -> Option<(&str, &[String])> {
        match &self.meta.transform {
            Some(t) if !self.meta.transform_fields.is_empty() => {
                Some((t.as_str(), self.meta.transform_fields.as_slice()))
            }
            _ => None,
        }
    }

    /// Datapoint to use when the dataset is opened: the dataset's fixed
    /// datapoint, else the first column flagged `datapoint`.
    pub fn default_datapoint(&self) -> Option<&str> {
        self.meta
            .datapoint_col
            .as_deref()
            .or_else(|| self.columns_with_flag(ColumnFlag::Datapoint).into_iter().next())
    }

    pub fn default_filter(&self) -> &Filter {
        &self.meta.filters
    }

    /// Display form of `value` for column `col` (the `useFormat` conversion).
    /// Non-numeric values and columns without a format pass through.
    pub fn format_value(&self, col: &str, value: &Value) -> Value {
        let format = self.column(col).and_then(|c| c.format.as_ref());
        match (format, value.as_f64()) {
            (Some(fmt), Some(n)) => Value::Text(format_number(n, fmt)),
            _ => value.clone(),
        }
    }
}

// ============================================================================
// REGISTRY (all datasets)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    #[serde(default)]
    default_dataset: Option<String>,
    datasets: Vec<DatasetMeta>,
}

/// Every dataset known to the dashboard, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    datasets: Vec<Arc<DatasetMeta>>,
    default_dataset: Option<String>,
}

impl MetadataRegistry {
    pub fn new(datasets: Vec<DatasetMeta>) -> Result<Self, MetadataError> {
        for d in &datasets {
            d.validate()?;
        }
        Ok(MetadataRegistry {
            datasets: datasets.into_iter().map(Arc::new).collect(),
            default_dataset: None,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, MetadataError> {
        let doc: MetadataDocument = serde_json::from_str(json)?;
        let mut registry = Self::new(doc.datasets)?;
        if let Some(default) = doc.default_dataset {
            if !registry.contains(&default) {
                return Err(MetadataError::UnknownDataset(default));
            }
            registry.default_dataset = Some(default);
        }
        Ok(registry)
    }

    pub fn from_path(path: &Path) -> Result<Self, MetadataError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.datasets.iter().any(|d| d.name == dataset)
    }

    /// The per-dataset context for `dataset`.
    pub fn catalog(&self, dataset: &str) -> Result<MetadataCatalog, MetadataError> {
        self.datasets
            .iter()
            .find(|d| d.name == dataset)
            .map(|d| MetadataCatalog::from_validated(Arc::clone(d)))
            .ok_or_else(|| MetadataError::UnknownDataset(dataset.to_string()))
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|d| d.name.as_str())
    }

    /// Datasets offered to the user; synthetic datasets are hidden.
    pub fn selectable_datasets(&self) -> Vec<&DatasetMeta> {
        self.datasets
            .iter()
            .filter(|d| d.actual_dataset.is_none())
            .map(|d| d.as_ref())
            .collect()
    }

    pub fn default_dataset(&self) -> Option<&str> {
        self.default_dataset
            .as_deref()
            .or_else(|| self.datasets.first().map(|d| d.name.as_str()))
    }
}
