//! FILENAME: pivot-engine/src/transforms.rs
//! PURPOSE: Registry of named transforms referenced from metadata.
//! CONTEXT: Metadata declares behavior by name (`"transform": "ratio"`). The
//! registry maps each name to a compiled function. Three kinds exist:
//! - calculated: one field of one record, may read the whole dataset and the
//!   previous calculated record
//! - pre-transform: reorders/reshapes the dataset handed to a calculated field
//! - dataset: reshapes the whole dataset (e.g. entity rows to a time series)

use crate::dates::bin_by_month;
use crate::error::{PivotError, TransformError};
use engine::{MetadataCatalog, Record, Value, SUM_RECORDS};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// TRANSFORM SIGNATURES
// ============================================================================

/// Arguments handed to a calculated-field transform.
#[derive(Debug, Clone, Copy)]
pub struct CalcArgs<'a> {
    /// The record so far, including fields calculated earlier in this pass.
    pub record: &'a Record,
    /// Aliases of the declared input fields.
    pub fields: &'a [String],
    /// The dataset, pre-transformed when the column declares a pre-transform.
    pub data: &'a [Record],
    /// The previous fully calculated record (empty for the first row).
    pub prev: &'a Record,
    /// Alias of the field being calculated.
    pub output: &'a str,
}

impl<'a> CalcArgs<'a> {
    /// Alias of the `index`th input field.
    pub fn field(&self, index: usize) -> Result<&'a str, TransformError> {
        self.fields
            .get(index)
            .map(String::as_str)
            .ok_or(TransformError::Arity {
                expected: index + 1,
                actual: self.fields.len(),
            })
    }

    /// Numeric value of the `index`th input field in the current record.
    pub fn number(&self, index: usize) -> Result<f64, TransformError> {
        let field = self.field(index)?;
        let value = self
            .record
            .get(field)
            .filter(|v| !v.is_null())
            .ok_or_else(|| TransformError::MissingField(field.to_string()))?;
        value
            .as_f64()
            .ok_or_else(|| TransformError::NotNumeric(field.to_string()))
    }
}

/// Per-column info handed to dataset transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericInfo {
    pub alias: String,
    pub subtype: Option<String>,
    pub calculated: bool,
}

/// Arguments handed to a dataset transform.
#[derive(Debug, Clone, Copy)]
pub struct DatasetArgs<'a> {
    /// Aliases of the dataset's `transformFields`.
    pub fields: &'a [String],
    /// Native column name -> alias, for every column.
    pub aliases: &'a BTreeMap<String, String>,
    /// Native column name -> info, for every numeric column.
    pub numerics: &'a BTreeMap<String, NumericInfo>,
}

pub type CalculatedFn = fn(&CalcArgs<'_>) -> Result<Value, TransformError>;
pub type PreTransformFn = fn(&[Record], &[String]) -> Vec<Record>;
pub type DatasetTransformFn = fn(&[Record], &DatasetArgs<'_>) -> Result<Vec<Record>, TransformError>;

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Clone, Default)]
pub struct TransformRegistry {
    calculated: HashMap<String, CalculatedFn>,
    pre_transforms: HashMap<String, PreTransformFn>,
    dataset: HashMap<String, DatasetTransformFn>,
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn names(mut names: Vec<&String>) -> Vec<&String> {
            names.sort();
            names
        }
        f.debug_struct("TransformRegistry")
            .field("calculated", &names(self.calculated.keys().collect()))
            .field("pre_transforms", &names(self.pre_transforms.keys().collect()))
            .field("dataset", &names(self.dataset.keys().collect()))
            .finish()
    }
}

impl TransformRegistry {
    /// A registry with no transforms at all.
    pub fn empty() -> Self {
        TransformRegistry::default()
    }

    /// A registry holding every built-in transform.
    pub fn with_builtins() -> Self {
        let mut registry = TransformRegistry::empty();
        registry
            .register_calculated("ratio", ratio)
            .register_calculated("percent", percent)
            .register_calculated("difference", difference)
            .register_calculated("sum", sum)
            .register_calculated("product", product)
            .register_calculated("cumulative", cumulative)
            .register_calculated("rank", rank)
            .register_calculated("percentile", percentile)
            .register_calculated("decile", decile)
            .register_pre_transform("sortAscending", sort_ascending)
            .register_pre_transform("sortDescending", sort_descending)
            .register_dataset("sortAscending", dataset_sort_ascending)
            .register_dataset("sortDescending", dataset_sort_descending)
            .register_dataset("monthlySeries", monthly_series);
        registry
    }

    pub fn register_calculated(&mut self, name: &str, f: CalculatedFn) -> &mut Self {
        self.calculated.insert(name.to_string(), f);
        self
    }

    pub fn register_pre_transform(&mut self, name: &str, f: PreTransformFn) -> &mut Self {
        self.pre_transforms.insert(name.to_string(), f);
        self
    }

    pub fn register_dataset(&mut self, name: &str, f: DatasetTransformFn) -> &mut Self {
        self.dataset.insert(name.to_string(), f);
        self
    }

    pub fn calculated(&self, name: &str) -> Option<CalculatedFn> {
        self.calculated.get(name).copied()
    }

    pub fn pre_transform(&self, name: &str) -> Option<PreTransformFn> {
        self.pre_transforms.get(name).copied()
    }

    pub fn dataset(&self, name: &str) -> Option<DatasetTransformFn> {
        self.dataset.get(name).copied()
    }

    /// Checks that every transform named by the dataset's metadata exists.
    pub fn validate(&self, catalog: &MetadataCatalog) -> Result<(), PivotError> {
        for (column, spec) in catalog.calculated_columns() {
            if self.calculated(&spec.transform).is_none() {
                return Err(PivotError::UnknownTransform {
                    column: column.name.clone(),
                    kind: "calculated",
                    name: spec.transform.clone(),
                });
            }
            if let Some(pre) = &spec.pre_transform {
                if self.pre_transform(pre).is_none() {
                    return Err(PivotError::UnknownTransform {
                        column: column.name.clone(),
                        kind: "pre",
                        name: pre.clone(),
                    });
                }
            }
        }
        if let Some(name) = &catalog.dataset().transform {
            if self.dataset(name).is_none() {
                return Err(PivotError::UnknownTransform {
                    column: catalog.dataset_name().to_string(),
                    kind: "dataset",
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// CALCULATED TRANSFORMS
// ============================================================================

fn ratio(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    let numerator = args.number(0)?;
    let denominator = args.number(1)?;
    if denominator == 0.0 {
        return Err(TransformError::DivisionByZero {
            numerator: args.field(0)?.to_string(),
            denominator: args.field(1)?.to_string(),
        });
    }
    Ok(Value::Number(numerator / denominator))
}

fn percent(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    match ratio(args)? {
        Value::Number(r) => Ok(Value::Number(r * 100.0)),
        other => Ok(other),
    }
}

fn difference(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    Ok(Value::Number(args.number(0)? - args.number(1)?))
}

fn sum(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    let mut total = 0.0;
    for i in 0..args.fields.len() {
        total += args.number(i)?;
    }
    Ok(Value::Number(total))
}

fn product(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    if args.fields.is_empty() {
        return Err(TransformError::Arity { expected: 1, actual: 0 });
    }
    let mut total = 1.0;
    for i in 0..args.fields.len() {
        total *= args.number(i)?;
    }
    Ok(Value::Number(total))
}

/// Running total of the first field, in row order.
fn cumulative(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    let previous = args.prev.get(args.output).and_then(Value::as_f64).unwrap_or(0.0);
    Ok(Value::Number(previous + args.number(0)?))
}

fn column_numbers(data: &[Record], field: &str) -> Vec<f64> {
    data.iter()
        .filter_map(|r| r.get(field).and_then(Value::as_f64))
        .filter(|n| !n.is_nan())
        .collect()
}

/// 1 for the largest value of the first field; ties share a rank.
fn rank(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    let value = args.number(0)?;
    let above = column_numbers(args.data, args.field(0)?)
        .into_iter()
        .filter(|n| *n > value)
        .count();
    Ok(Value::from((above + 1) as u64))
}

/// Share (0-100) of the dataset whose first field is below this record's.
fn percentile(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    let value = args.number(0)?;
    let numbers = column_numbers(args.data, args.field(0)?);
    if numbers.is_empty() {
        return Ok(Value::Null);
    }
    let below = numbers.iter().filter(|n| **n < value).count();
    Ok(Value::Number(100.0 * below as f64 / numbers.len() as f64))
}

/// Decile 1-10 derived from the percentile.
fn decile(args: &CalcArgs<'_>) -> Result<Value, TransformError> {
    match percentile(args)? {
        Value::Number(p) => Ok(Value::Number(((p / 10.0).floor() + 1.0).min(10.0))),
        other => Ok(other),
    }
}

// ============================================================================
// PRE-TRANSFORMS
// ============================================================================

/// Orders records by a numeric field; records without it sort last.
fn compare_by(field: &str, a: &Record, b: &Record) -> Ordering {
    let a = a.get(field).and_then(Value::as_f64);
    let b = b.get(field).and_then(Value::as_f64);
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sorted(data: &[Record], fields: &[String], descending: bool) -> Vec<Record> {
    let mut out = data.to_vec();
    if let Some(field) = fields.first() {
        out.sort_by(|a, b| {
            let ord = compare_by(field, a, b);
            let missing = |r: &Record| r.get(field).and_then(Value::as_f64).is_none();
            if descending && !missing(a) && !missing(b) {
                ord.reverse()
            } else {
                ord
            }
        });
    }
    out
}

fn sort_ascending(data: &[Record], fields: &[String]) -> Vec<Record> {
    sorted(data, fields, false)
}

fn sort_descending(data: &[Record], fields: &[String]) -> Vec<Record> {
    sorted(data, fields, true)
}

// ============================================================================
// DATASET TRANSFORMS
// ============================================================================

fn dataset_sort_ascending(data: &[Record], args: &DatasetArgs<'_>) -> Result<Vec<Record>, TransformError> {
    Ok(sorted(data, args.fields, false))
}

fn dataset_sort_descending(data: &[Record], args: &DatasetArgs<'_>) -> Result<Vec<Record>, TransformError> {
    Ok(sorted(data, args.fields, true))
}

/// Entity rows to a time series: one row per month of the first field, with
/// non-calculated numerics and the record count summed per month.
fn monthly_series(data: &[Record], args: &DatasetArgs<'_>) -> Result<Vec<Record>, TransformError> {
    let date_field = args
        .fields
        .first()
        .ok_or(TransformError::Arity { expected: 1, actual: 0 })?;
    let records_alias = args
        .aliases
        .get(SUM_RECORDS)
        .map(String::as_str)
        .unwrap_or(SUM_RECORDS);
    let summed: Vec<&str> = args
        .numerics
        .values()
        .filter(|info| !info.calculated && info.alias != records_alias)
        .map(|info| info.alias.as_str())
        .collect();

    // Keyed by month epoch millis so months come out in order.
    let mut months: BTreeMap<i64, Record> = BTreeMap::new();
    for row in data {
        let month = match bin_by_month(row.get(date_field).unwrap_or(&Value::Null)) {
            Value::Number(n) if n.is_finite() => n,
            _ => continue,
        };
        let out = months.entry(month as i64).or_insert_with(|| {
            let mut r = Record::new();
            r.insert(date_field.clone(), Value::Number(month));
            r
        });
        for alias in &summed {
            if let Some(v) = row.get(*alias) {
                let prev = out.get(*alias).map(Value::coerce_number).unwrap_or(0.0);
                out.insert(alias.to_string(), Value::Number(prev + v.coerce_number()));
            }
        }
        let count = row.get(records_alias).map(Value::coerce_number).unwrap_or(1.0);
        let prev = out.get(records_alias).map(Value::coerce_number).unwrap_or(0.0);
        out.insert(records_alias.to_string(), Value::Number(prev + count));
    }
    Ok(months.into_values().collect())
}
