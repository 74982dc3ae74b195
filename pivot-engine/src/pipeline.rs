//! FILENAME: pivot-engine/src/pipeline.rs
//! Pivot Transform Pipeline - turns pivoted rows into chart-ready rows.
//!
//! Stages, in order (each one only adds or replaces fields):
//! 1. What-if redistribution from the Load Table
//! 2. DateString normalization to epoch milliseconds
//! 3. Per-record averages of summed numerics
//! 4. Counts of distinct categorical values per variable
//! 5. Dataset-level transform
//! 6. Display formats for `useFormat` columns
//! 7. Calculated fields
//!
//! The pipeline is a pure function of its inputs and never drops a row.

use crate::dates::normalize_date_value;
use crate::definition::LoadTable;
use crate::error::TransformError;
use crate::transforms::{CalcArgs, DatasetArgs, NumericInfo, TransformRegistry};
use crate::whatif::redistribute;
use engine::{
    CalculatedSpec, ColumnDescriptor, ColumnFlag, ColumnType, MetadataCatalog, Record, Value, AVG_SUFFIX,
};
use std::collections::{BTreeMap, BTreeSet};

/// A calculated column resolved for one pass.
#[derive(Clone)]
struct CalcColumn<'a> {
    alias: String,
    name: &'a str,
    field_aliases: Vec<String>,
    transform: &'a str,
    idx: i32,
}

/// Runs the transform stages for one dataset.
pub struct PivotPipeline<'a> {
    catalog: &'a MetadataCatalog,
    registry: &'a TransformRegistry,
}

impl<'a> PivotPipeline<'a> {
    pub fn new(catalog: &'a MetadataCatalog, registry: &'a TransformRegistry) -> Self {
        PivotPipeline { catalog, registry }
    }

    /// Produces Processed Records from pivoted (or raw) records.
    pub fn process(
        &self,
        data: Vec<Record>,
        load_table: Option<&LoadTable>,
        datapoint: Option<&str>,
    ) -> Vec<Record> {
        let rows = data.len();
        let data = redistribute(data, load_table, self.catalog);
        let data = self.with_dates(data);
        let data = self.with_averages(data);
        let data = self.with_categorical_counts(data);
        let data = self.with_dataset_transform(data);
        let data = self.with_formats(data);
        let data = self.with_calculated_fields(data, datapoint);
        log::debug!(
            target: "PIPELINE",
            "processed {} rows for dataset {}",
            rows,
            self.catalog.dataset_name()
        );
        data
    }

    // ========================================================================
    // DATES
    // ========================================================================

    fn with_dates(&self, mut data: Vec<Record>) -> Vec<Record> {
        let conversions: Vec<(String, String)> = self
            .catalog
            .columns_of_type(ColumnType::DateString)
            .into_iter()
            .map(|col| {
                let input = self.catalog.get_alias(col).to_string();
                let output = self
                    .catalog
                    .date_output_col(col)
                    .map(|o| self.catalog.get_alias(o).to_string())
                    .unwrap_or_else(|| input.clone());
                (input, output)
            })
            .collect();
        if conversions.is_empty() {
            return data;
        }

        for record in data.iter_mut() {
            for (input, output) in &conversions {
                if let Some(value) = record.get(input) {
                    let epoch = normalize_date_value(value);
                    record.insert(output.clone(), epoch);
                }
            }
        }
        data
    }

    // ========================================================================
    // AVERAGES
    // ========================================================================

    fn with_averages(&self, mut data: Vec<Record>) -> Vec<Record> {
        let records_alias = self.catalog.sum_records_alias().to_string();
        let numerics: Vec<(String, String)> = self
            .catalog
            .averageable_numerics()
            .into_iter()
            .map(|col| {
                let alias = self.catalog.get_alias(col).to_string();
                let avg = format!("{}{}", alias, AVG_SUFFIX);
                (alias, avg)
            })
            .collect();

        for record in data.iter_mut() {
            let denominator = record
                .get(&records_alias)
                .and_then(Value::as_f64)
                .filter(|d| *d != 0.0 && !d.is_nan());
            for (alias, avg) in &numerics {
                let numerator = record.get(alias).and_then(Value::as_f64);
                let value = match (numerator, denominator) {
                    (Some(n), Some(d)) => Value::Number(n / d),
                    _ => Value::Null,
                };
                record.insert(avg.clone(), value);
            }
        }
        data
    }

    // ========================================================================
    // CATEGORICAL COUNTS
    // ========================================================================

    fn with_categorical_counts(&self, mut data: Vec<Record>) -> Vec<Record> {
        let variables: BTreeSet<&str> = self
            .catalog
            .categoricals()
            .into_iter()
            .filter(|c| !self.catalog.has_flag(c, ColumnFlag::NoSummary))
            .map(|c| self.catalog.get_alias(c))
            .collect();
        if variables.is_empty() {
            return data;
        }

        for record in data.iter_mut() {
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for key in record.keys() {
                if let Some((variable, _)) = key.split_once(':') {
                    if variables.contains(variable) {
                        *counts.entry(format!("# {}", variable)).or_insert(0) += 1;
                    }
                }
            }
            for (name, count) in counts {
                record.insert(name, Value::from(count));
            }
        }
        data
    }

    // ========================================================================
    // DATASET TRANSFORM
    // ========================================================================

    fn with_dataset_transform(&self, data: Vec<Record>) -> Vec<Record> {
        let Some((name, fields)) = self.catalog.dataset_transform() else {
            return data;
        };
        let Some(transform) = self.registry.dataset(name) else {
            log::warn!(target: "PIPELINE", "unknown dataset transform {}; data passed through", name);
            return data;
        };

        let field_aliases: Vec<String> = fields
            .iter()
            .map(|f| self.catalog.get_alias(f).to_string())
            .collect();
        let aliases: BTreeMap<String, String> = self
            .catalog
            .all_columns()
            .into_iter()
            .map(|c| (c.to_string(), self.catalog.get_alias(c).to_string()))
            .collect();
        let numerics: BTreeMap<String, NumericInfo> = self
            .catalog
            .columns()
            .iter()
            .filter(|c| c.column_type == ColumnType::Numeric)
            .map(|c| {
                (
                    c.name.clone(),
                    NumericInfo {
                        alias: c.alias().to_string(),
                        subtype: c.subtype.clone(),
                        calculated: c.calculated.is_some(),
                    },
                )
            })
            .collect();

        let args = DatasetArgs {
            fields: &field_aliases,
            aliases: &aliases,
            numerics: &numerics,
        };
        match transform(&data, &args) {
            Ok(out) => out,
            Err(e) => {
                log::warn!(target: "PIPELINE", "dataset transform {} failed: {}; data passed through", name, e);
                data
            }
        }
    }

    // ========================================================================
    // FORMATS
    // ========================================================================

    fn with_formats(&self, mut data: Vec<Record>) -> Vec<Record> {
        let columns: Vec<(&str, &str)> = self
            .catalog
            .columns_with_flag(ColumnFlag::UseFormat)
            .into_iter()
            .map(|c| (c, self.catalog.get_alias(c)))
            .collect();
        if columns.is_empty() {
            return data;
        }

        for record in data.iter_mut() {
            for (name, alias) in &columns {
                let key = if record.contains_key(*alias) { *alias } else { *name };
                if let Some(value) = record.get(key) {
                    let formatted = self.catalog.format_value(name, value);
                    record.insert(key.to_string(), formatted);
                }
            }
        }
        data
    }

    // ========================================================================
    // CALCULATED FIELDS
    // ========================================================================

    /// Columns without a pre-transform run first; columns with one run second,
    /// against the first pass's output. Each group runs in ascending `idx`.
    fn with_calculated_fields(&self, data: Vec<Record>, datapoint: Option<&str>) -> Vec<Record> {
        let (plain, pre_transformed): (Vec<_>, Vec<_>) = self
            .catalog
            .calculated_columns()
            .into_iter()
            .filter(|(c, _)| self.catalog.is_allowed_for_datapoint(datapoint, &c.name))
            .partition(|(_, spec)| spec.pre_transform.is_none());
        if plain.is_empty() && pre_transformed.is_empty() {
            return data;
        }

        let mut first: Vec<CalcColumn> = plain
            .into_iter()
            .map(|(column, spec)| self.resolve_column(column, spec))
            .collect();
        first.sort_by_key(|c| c.idx);
        let first: Vec<(CalcColumn, &[Record])> = first.into_iter().map(|c| (c, data.as_slice())).collect();
        let pass1 = self.apply_calculations(&data, &first);

        let mut second: Vec<(CalcColumn, Vec<Record>)> = pre_transformed
            .into_iter()
            .map(|(column, spec)| {
                let resolved = self.resolve_column(column, spec);
                let pre = spec.pre_transform.as_deref().unwrap_or_default();
                let transformed = match self.registry.pre_transform(pre) {
                    Some(f) => f(&pass1, &resolved.field_aliases),
                    None => {
                        log::warn!(target: "PIPELINE", "unknown pre-transform {} for {}", pre, column.name);
                        pass1.clone()
                    }
                };
                (resolved, transformed)
            })
            .collect();
        second.sort_by_key(|(c, _)| c.idx);
        let second: Vec<(CalcColumn, &[Record])> = second
            .iter()
            .map(|(c, transformed)| (c.clone(), transformed.as_slice()))
            .collect();
        self.apply_calculations(&pass1, &second)
    }

    fn resolve_column(&self, column: &'a ColumnDescriptor, spec: &'a CalculatedSpec) -> CalcColumn<'a> {
        CalcColumn {
            alias: column.alias().to_string(),
            name: column.name.as_str(),
            field_aliases: spec
                .fields
                .iter()
                .map(|f| self.catalog.get_alias(f).to_string())
                .collect(),
            transform: spec.transform.as_str(),
            idx: spec.idx,
        }
    }

    /// One calculation pass. Each record sees its own fields calculated so
    /// far and the previous fully calculated record. A failing transform sets
    /// its field to null; the row is kept.
    fn apply_calculations(&self, data: &[Record], columns: &[(CalcColumn, &[Record])]) -> Vec<Record> {
        if columns.is_empty() {
            return data.to_vec();
        }
        let mut output = Vec::with_capacity(data.len());
        let mut prev = Record::new();

        for row in data {
            let mut record = row.clone();
            for (column, transformed) in columns {
                let result = match self.registry.calculated(column.transform) {
                    Some(f) => f(&CalcArgs {
                        record: &record,
                        fields: &column.field_aliases,
                        data: transformed,
                        prev: &prev,
                        output: &column.alias,
                    }),
                    None => Err(TransformError::UnknownTransform(column.transform.to_string())),
                };
                let value = result.unwrap_or_else(|e| {
                    log::warn!(target: "PIPELINE", "calculated field {} failed: {}", column.name, e);
                    Value::Null
                });
                record.insert(column.alias.clone(), value);
            }
            prev = record.clone();
            output.push(record);
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{LoadRow, GENERAL_IMPROVEMENT};
    use engine::{record_from_pairs, DatasetMeta, NumberFormat, SUM_RECORDS};

    fn calc(fields: &[&str], transform: &str, pre: Option<&str>, idx: i32) -> CalculatedSpec {
        CalculatedSpec {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            transform: transform.to_string(),
            pre_transform: pre.map(str::to_string),
            idx,
        }
    }

    fn catalog() -> MetadataCatalog {
        MetadataCatalog::new(DatasetMeta::new(
            "sales",
            vec![
                ColumnDescriptor::new("State", ColumnType::Categorical),
                ColumnDescriptor::new("Gender", ColumnType::Categorical),
                ColumnDescriptor::new("Sales", ColumnType::Numeric).with_what_if_target("Load"),
                ColumnDescriptor::new("Cost", ColumnType::Numeric),
                ColumnDescriptor::new("Opened", ColumnType::DateString).with_output("OpenedMs"),
                ColumnDescriptor::new("OpenedMs", ColumnType::Date),
                ColumnDescriptor::new("Margin", ColumnType::Numeric)
                    .with_calculated(calc(&["Sales", "Cost"], "difference", None, 1)),
                ColumnDescriptor::new("MarginPct", ColumnType::Numeric)
                    .with_calculated(calc(&["Margin", "Sales"], "percent", None, 2)),
                ColumnDescriptor::new("RunningSales", ColumnType::Numeric)
                    .with_calculated(calc(&["Sales"], "cumulative", None, 3)),
                ColumnDescriptor::new("MarginRank", ColumnType::Numeric)
                    .with_calculated(calc(&["Margin"], "rank", Some("sortDescending"), 0)),
            ],
        ))
        .unwrap()
    }

    fn rows() -> Vec<Record> {
        vec![
            record_from_pairs([
                ("State", Value::from("NY")),
                ("Gender:F", Value::from(1.0)),
                ("Gender:M", Value::from(1.0)),
                ("Sales", Value::from(30.0)),
                ("Cost", Value::from(10.0)),
                ("Opened", Value::from("3/2021")),
                (SUM_RECORDS, Value::from(2.0)),
            ]),
            record_from_pairs([
                ("State", Value::from("CA")),
                ("Gender:F", Value::from(1.0)),
                ("Sales", Value::from(5.0)),
                ("Cost", Value::from(0.0)),
                (SUM_RECORDS, Value::from(0.0)),
            ]),
        ]
    }

    fn run(data: Vec<Record>, load: Option<&LoadTable>) -> Vec<Record> {
        let catalog = catalog();
        let registry = TransformRegistry::with_builtins();
        PivotPipeline::new(&catalog, &registry).process(data, load, Some("State"))
    }

    #[test]
    fn test_row_count_preserved() {
        assert_eq!(run(rows(), None).len(), 2);
    }

    #[test]
    fn test_averages_are_null_without_records() {
        let out = run(rows(), None);
        assert_eq!(out[0].get("Sales (Avg)"), Some(&Value::from(15.0)));
        assert_eq!(out[1].get("Sales (Avg)"), Some(&Value::Null));
        assert_eq!(out[1].get("Cost (Avg)"), Some(&Value::Null));
    }

    #[test]
    fn test_dates_written_to_output_column() {
        let out = run(rows(), None);
        assert_eq!(out[0].get("OpenedMs"), Some(&Value::from(1_614_556_800_000.0)));
        assert_eq!(out[0].get("Opened"), Some(&Value::from("3/2021")));
        assert!(!out[1].contains_key("OpenedMs"));
    }

    #[test]
    fn test_categorical_variable_counts() {
        let out = run(rows(), None);
        assert_eq!(out[0].get("# Gender"), Some(&Value::from(2u64)));
        assert_eq!(out[1].get("# Gender"), Some(&Value::from(1u64)));
    }

    #[test]
    fn test_calculated_fields_chain_in_idx_order() {
        let out = run(rows(), None);
        assert_eq!(out[0].get("Margin"), Some(&Value::from(20.0)));
        let pct = out[0].get("MarginPct").and_then(Value::as_f64).unwrap();
        assert!((pct - 66.666_666).abs() < 1e-3);
        assert_eq!(out[0].get("RunningSales"), Some(&Value::from(30.0)));
        assert_eq!(out[1].get("RunningSales"), Some(&Value::from(35.0)));
    }

    #[test]
    fn test_pre_transformed_fields_see_first_pass() {
        let out = run(rows(), None);
        assert_eq!(out[0].get("MarginRank"), Some(&Value::from(1u64)));
        assert_eq!(out[1].get("MarginRank"), Some(&Value::from(2u64)));
    }

    #[test]
    fn test_failing_transform_yields_null_and_keeps_row() {
        let mut data = rows();
        data[1].remove("Cost");
        let out = run(data, None);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].get("Margin"), Some(&Value::Null));
        // MarginPct depends on the null Margin and fails too.
        assert_eq!(out[1].get("MarginPct"), Some(&Value::Null));
        assert_eq!(out[1].get("RunningSales"), Some(&Value::from(35.0)));
    }

    #[test]
    fn test_what_if_runs_before_calculations() {
        let load = vec![LoadRow::new(GENERAL_IMPROVEMENT).with_load("Load", 50.0)];
        let out = run(rows(), Some(&load));
        assert_eq!(out[0].get("Sales"), Some(&Value::from(15.0)));
        assert_eq!(out[0].get("Margin"), Some(&Value::from(5.0)));
    }

    #[test]
    fn test_pipeline_is_idempotent_on_same_input() {
        assert_eq!(run(rows(), None), run(rows(), None));
    }

    #[test]
    fn test_only_with_datapoint_limits_calculations() {
        let catalog = MetadataCatalog::new(DatasetMeta::new(
            "d",
            vec![
                ColumnDescriptor::new("A", ColumnType::Numeric),
                ColumnDescriptor::new("B", ColumnType::Numeric),
                ColumnDescriptor::new("Total", ColumnType::Numeric)
                    .with_calculated(calc(&["A", "B"], "sum", None, 0))
                    .only_with(&["Region"]),
            ],
        ))
        .unwrap();
        let registry = TransformRegistry::with_builtins();
        let data = vec![record_from_pairs([("A", 1.0), ("B", 2.0)])];
        let pipeline = PivotPipeline::new(&catalog, &registry);
        let out = pipeline.process(data.clone(), None, Some("State"));
        assert!(!out[0].contains_key("Total"));
        let out = pipeline.process(data, None, Some("Region"));
        assert_eq!(out[0].get("Total"), Some(&Value::from(3.0)));
    }

    #[test]
    fn test_use_format_and_dataset_transform() {
        let mut meta = DatasetMeta::new(
            "d",
            vec![
                ColumnDescriptor::new("Name", ColumnType::Categorical),
                ColumnDescriptor::new("Score", ColumnType::Numeric)
                    .with_flag(ColumnFlag::UseFormat)
                    .with_format(NumberFormat::Number {
                        decimal_places: 1,
                        use_thousands_separator: false,
                    }),
            ],
        );
        meta.transform = Some("sortDescending".to_string());
        meta.transform_fields = vec!["Score".to_string()];
        let catalog = MetadataCatalog::new(meta).unwrap();
        let registry = TransformRegistry::with_builtins();
        let data = vec![
            record_from_pairs([("Name", Value::from("a")), ("Score", Value::from(1.0))]),
            record_from_pairs([("Name", Value::from("b")), ("Score", Value::from(2.0))]),
        ];
        let out = PivotPipeline::new(&catalog, &registry).process(data, None, None);
        assert_eq!(out[0].get("Name"), Some(&Value::from("b")));
        assert_eq!(out[0].get("Score"), Some(&Value::from("2.0")));
    }
}
