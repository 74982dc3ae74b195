//! FILENAME: pivot-engine/src/summary.rs
//! PURPOSE: Chart totals and what-if before/after comparison.
//! CONTEXT: Both are derived from the pipeline's output after every fetch and
//! stored in the pivot snapshot next to the processed data.

use engine::{ColumnFlag, MetadataCatalog, Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One line of the "Chart Totals" table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub name: String,
    pub value: f64,
    /// Numeric totals show two decimals; counts print as integers.
    pub is_count: bool,
}

impl SummaryItem {
    pub fn display_value(&self) -> String {
        if self.is_count || self.value.fract() == 0.0 {
            format!("{:.0}", self.value)
        } else {
            format!("{:.2}", self.value)
        }
    }
}

/// Totals over `processed` of the `# <alias>` counters of summary-flagged
/// categoricals and of summary-flagged numerics, sorted by name.
pub fn summary_data(processed: &[Record], catalog: &MetadataCatalog) -> Vec<SummaryItem> {
    let mut wanted: BTreeMap<String, bool> = BTreeMap::new();
    for col in catalog.categoricals() {
        if catalog.has_flag(col, ColumnFlag::Summary) {
            wanted.insert(format!("# {}", catalog.get_alias(col)), true);
        }
    }
    for col in catalog.numerics() {
        if catalog.has_flag(col, ColumnFlag::Summary) {
            wanted.insert(catalog.get_alias(col).to_string(), false);
        }
    }

    wanted
        .into_iter()
        .filter_map(|(name, is_count)| {
            let values: Vec<f64> = processed
                .iter()
                .filter_map(|r| r.get(&name).and_then(Value::as_f64))
                .filter(|n| !n.is_nan())
                .collect();
            if values.is_empty() {
                return None;
            }
            Some(SummaryItem {
                value: values.iter().sum(),
                name,
                is_count,
            })
        })
        .collect()
}

/// Effect of the Load Table on one what-if target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadComparison {
    /// What-if header (e.g. "Load").
    pub header: String,
    /// Alias of the target column.
    pub field: String,
    pub before: f64,
    pub after: f64,
    /// `after / before`, absent when `before` is 0.
    pub ratio: Option<f64>,
}

/// Totals of every what-if target before (pivoted) and after (processed)
/// redistribution.
pub fn load_comparison_data(pivoted: &[Record], processed: &[Record], catalog: &MetadataCatalog) -> Vec<LoadComparison> {
    let total = |rows: &[Record], field: &str| -> f64 {
        rows.iter()
            .filter_map(|r| r.get(field).and_then(Value::as_f64))
            .filter(|n| !n.is_nan())
            .sum()
    };

    catalog
        .what_if_reverse_map()
        .into_iter()
        .flat_map(|(header, cols)| {
            cols.into_iter().map(move |col| (header.clone(), col))
        })
        .map(|(header, col)| {
            let field = catalog.get_alias(&col).to_string();
            let before = total(pivoted, &field);
            let after = total(processed, &field);
            LoadComparison {
                header,
                ratio: if before == 0.0 { None } else { Some(after / before) },
                field,
                before,
                after,
            }
        })
        .collect()
}
