//! FILENAME: pivot-engine/src/whatif.rs
//! PURPOSE: What-if redistribution of numeric fields from a Load Table.
//! CONTEXT: Each Load Table row names a categorical value (or the general
//! improvement sentinel) and a percentage per what-if header. Headers map to
//! target numeric columns through the `whatIfTarget` attribute. For each row
//! the share of the row attributable to the categorical value is scaled by
//! the percentage and the rest is left alone.

use crate::definition::{LoadTable, GENERAL_IMPROVEMENT};
use engine::{MetadataCatalog, Record, Value};

/// One percentage applied to one target field (by alias).
#[derive(Debug, Clone, PartialEq)]
pub struct TargetChange {
    pub field: String,
    pub percent: f64,
}

/// Load Table rewritten in terms of target field aliases, keyed by
/// categorical value in first-seen order. A repeated key replaces the
/// earlier entry's changes but keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetTable {
    entries: Vec<(String, Vec<TargetChange>)>,
}

impl TargetTable {
    pub fn from_load_table(load_table: &LoadTable, catalog: &MetadataCatalog) -> Self {
        let reverse = catalog.what_if_reverse_map();
        let mut table = TargetTable::default();
        for row in load_table {
            let changes: Vec<TargetChange> = row
                .loads
                .iter()
                .flat_map(|(header, percent)| {
                    reverse
                        .get(header)
                        .into_iter()
                        .flatten()
                        .map(move |col| TargetChange {
                            field: catalog.get_alias(col).to_string(),
                            percent: *percent,
                        })
                })
                .collect();
            match table.entries.iter_mut().find(|(key, _)| *key == row.value) {
                Some(entry) => entry.1 = changes,
                None => table.entries.push((row.value.clone(), changes)),
            }
        }
        table
    }

    pub fn entries(&self) -> &[(String, Vec<TargetChange>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, changes)| changes.is_empty())
    }
}

/// Fraction of `row` attributable to `cat_value` (`"<alias>:<value>"`).
///
/// - The general improvement sentinel always owns the whole row.
/// - If the row is grouped by the value's own variable, it is all or nothing.
/// - Otherwise it is the value's count over the total of its variable's counts.
pub fn fraction_of_total(cat_value: &str, row: &Record) -> f64 {
    if cat_value == GENERAL_IMPROVEMENT {
        return 1.0;
    }

    let (alias, name) = cat_value.split_once(':').unwrap_or((cat_value, ""));

    if let Some(grouped) = row.get(alias) {
        return if grouped.display_string() == name { 1.0 } else { 0.0 };
    }

    let this_value = row.get(cat_value).map(Value::coerce_number).unwrap_or(0.0);
    let total: f64 = row
        .iter()
        .filter(|(key, _)| key.split(':').next() == Some(alias))
        .map(|(_, value)| value.coerce_number())
        .sum();

    if total == 0.0 {
        0.0
    } else {
        this_value / total
    }
}

/// Applies the Load Table to every row. Entries are applied in table order,
/// each against the row as already modified by the entries before it. The
/// changes of one entry all read the row as it was before that entry, so a
/// field targeted twice takes the last change.
pub fn redistribute(data: Vec<Record>, load_table: Option<&LoadTable>, catalog: &MetadataCatalog) -> Vec<Record> {
    let Some(load_table) = load_table else {
        return data;
    };
    let table = TargetTable::from_load_table(load_table, catalog);
    if table.is_empty() {
        return data;
    }

    log::debug!(
        target: "WHATIF",
        "redistributing {} rows over {} load entries",
        data.len(),
        table.entries().len()
    );

    data.into_iter()
        .map(|mut row| {
            for (cat_value, changes) in table.entries() {
                let fraction = fraction_of_total(cat_value, &row);
                let updates: Vec<(String, f64)> = changes
                    .iter()
                    .map(|change| {
                        let old_value = row.get(&change.field).map(Value::coerce_number).unwrap_or(0.0);
                        let unchanged = old_value * (1.0 - fraction);
                        let changed = old_value * fraction * (change.percent / 100.0);
                        (change.field.clone(), unchanged + changed)
                    })
                    .collect();
                for (field, value) in updates {
                    row.insert(field, Value::Number(value));
                }
            }
            row
        })
        .collect()
}
