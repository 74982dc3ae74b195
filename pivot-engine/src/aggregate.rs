//! FILENAME: pivot-engine/src/aggregate.rs
//! Aggregation Engine - groups raw rows by the datapoint column.
//!
//! Algorithm (single pass over the rows):
//! 1. Skip rows rejected by the user filter
//! 2. Intern the (binned) datapoint value and animation value into a group key
//! 3. Count categorical values, sum numerics, keep the first singleton value
//! 4. Count records
//!
//! Groups are emitted in first-seen order, one Aggregated Record per group.

use crate::cache::{FieldCache, GroupAccumulator, GroupKey, VALUE_ID_EMPTY};
use crate::dates::bin_by_month;
use crate::definition::{PivotRequest, ROW_ID};
use crate::error::PivotError;
use engine::{Binner, CategoricalValues, ColumnType, Filter, MetadataCatalog, Record, Value, SUM_RECORDS};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

// ============================================================================
// FILTERING
// ============================================================================

/// Whether `row` passes `filter`. Every filtered column must hold one of its
/// allowed values; a column with an empty allowed list places no constraint.
pub fn row_passes(row: &Record, filter: &Filter) -> bool {
    filter.iter().all(|(col, allowed)| {
        if allowed.is_empty() {
            return true;
        }
        let value = row.get(col).cloned().unwrap_or_default().display_string();
        allowed.iter().any(|a| *a == value)
    })
}

/// The rows that pass `filter`, cloned.
pub fn filter_rows(rows: &[Record], filter: &Filter) -> Vec<Record> {
    rows.iter().filter(|r| row_passes(r, filter)).cloned().collect()
}

// ============================================================================
// CATEGORICAL VALUES
// ============================================================================

/// Sorted unique values of every Categorical and IsoDate column.
/// Nulls are not values; a column with no values maps to an empty list.
pub fn categorical_values(rows: &[Record], catalog: &MetadataCatalog) -> CategoricalValues {
    let mut columns = catalog.columns_of_type(ColumnType::Categorical);
    columns.extend(catalog.columns_of_type(ColumnType::IsoDate));

    let mut caches: Vec<FieldCache> = columns.iter().map(|c| FieldCache::new(*c)).collect();
    for row in rows {
        for cache in caches.iter_mut() {
            if let Some(value) = row.get(&cache.name) {
                cache.intern(value);
            }
        }
    }

    caches
        .into_iter()
        .map(|cache| {
            let values = cache
                .sorted_values()
                .into_iter()
                .map(|v| v.display_string())
                .collect();
            (cache.name.clone(), values)
        })
        .collect()
}

// ============================================================================
// AGGREGATION PLAN
// ============================================================================

/// A column resolved for the scan: native name (row key) and alias (output key).
#[derive(Debug, Clone)]
struct PlannedColumn {
    name: String,
    alias: String,
}

/// Everything the scan needs, resolved from metadata once per request.
#[derive(Debug, Clone)]
pub struct AggregationPlan {
    datapoint: PlannedColumn,
    binner: Option<Binner>,
    animation: Option<PlannedColumn>,
    categoricals: Vec<PlannedColumn>,
    numerics: Vec<PlannedColumn>,
    singletons: Vec<PlannedColumn>,
    records_alias: String,
}

impl AggregationPlan {
    pub fn new(
        catalog: &MetadataCatalog,
        datapoint: Option<&str>,
        animation: Option<&str>,
    ) -> Result<Self, PivotError> {
        let datapoint = datapoint
            .filter(|d| !d.is_empty())
            .ok_or(PivotError::MissingDatapoint)?;
        if catalog.column(datapoint).is_none() {
            return Err(PivotError::UnknownColumn(datapoint.to_string()));
        }
        let planned = |name: &str| PlannedColumn {
            name: name.to_string(),
            alias: catalog.get_alias(name).to_string(),
        };

        // Union of aggregate and searchable categoricals, in declaration order.
        let mut seen = BTreeSet::new();
        let categoricals = catalog
            .aggregate_categoricals()
            .into_iter()
            .chain(catalog.searchable())
            .filter(|c| *c != datapoint && seen.insert(*c))
            .map(planned)
            .collect();

        let numerics = catalog
            .averageable_numerics()
            .into_iter()
            .map(planned)
            .collect();

        let singletons = catalog
            .singleton_columns(datapoint)
            .into_iter()
            .filter(|c| *c != SUM_RECORDS)
            .map(planned)
            .collect();

        let animation = match animation {
            Some(col) if col != datapoint => {
                if catalog.column(col).is_none() {
                    return Err(PivotError::UnknownColumn(col.to_string()));
                }
                Some(planned(col))
            }
            _ => None,
        };

        Ok(AggregationPlan {
            datapoint: planned(datapoint),
            binner: catalog.binner(datapoint),
            animation,
            categoricals,
            numerics,
            singletons,
            records_alias: catalog.sum_records_alias().to_string(),
        })
    }

    pub fn datapoint_alias(&self) -> &str {
        &self.datapoint.alias
    }

    fn datapoint_value(&self, row: &Record) -> Value {
        let raw = row.get(&self.datapoint.name).cloned().unwrap_or_default();
        match self.binner {
            Some(Binner::ByMonth) => bin_by_month(&raw),
            None => raw,
        }
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Groups `rows` that pass `filter` by the planned datapoint.
pub fn aggregate(rows: &[Record], filter: &Filter, plan: &AggregationPlan) -> Vec<Record> {
    let mut datapoint_cache = FieldCache::new(plan.datapoint.name.clone());
    let mut animation_cache = plan
        .animation
        .as_ref()
        .map(|a| FieldCache::new(a.name.clone()));
    let mut categorical_caches: Vec<FieldCache> = plan
        .categoricals
        .iter()
        .map(|c| FieldCache::new(c.name.clone()))
        .collect();

    let mut group_index: FxHashMap<GroupKey, usize> = FxHashMap::default();
    let mut groups: Vec<GroupAccumulator> = Vec::new();
    let mut skipped = 0usize;

    for row in rows {
        if !row_passes(row, filter) {
            skipped += 1;
            continue;
        }

        let mut key = GroupKey::new();
        key.push(datapoint_cache.intern(&plan.datapoint_value(row)));
        if let (Some(cache), Some(animation)) = (animation_cache.as_mut(), plan.animation.as_ref()) {
            key.push(cache.intern(row.get(&animation.name).unwrap_or(&Value::Null)));
        }

        let index = match group_index.get(&key) {
            Some(&i) => i,
            None => {
                groups.push(GroupAccumulator::new(
                    key.clone(),
                    plan.categoricals.len(),
                    plan.numerics.len(),
                    plan.singletons.len(),
                ));
                group_index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[index];

        for (i, cache) in categorical_caches.iter_mut().enumerate() {
            if let Some(value) = row.get(&cache.name) {
                let id = cache.intern(value);
                if id != VALUE_ID_EMPTY {
                    group.count_categorical(i, id);
                }
            }
        }

        for (i, numeric) in plan.numerics.iter().enumerate() {
            if let Some(value) = row.get(&numeric.name) {
                group.add_number(i, value.coerce_number());
            }
        }

        for (i, singleton) in plan.singletons.iter().enumerate() {
            if let Some(value) = row.get(&singleton.name) {
                group.offer_singleton(i, value);
            }
        }

        group.record_count += 1;
    }

    log::debug!(
        target: "PIVOT",
        "aggregated {} rows ({} filtered out) into {} groups by {}",
        rows.len() - skipped,
        skipped,
        groups.len(),
        plan.datapoint.name
    );

    groups
        .into_iter()
        .enumerate()
        .map(|(id, group)| {
            emit_group(plan, &group, id, &datapoint_cache, animation_cache.as_ref(), &categorical_caches)
        })
        .collect()
}

fn emit_group(
    plan: &AggregationPlan,
    group: &GroupAccumulator,
    id: usize,
    datapoint_cache: &FieldCache,
    animation_cache: Option<&FieldCache>,
    categorical_caches: &[FieldCache],
) -> Record {
    let mut record = Record::new();

    let datapoint_value = datapoint_cache
        .get_value(group.key[0])
        .map(|v| v.to_value())
        .unwrap_or_default();
    record.insert(plan.datapoint.alias.clone(), datapoint_value);

    if let (Some(animation), Some(cache), Some(&anim_id)) =
        (plan.animation.as_ref(), animation_cache, group.key.get(1))
    {
        let value = cache.get_value(anim_id).map(|v| v.to_value()).unwrap_or_default();
        record.insert(animation.alias.clone(), value);
    }

    for (i, column) in plan.categoricals.iter().enumerate() {
        let cache = &categorical_caches[i];
        for (&value_id, &count) in &group.categorical_counts[i] {
            if let Some(value) = cache.get_value(value_id) {
                let key = format!("{}:{}", column.alias, value.display_string());
                record.insert(key, Value::from(count));
            }
        }
    }

    for (i, numeric) in plan.numerics.iter().enumerate() {
        record.insert(numeric.alias.clone(), Value::Number(group.sums[i]));
    }

    for (i, singleton) in plan.singletons.iter().enumerate() {
        if let Some(value) = &group.singletons[i] {
            record.insert(singleton.alias.clone(), value.clone());
        }
    }

    record.insert(plan.records_alias.clone(), Value::from(group.record_count));
    record.insert(ROW_ID.to_string(), Value::from(id as u64));
    record
}

// ============================================================================
// TRANSFORMED DATA
// ============================================================================

/// The pivoted data for a request: aggregated groups, or the filtered raw
/// rows for force graphs, which draw individual records.
pub fn transformed_data(
    rows: &[Record],
    request: &PivotRequest,
    catalog: &MetadataCatalog,
) -> Result<Vec<Record>, PivotError> {
    if request.graph_type.is_force() {
        return Ok(filter_rows(rows, &request.filter));
    }
    let plan = AggregationPlan::new(
        catalog,
        request.datapoint.as_deref(),
        request.active_animation(),
    )?;
    Ok(aggregate(rows, &request.filter, &plan))
}
