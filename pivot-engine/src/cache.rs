//! Pivot Cache - Interned values for the aggregation hot path.
//!
//! The aggregation scan touches every categorical cell of every row, so values
//! are interned once per column and referenced by a small integer afterwards:
//! - Each unique value is stored once and referenced by index
//! - Group keys are short vectors of indices (datapoint, animation)
//! - Categorical counters are keyed by index, not by formatted strings
//!
//! Formatted `"<alias>:<value>"` keys are only built when a group is emitted.

use engine::Value;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;

// ============================================================================
// VALUE INTERNING
// ============================================================================

/// A reference to an interned value within a column's unique value store.
pub type ValueId = u32;

/// Represents a null or missing value.
pub const VALUE_ID_EMPTY: ValueId = u32::MAX;

/// A hashable representation of a record value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheValue {
    Empty,
    Number(OrderedFloat),
    Text(String),
    Boolean(bool),
}

impl From<&Value> for CacheValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => CacheValue::Empty,
            Value::Number(n) => CacheValue::Number(OrderedFloat(*n)),
            Value::Text(s) => CacheValue::Text(s.clone()),
            Value::Bool(b) => CacheValue::Boolean(*b),
        }
    }
}

impl CacheValue {
    pub fn to_value(&self) -> Value {
        match self {
            CacheValue::Empty => Value::Null,
            CacheValue::Number(n) => Value::Number(n.0),
            CacheValue::Text(s) => Value::Text(s.clone()),
            CacheValue::Boolean(b) => Value::Bool(*b),
        }
    }

    pub fn display_string(&self) -> String {
        self.to_value().display_string()
    }
}

/// Wrapper around f64 that implements Eq and Hash for use as map keys.
/// NaN values are treated as equal to each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            true
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            u64::MAX.hash(state);
        } else if self.0 == 0.0 {
            // 0.0 and -0.0 compare equal, so they must hash equal
            0u64.hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}

// ============================================================================
// FIELD CACHE
// ============================================================================

/// Unique value store for a single column.
#[derive(Debug, Clone, Default)]
pub struct FieldCache {
    /// Native column name.
    pub name: String,

    value_to_id: FxHashMap<CacheValue, ValueId>,

    /// Indexed by ValueId.
    id_to_value: Vec<CacheValue>,
}

impl FieldCache {
    pub fn new(name: impl Into<String>) -> Self {
        FieldCache {
            name: name.into(),
            value_to_id: FxHashMap::default(),
            id_to_value: Vec::new(),
        }
    }

    /// Interns a value and returns its ValueId. Nulls map to VALUE_ID_EMPTY.
    pub fn intern(&mut self, value: &Value) -> ValueId {
        if value.is_null() {
            return VALUE_ID_EMPTY;
        }
        let key = CacheValue::from(value);
        if let Some(&id) = self.value_to_id.get(&key) {
            return id;
        }
        let id = self.id_to_value.len() as ValueId;
        self.id_to_value.push(key.clone());
        self.value_to_id.insert(key, id);
        id
    }

    pub fn get_value(&self, id: ValueId) -> Option<&CacheValue> {
        if id == VALUE_ID_EMPTY {
            return Some(&CacheValue::Empty);
        }
        self.id_to_value.get(id as usize)
    }

    /// Number of unique values (excluding empty).
    pub fn unique_count(&self) -> usize {
        self.id_to_value.len()
    }

    /// All unique values in ascending order: numbers, then text, then booleans.
    pub fn sorted_values(&self) -> Vec<&CacheValue> {
        let mut values: Vec<&CacheValue> = self.id_to_value.iter().collect();
        values.sort_by(|a, b| compare_cache_values(a, b));
        values
    }
}

/// Comparison function for sorting CacheValues.
pub fn compare_cache_values(a: &CacheValue, b: &CacheValue) -> Ordering {
    match (a, b) {
        (CacheValue::Empty, CacheValue::Empty) => Ordering::Equal,
        (CacheValue::Empty, _) => Ordering::Less,
        (_, CacheValue::Empty) => Ordering::Greater,

        (CacheValue::Number(na), CacheValue::Number(nb)) => {
            na.0.partial_cmp(&nb.0).unwrap_or(Ordering::Equal)
        }
        (CacheValue::Number(_), _) => Ordering::Less,
        (_, CacheValue::Number(_)) => Ordering::Greater,

        (CacheValue::Text(ta), CacheValue::Text(tb)) => ta.cmp(tb),
        (CacheValue::Text(_), _) => Ordering::Less,
        (_, CacheValue::Text(_)) => Ordering::Greater,

        (CacheValue::Boolean(ba), CacheValue::Boolean(bb)) => ba.cmp(bb),
    }
}

// ============================================================================
// GROUP KEY
// ============================================================================

/// Interned (datapoint, animation) values identifying one output row.
/// Without animation the key holds a single id.
pub type GroupKey = SmallVec<[ValueId; 2]>;

// ============================================================================
// GROUP ACCUMULATOR
// ============================================================================

/// Running totals for one output row of the aggregation.
#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    pub key: GroupKey,

    /// Per categorical column (by plan index): value id -> count.
    pub categorical_counts: Vec<FxHashMap<ValueId, u64>>,

    /// Per numeric column (by plan index): running sum.
    pub sums: Vec<f64>,

    /// Per singleton column (by plan index): first non-null value seen.
    pub singletons: Vec<Option<Value>>,

    pub record_count: u64,
}

impl GroupAccumulator {
    pub fn new(key: GroupKey, categoricals: usize, numerics: usize, singletons: usize) -> Self {
        GroupAccumulator {
            key,
            categorical_counts: vec![FxHashMap::default(); categoricals],
            sums: vec![0.0; numerics],
            singletons: vec![None; singletons],
            record_count: 0,
        }
    }

    pub fn count_categorical(&mut self, index: usize, id: ValueId) {
        *self.categorical_counts[index].entry(id).or_insert(0) += 1;
    }

    pub fn add_number(&mut self, index: usize, value: f64) {
        self.sums[index] += value;
    }

    /// Keeps the first non-null value; later values never overwrite it.
    pub fn offer_singleton(&mut self, index: usize, value: &Value) {
        let slot = &mut self.singletons[index];
        if slot.is_none() && !value.is_null() {
            *slot = Some(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut cache = FieldCache::new("STATE");
        let ny = cache.intern(&Value::from("NY"));
        let ca = cache.intern(&Value::from("CA"));
        assert_eq!(cache.intern(&Value::from("NY")), ny);
        assert_ne!(ny, ca);
        assert_eq!(cache.intern(&Value::Null), VALUE_ID_EMPTY);
        assert_eq!(cache.unique_count(), 2);
    }

    #[test]
    fn test_sorted_values() {
        let mut cache = FieldCache::new("MIXED");
        for v in [Value::from("b"), Value::from(2.0), Value::from("a"), Value::from(1.0)] {
            cache.intern(&v);
        }
        let sorted: Vec<String> = cache
            .sorted_values()
            .into_iter()
            .map(CacheValue::display_string)
            .collect();
        assert_eq!(sorted, vec!["1", "2", "a", "b"]);
    }

    #[test]
    fn test_singleton_keeps_first_non_null() {
        let mut acc = GroupAccumulator::new(GroupKey::from_slice(&[0]), 0, 0, 1);
        acc.offer_singleton(0, &Value::Null);
        acc.offer_singleton(0, &Value::from(7.0));
        acc.offer_singleton(0, &Value::from(9.0));
        assert_eq!(acc.singletons[0], Some(Value::from(7.0)));
    }
}
