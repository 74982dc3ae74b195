//! FILENAME: tests/test_read_dataset.rs
//! Integration tests for reading datasets in each mode.

mod common;

use common::{number, row_with, TestHarness};
use engine::{record_from_pairs, Filter, Value};
use persistence::{MemorySource, ReadError, ReadMode};
use pivot_engine::{GraphType, LoadRow, PivotError, PivotRequest};

// ============================================================================
// FILE MODE
// ============================================================================

#[test]
fn test_file_mode_aggregates_and_processes() {
    let harness = TestHarness::with_people();
    let result = harness
        .reader()
        .read(ReadMode::File, "people", &PivotRequest::new("State"), None)
        .unwrap();

    assert_eq!(result.pivoted_data.len(), 2);
    let ny = row_with(&result.pivoted_data, "State", "NY");
    assert_eq!(number(ny, "Gender:F"), Some(1.0));
    assert_eq!(number(ny, "Gender:M"), Some(1.0));
    assert_eq!(number(ny, "Sales"), Some(30.0));
    assert_eq!(number(ny, "# Records"), Some(2.0));

    let ca = row_with(&result.processed_data, "State", "CA");
    assert_eq!(number(ca, "Sales (Avg)"), Some(5.0));
    assert_eq!(number(ca, "# Gender"), Some(1.0));

    assert_eq!(
        result.categorical_values.get("Gender"),
        Some(&vec!["F".to_string(), "M".to_string()])
    );
}

#[test]
fn test_file_mode_missing_file_degrades_to_empty() {
    let harness = TestHarness::new();
    let result = harness
        .reader()
        .read(ReadMode::File, "people", &PivotRequest::new("State"), None)
        .unwrap();
    assert!(result.is_empty());
    assert!(result.categorical_values.values().all(|v| v.is_empty()));
}

#[test]
fn test_file_mode_non_array_is_empty() {
    let harness = TestHarness::new();
    harness.write_file("people.json", r#"{"rows": []}"#);
    let result = harness
        .reader()
        .read(ReadMode::File, "people", &PivotRequest::new("State"), None)
        .unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_filter_and_load_table_flow_through() {
    let harness = TestHarness::with_people();
    let mut filter = Filter::new();
    filter.insert("State".to_string(), vec!["NY".to_string()]);
    let request = PivotRequest::new("State")
        .with_filter(filter)
        .with_load_table(vec![LoadRow::new("Gender:M").with_load("Load", 0.0)]);

    let result = harness.reader().read(ReadMode::File, "people", &request, None).unwrap();
    assert_eq!(result.pivoted_data.len(), 1);
    let ny = &result.processed_data[0];
    // M holds half of NY's rows, so removing its load halves Sales.
    assert_eq!(number(ny, "Sales"), Some(15.0));
    assert_eq!(number(&result.pivoted_data[0], "Sales"), Some(30.0));
}

// ============================================================================
// ALL / INCREMENT MODES
// ============================================================================

#[test]
fn test_all_mode_requires_datapoint() {
    let harness = TestHarness::with_people();
    let err = harness
        .reader()
        .read(ReadMode::All, "people", &PivotRequest::default(), None)
        .unwrap_err();
    assert!(matches!(err, ReadError::Pivot(PivotError::MissingDatapoint)));
}

#[test]
fn test_increment_mode_has_no_categorical_values() {
    let harness = TestHarness::with_people();
    let result = harness
        .reader()
        .read(ReadMode::Increment, "people", &PivotRequest::new("Gender"), None)
        .unwrap();
    assert!(result.categorical_values.is_empty());
    assert_eq!(result.pivoted_data.len(), 2);
    assert_eq!(number(row_with(&result.pivoted_data, "Gender", "F"), "Sales"), Some(15.0));
}

#[test]
fn test_all_mode_fetch_failure_is_empty_result() {
    let harness = TestHarness::new();
    let result = harness
        .reader()
        .read(ReadMode::All, "people", &PivotRequest::new("State"), None)
        .unwrap();
    assert!(result.is_empty());
    assert!(result.categorical_values.is_empty());
}

#[test]
fn test_force_graph_reads_raw_rows() {
    let harness = TestHarness::with_people();
    let request = PivotRequest::new("State").with_graph_type(GraphType::Force);
    let result = harness.reader().read(ReadMode::Increment, "people", &request, None).unwrap();
    assert_eq!(result.pivoted_data.len(), 3);
    assert!(result.pivoted_data[0].get("# Records").is_none());
}

// ============================================================================
// DATASET RESOLUTION
// ============================================================================

#[test]
fn test_unknown_dataset_is_rejected() {
    let harness = TestHarness::with_people();
    let err = harness
        .reader()
        .read(ReadMode::File, "nope", &PivotRequest::new("State"), None)
        .unwrap_err();
    assert!(matches!(err, ReadError::UnknownDataset(name) if name == "nope"));
}

#[test]
fn test_synthetic_dataset_reads_actual_dataset() {
    let harness = TestHarness::with_people();
    let result = harness
        .reader()
        .read(ReadMode::File, "peopleByGender", &PivotRequest::new("Gender"), None)
        .unwrap();
    assert_eq!(result.pivoted_data.len(), 2);
}

#[test]
fn test_raw_override_skips_source() {
    let harness = TestHarness::new();
    let rows = vec![record_from_pairs([
        ("State", Value::from("TX")),
        ("Sales", Value::from(7.0)),
    ])];
    let result = harness
        .reader()
        .read(ReadMode::Increment, "people", &PivotRequest::new("State"), Some(rows))
        .unwrap();
    assert_eq!(result.pivoted_data.len(), 1);
    assert_eq!(number(&result.processed_data[0], "Sales"), Some(7.0));
    assert!(result.categorical_values.contains_key("State"));
}

#[test]
fn test_memory_source() {
    let harness = TestHarness::new();
    let source = MemorySource::new().with_dataset(
        "empty",
        vec![
            record_from_pairs([("State", "NY")]),
            record_from_pairs([("State", "NY")]),
        ],
    );
    let result = harness
        .reader_for(&source)
        .read(ReadMode::All, "empty", &PivotRequest::new("State"), None)
        .unwrap();
    assert_eq!(number(&result.pivoted_data[0], "# Records"), Some(2.0));
}
