//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for data source integration tests.

#![allow(dead_code)]

use engine::{MetadataRegistry, Record, Value};
use persistence::{DataSource, DatasetReader, FileSource};
use pivot_engine::TransformRegistry;
use std::path::Path;
use tempfile::TempDir;

pub const METADATA_JSON: &str = r#"{
    "defaultDataset": "people",
    "datasets": [
        {
            "name": "people",
            "columns": [
                {"name": "State", "type": "Categorical", "flags": ["datapoint"]},
                {"name": "Gender", "type": "Categorical"},
                {"name": "Sales", "type": "Numeric", "whatIfTarget": "Load"}
            ]
        },
        {
            "name": "peopleByGender",
            "actualDataset": "people",
            "datapointCol": "Gender",
            "columns": [
                {"name": "State", "type": "Categorical"},
                {"name": "Gender", "type": "Categorical", "flags": ["datapoint"]},
                {"name": "Sales", "type": "Numeric"}
            ]
        },
        {
            "name": "empty",
            "columns": [
                {"name": "State", "type": "Categorical", "flags": ["datapoint"]}
            ]
        }
    ]
}"#;

pub const PEOPLE_JSON: &str = r#"[
    {"State": "NY", "Gender": "F", "Sales": 10},
    {"State": "NY", "Gender": "M", "Sales": 20},
    {"State": "CA", "Gender": "F", "Sales": 5}
]"#;

/// A data folder in a temp directory plus the metadata describing it.
pub struct TestHarness {
    pub dir: TempDir,
    pub metadata: MetadataRegistry,
    pub transforms: TransformRegistry,
    pub source: FileSource,
}

impl TestHarness {
    /// Create a harness with an empty data folder.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = FileSource::new(dir.path());
        TestHarness {
            metadata: MetadataRegistry::from_json_str(METADATA_JSON).expect("metadata"),
            transforms: TransformRegistry::with_builtins(),
            source,
            dir,
        }
    }

    /// Create a harness whose data folder holds `people.json`.
    pub fn with_people() -> Self {
        let harness = Self::new();
        harness.write_file("people.json", PEOPLE_JSON);
        harness
    }

    pub fn write_file(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.path().join(name), contents).expect("write data file");
    }

    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    pub fn reader(&self) -> DatasetReader<'_> {
        self.reader_for(&self.source)
    }

    pub fn reader_for<'a>(&'a self, source: &'a dyn DataSource) -> DatasetReader<'a> {
        DatasetReader::new(&self.metadata, &self.transforms, source)
    }
}

/// Finds the row whose `key` equals `value`.
pub fn row_with<'a>(rows: &'a [Record], key: &str, value: &str) -> &'a Record {
    rows.iter()
        .find(|r| r.get(key) == Some(&Value::from(value)))
        .unwrap_or_else(|| panic!("no row with {} = {}", key, value))
}

pub fn number(row: &Record, key: &str) -> Option<f64> {
    row.get(key).and_then(Value::as_f64)
}

pub fn exists(path: &Path) -> bool {
    path.is_file()
}
