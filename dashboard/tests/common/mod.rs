//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for session integration tests.

#![allow(dead_code)]

use dashboard::{PivotSession, PivotSnapshot};
use engine::{MetadataRegistry, Record, Value};
use persistence::FileSource;
use pivot_engine::TransformRegistry;
use std::path::PathBuf;
use tempfile::TempDir;

pub const METADATA_JSON: &str = r#"{
    "defaultDataset": "people",
    "datasets": [
        {
            "name": "people",
            "columns": [
                {"name": "State", "type": "Categorical", "flags": ["datapoint", "geo"]},
                {"name": "Gender", "type": "Categorical", "flags": ["datapoint", "noPareto"],
                 "defaults": {"color": "M"}},
                {"name": "Year", "type": "Categorical", "flags": ["animation", "noAggregate"]},
                {"name": "Sales", "type": "Numeric", "flags": ["summary"], "whatIfTarget": "Load",
                 "defaults": {"x": "self"}},
                {"name": "Age", "type": "Numeric", "flags": ["noRadius"],
                 "defaults": {"y": "self"}}
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
        }
    ]
}"#;

pub const PEOPLE_JSON: &str = r#"[
    {"State": "NY", "Gender": "F", "Year": "2020", "Sales": 10, "Age": 30},
    {"State": "NY", "Gender": "M", "Year": "2021", "Sales": 20, "Age": 40},
    {"State": "CA", "Gender": "F", "Year": "2020", "Sales": 5, "Age": 50}
]"#;

/// A data folder holding `people.json` plus the metadata describing it.
pub struct TestHarness {
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("people.json"), PEOPLE_JSON).expect("write data file");
        TestHarness { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_file(&self, name: &str, contents: &str) {
        std::fs::write(self.path(name), contents).expect("write file");
    }

    /// A session over the data folder with nothing loaded yet.
    pub fn session(&self) -> PivotSession<FileSource> {
        PivotSession::new(
            MetadataRegistry::from_json_str(METADATA_JSON).expect("metadata"),
            TransformRegistry::with_builtins(),
            FileSource::new(self.dir.path()),
        )
        .expect("session")
    }

    /// A session with the default dataset loaded.
    pub fn opened_session(&self) -> PivotSession<FileSource> {
        let mut session = self.session();
        let pending = session.open(None, None).expect("open");
        assert!(session.run(pending).expect("initial load"));
        session
    }
}

pub fn current(session: &PivotSession<FileSource>) -> &PivotSnapshot {
    session.current().expect("current snapshot")
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

pub fn filter_of(pairs: &[(&str, &[&str])]) -> engine::Filter {
    pairs
        .iter()
        .map(|(col, values)| {
            (
                col.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}
