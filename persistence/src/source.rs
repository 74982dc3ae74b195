//! FILENAME: persistence/src/source.rs
//! PURPOSE: Where raw dataset rows come from.
//! CONTEXT: `FileSource` reads dataset files out of the data folder;
//! `MemorySource` serves rows handed over by an embedding application.

use crate::csv_reader::load_csv_rows;
use crate::json_reader::load_json;
use crate::xlsx_reader::load_xlsx_rows;
use crate::SourceError;
use engine::Record;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Supplies the raw rows of a dataset.
pub trait DataSource {
    fn raw_rows(&self, dataset: &str) -> Result<Vec<Record>, SourceError>;
}

// ============================================================================
// FILE SOURCE
// ============================================================================

/// Dataset files in one folder. A dataset named `calls` is read from
/// `calls.json`, `calls.xlsx` or `calls.csv`; a name with an extension is
/// used as is.
#[derive(Debug, Clone)]
pub struct FileSource {
    data_folder: PathBuf,
}

impl FileSource {
    pub fn new(data_folder: impl Into<PathBuf>) -> Self {
        FileSource {
            data_folder: data_folder.into(),
        }
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    fn resolve(&self, dataset: &str) -> Result<PathBuf, SourceError> {
        if dataset.is_empty() || dataset.contains(|c: char| c == '/' || c == '\\') || dataset.contains("..") {
            return Err(SourceError::NotFound(dataset.to_string()));
        }
        if DataFormat::from_path(Path::new(dataset)).is_some() {
            let path = self.data_folder.join(dataset);
            return if path.is_file() {
                Ok(path)
            } else {
                Err(SourceError::NotFound(path.display().to_string()))
            };
        }
        DataFormat::ALL
            .iter()
            .map(|f| self.data_folder.join(format!("{}.{}", dataset, f.extension())))
            .find(|p| p.is_file())
            .ok_or_else(|| SourceError::NotFound(dataset.to_string()))
    }
}

impl DataSource for FileSource {
    fn raw_rows(&self, dataset: &str) -> Result<Vec<Record>, SourceError> {
        let path = self.resolve(dataset)?;
        let rows = match DataFormat::from_path(&path) {
            Some(DataFormat::Json) => load_json(&path)?,
            Some(DataFormat::Xlsx) => load_xlsx_rows(&path)?,
            Some(DataFormat::Csv) => load_csv_rows(&path)?,
            None => return Err(SourceError::InvalidFormat(path.display().to_string())),
        };
        log::debug!(target: "DATA", "read {} rows from {}", rows.len(), path.display());
        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataFormat {
    Json,
    Xlsx,
    Csv,
}

impl DataFormat {
    const ALL: [DataFormat; 3] = [DataFormat::Json, DataFormat::Xlsx, DataFormat::Csv];

    fn extension(self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Xlsx => "xlsx",
            DataFormat::Csv => "csv",
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

// ============================================================================
// MEMORY SOURCE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    datasets: HashMap<String, Vec<Record>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>, rows: Vec<Record>) -> Self {
        self.insert(dataset, rows);
        self
    }

    pub fn insert(&mut self, dataset: impl Into<String>, rows: Vec<Record>) {
        self.datasets.insert(dataset.into(), rows);
    }
}

impl DataSource for MemorySource {
    fn raw_rows(&self, dataset: &str) -> Result<Vec<Record>, SourceError> {
        self.datasets
            .get(dataset)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(dataset.to_string()))
    }
}
