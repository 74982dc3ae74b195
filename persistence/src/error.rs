//! FILENAME: persistence/src/error.rs

use pivot_engine::PivotError;
use thiserror::Error;

/// Why raw rows could not be obtained. Never fatal to a read: the caller
/// degrades to an empty result.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XLSX read error: {0}")]
    XlsxRead(#[from] calamine::XlsxError),

    #[error("CSV read error: {0}")]
    CsvRead(#[from] csv::Error),

    #[error("Data not found: {0}")]
    NotFound(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),
}

/// Failures that abort a dataset read before any data is produced.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Dataset \"{0}\" does not exist")]
    UnknownDataset(String),

    #[error(transparent)]
    Pivot(#[from] PivotError),
}
