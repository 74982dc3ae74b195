//! FILENAME: persistence/src/lib.rs
//! Dashboard Data Source
//!
//! Reads dataset rows from JSON, XLSX or CSV files (or from memory) and turns
//! them into pivoted and processed data for a pivot request.

mod csv_reader;
mod error;
mod json_reader;
mod reader;
mod source;
mod xlsx_reader;

pub use csv_reader::load_csv_rows;
pub use error::{ReadError, SourceError};
pub use json_reader::{load_json, parse_json_rows};
pub use reader::{DatasetReader, DatasetResult, ReadMode};
pub use source::{DataSource, FileSource, MemorySource};
pub use xlsx_reader::load_xlsx_rows;
