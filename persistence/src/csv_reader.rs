// FILENAME: persistence/src/csv_reader.rs

use crate::SourceError;
use engine::{Record, Value};
use std::path::Path;

/// Reads a comma-separated file as dataset rows. The header row names the
/// columns; numeric-looking fields become numbers and empty fields are left
/// out of the record.
pub fn load_csv_rows(path: &Path) -> Result<Vec<Record>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let mut record = Record::new();
        for (name, field) in headers.iter().zip(row.iter()) {
            if name.is_empty() || field.is_empty() {
                continue;
            }
            record.insert(name.to_string(), parse_field(field));
        }
        if !record.is_empty() {
            records.push(record);
        }
    }

    Ok(records)
}

fn parse_field(field: &str) -> Value {
    match field.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Text(field.to_string()),
    }
}
