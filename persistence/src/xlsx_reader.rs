// FILENAME: persistence/src/xlsx_reader.rs

use crate::SourceError;
use calamine::{open_workbook, Data, Reader, Xlsx};
use engine::{Record, Value};
use std::path::Path;

/// Days between the Excel epoch (1899-12-30) and the Unix epoch.
const EXCEL_UNIX_EPOCH_DAYS: f64 = 25_569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Reads the first worksheet as dataset rows. The first row holds the column
/// names; empty cells are left out of the record.
pub fn load_xlsx_rows(path: &Path) -> Result<Vec<Record>, SourceError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet_names = workbook.sheet_names().to_vec();

    let first = sheet_names
        .first()
        .ok_or_else(|| SourceError::InvalidFormat("Workbook contains no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| SourceError::InvalidFormat(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<Option<String>> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| match cell {
                Data::Empty => None,
                other => Some(other.to_string()),
            })
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for row in rows {
        let mut record = Record::new();
        for (col_idx, cell) in row.iter().enumerate() {
            let Some(Some(name)) = headers.get(col_idx) else {
                continue;
            };
            let value = match cell {
                Data::Empty => continue,
                Data::String(s) => Value::Text(s.clone()),
                Data::Float(f) => Value::Number(*f),
                Data::Int(i) => Value::Number(*i as f64),
                Data::Bool(b) => Value::Bool(*b),
                Data::Error(_) => Value::Null,
                Data::DateTime(dt) => Value::Number(excel_serial_to_epoch_millis(dt.as_f64())),
                Data::DateTimeIso(s) => Value::Text(s.clone()),
                Data::DurationIso(s) => Value::Text(s.clone()),
            };
            record.insert(name.clone(), value);
        }
        if !record.is_empty() {
            records.push(record);
        }
    }

    Ok(records)
}

fn excel_serial_to_epoch_millis(serial: f64) -> f64 {
    ((serial - EXCEL_UNIX_EPOCH_DAYS) * MILLIS_PER_DAY).round()
}
