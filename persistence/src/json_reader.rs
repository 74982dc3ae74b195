//! FILENAME: persistence/src/json_reader.rs
//! PURPOSE: Reads dataset rows from a JSON file.
//! CONTEXT: A dataset file holds an array of flat objects, one per row.
//! Anything that is not an array yields no rows rather than an error, so a
//! malformed file renders as "No Data".

use crate::SourceError;
use engine::{Record, Value};
use std::path::Path;

pub fn load_json(path: &Path) -> Result<Vec<Record>, SourceError> {
    let text = std::fs::read_to_string(path)?;
    parse_json_rows(&text)
}

pub fn parse_json_rows(text: &str) -> Result<Vec<Record>, SourceError> {
    let doc: serde_json::Value = serde_json::from_str(text)?;
    let items = match doc {
        serde_json::Value::Array(items) => items,
        other => {
            log::warn!(
                target: "DATA",
                "dataset JSON is a {} instead of an array; using no rows",
                json_kind(&other)
            );
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::Object(fields) => Some(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, json_to_value(v)))
                    .collect::<Record>(),
            ),
            _ => None,
        })
        .collect())
}

/// Nested arrays and objects are kept as their JSON text.
fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::Text(s),
        nested => Value::Text(nested.to_string()),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
