//! FILENAME: pivot-engine/src/error.rs
//! PURPOSE: Error types for the pivot pipeline.
//! CONTEXT: `PivotError` covers configuration problems that stop a pivot
//! before it runs. `TransformError` is the per-field failure of a calculated
//! transform; the pipeline folds it to a null value and keeps going.

use engine::MetadataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PivotError {
    #[error("No datapoint column was specified")]
    MissingDatapoint,

    #[error("Column \"{0}\" is not declared in the dataset metadata")]
    UnknownColumn(String),

    #[error("Column \"{column}\" uses unknown {kind} transform \"{name}\"")]
    UnknownTransform {
        column: String,
        kind: &'static str,
        name: String,
    },

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Field \"{0}\" is missing")]
    MissingField(String),

    #[error("Field \"{0}\" is not numeric")]
    NotNumeric(String),

    #[error("Division by zero: \"{numerator}\" / \"{denominator}\"")]
    DivisionByZero {
        numerator: String,
        denominator: String,
    },

    #[error("Transform expects {expected} field(s), got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("Unknown transform \"{0}\"")]
    UnknownTransform(String),
}
