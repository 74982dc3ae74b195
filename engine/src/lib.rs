//! FILENAME: engine/src/lib.rs
//! PURPOSE: Shared data model for the pivot dashboard.
//! CONTEXT: Re-exports the record/value types, the metadata catalog and the
//! display formats used by the pivot pipeline and the dashboard session.

pub mod metadata;
pub mod number_format;
pub mod value;

// Re-export commonly used types at the crate root
pub use metadata::{
    AxisDefaults, Binner, CalculatedSpec, CategoricalValues, ColumnDescriptor, ColumnFlag,
    ColumnType, DatasetMeta, Filter, MetadataCatalog, MetadataError, MetadataRegistry,
    AVG_SUFFIX, SUM_RECORDS,
};
pub use number_format::{format_number, CurrencyPosition, NumberFormat};
pub use value::{record_from_pairs, record_number, Record, Value};
