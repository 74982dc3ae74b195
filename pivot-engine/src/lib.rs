//! FILENAME: pivot-engine/src/lib.rs
//! Pivot data pipeline for the dashboard.
//!
//! This crate turns raw dataset rows into chart-ready rows. It depends on
//! `engine` only for shared types (Value, Record, MetadataCatalog).
//!
//! Layers:
//! - `definition`: Serializable request types (what the pivot IS)
//! - `cache`: Interned values and group accumulators (HOW we aggregate)
//! - `aggregate`: Filtering, categorical values and the grouping scan
//! - `whatif`: Load Table redistribution
//! - `transforms`: Named transforms referenced from metadata
//! - `pipeline`: The ordered transform stages
//! - `summary`: Chart totals and load comparison

pub mod aggregate;
pub mod cache;
pub mod dates;
pub mod definition;
pub mod error;
pub mod pipeline;
pub mod summary;
pub mod transforms;
pub mod whatif;

pub use aggregate::{aggregate, categorical_values, filter_rows, row_passes, transformed_data, AggregationPlan};
pub use definition::*;
pub use error::{PivotError, TransformError};
pub use pipeline::PivotPipeline;
pub use summary::{load_comparison_data, summary_data, LoadComparison, SummaryItem};
pub use transforms::{CalcArgs, DatasetArgs, NumericInfo, TransformRegistry};
pub use whatif::{fraction_of_total, redistribute, TargetTable};
