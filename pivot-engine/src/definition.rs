//! FILENAME: pivot-engine/src/definition.rs
//! Pivot Definition - The serializable description of a pivot request.
//!
//! This module contains the types needed to DESCRIBE a pivot:
//! - The graph type, which decides whether rows are aggregated at all
//! - The what-if Load Table
//! - The request itself (datapoint, filter, animation, load table)
//!
//! These are plain snapshots of user intent; nothing here computes.

use engine::Filter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Load Table key that applies to every row in full.
pub const GENERAL_IMPROVEMENT: &str = "__general__";

/// Animation selection meaning "do not animate".
pub const NO_ANIMATION: &str = "None";

/// Name of the per-row ordinal added to aggregated rows.
pub const ROW_ID: &str = "id";

// ============================================================================
// GRAPH TYPE
// ============================================================================

/// Chart variant selected by the user. Unknown names are kept verbatim so
/// that control enablement can fall back to its default entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GraphType {
    #[default]
    Bubble,
    Pareto,
    Line,
    Force,
    ForceStatus,
    Map,
    Other(String),
}

impl GraphType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "bubble" => GraphType::Bubble,
            "pareto" => GraphType::Pareto,
            "line" => GraphType::Line,
            "force" => GraphType::Force,
            "forceStatus" => GraphType::ForceStatus,
            "map" => GraphType::Map,
            other => GraphType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GraphType::Bubble => "bubble",
            GraphType::Pareto => "pareto",
            GraphType::Line => "line",
            GraphType::Force => "force",
            GraphType::ForceStatus => "forceStatus",
            GraphType::Map => "map",
            GraphType::Other(name) => name,
        }
    }

    /// Force graphs draw individual rows, so their data is never aggregated.
    pub fn is_force(&self) -> bool {
        matches!(self, GraphType::Force | GraphType::ForceStatus)
    }

    /// The built-in graph types in the order they are offered, with labels.
    pub fn builtin() -> [(GraphType, &'static str); 6] {
        [
            (GraphType::Bubble, "Bubble"),
            (GraphType::Line, "Line"),
            (GraphType::Pareto, "Pareto"),
            (GraphType::Map, "Map"),
            (GraphType::Force, "Network"),
            (GraphType::ForceStatus, "Network Status"),
        ]
    }
}

impl From<String> for GraphType {
    fn from(name: String) -> Self {
        GraphType::from_name(&name)
    }
}

impl From<GraphType> for String {
    fn from(graph_type: GraphType) -> Self {
        graph_type.as_str().to_string()
    }
}

impl std::fmt::Display for GraphType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LOAD TABLE
// ============================================================================

/// One what-if row: a categorical key (`"<alias>:<value>"` or
/// `GENERAL_IMPROVEMENT`) and a percentage per what-if header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRow {
    pub value: String,
    #[serde(flatten)]
    pub loads: BTreeMap<String, f64>,
}

impl LoadRow {
    pub fn new(value: impl Into<String>) -> Self {
        LoadRow {
            value: value.into(),
            loads: BTreeMap::new(),
        }
    }

    pub fn with_load(mut self, header: impl Into<String>, percent: f64) -> Self {
        self.loads.insert(header.into(), percent);
        self
    }
}

/// The Load Table is replaced as a whole on every submission.
pub type LoadTable = Vec<LoadRow>;

/// Whether two (optional) load tables differ in any key's percentages.
/// Row order is irrelevant; a missing table differs from a present one.
pub fn load_table_changed(old: Option<&LoadTable>, new: Option<&LoadTable>) -> bool {
    match (old, new) {
        (None, None) => false,
        (Some(_), None) | (None, Some(_)) => true,
        (Some(old), Some(new)) => {
            let as_map = |table: &LoadTable| -> BTreeMap<String, BTreeMap<String, f64>> {
                table
                    .iter()
                    .map(|row| (row.value.clone(), row.loads.clone()))
                    .collect()
            };
            as_map(old) != as_map(new)
        }
    }
}

// ============================================================================
// PIVOT REQUEST
// ============================================================================

/// Everything the data source needs to produce pivoted data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotRequest {
    #[serde(default)]
    pub datapoint: Option<String>,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub load_table: Option<LoadTable>,
    #[serde(default)]
    pub graph_type: GraphType,
    /// Native name of the animation column, if animating.
    #[serde(default)]
    pub animation: Option<String>,
}

impl PivotRequest {
    pub fn new(datapoint: impl Into<String>) -> Self {
        PivotRequest {
            datapoint: Some(datapoint.into()),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_load_table(mut self, load_table: LoadTable) -> Self {
        self.load_table = Some(load_table);
        self
    }

    pub fn with_graph_type(mut self, graph_type: GraphType) -> Self {
        self.graph_type = graph_type;
        self
    }

    pub fn with_animation(mut self, animation: impl Into<String>) -> Self {
        self.animation = Some(animation.into());
        self
    }

    /// The animation column, if one is selected and the chart can animate.
    pub fn active_animation(&self) -> Option<&str> {
        match (&self.graph_type, self.animation.as_deref()) {
            (GraphType::Bubble, Some(col)) if col != NO_ANIMATION && !col.is_empty() => Some(col),
            _ => None,
        }
    }
}
