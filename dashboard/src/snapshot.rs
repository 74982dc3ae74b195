//! FILENAME: dashboard/src/snapshot.rs
//! PURPOSE: One point in the pivot history: every control value plus the data
//! needed to render it.
//! CONTEXT: Snapshots are never mutated once they are in the history. Data
//! sections are behind `Arc`, so deriving a new snapshot from the current one
//! (a control change) copies pointers, not rows.

use engine::{CategoricalValues, Filter, Record};
use pivot_engine::{GraphType, LoadComparison, LoadTable, SummaryItem, NO_ANIMATION};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// CONTROLS
// ============================================================================

/// The user-selectable controls of the pivot view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlName {
    XAxis,
    YAxis,
    ColorAxis,
    RadiusAxis,
    Animate,
    Datapoint,
    #[serde(rename = "graphtype")]
    GraphType,
}

impl ControlName {
    pub const AXES: [ControlName; 4] = [
        ControlName::XAxis,
        ControlName::YAxis,
        ControlName::ColorAxis,
        ControlName::RadiusAxis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlName::XAxis => "xAxis",
            ControlName::YAxis => "yAxis",
            ControlName::ColorAxis => "colorAxis",
            ControlName::RadiusAxis => "radiusAxis",
            ControlName::Animate => "animate",
            ControlName::Datapoint => "datapoint",
            ControlName::GraphType => "graphtype",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ControlName::XAxis => "X Axis",
            ControlName::YAxis => "Y Axis",
            ControlName::ColorAxis => "Color",
            ControlName::RadiusAxis => "Size",
            ControlName::Animate => "Time Animation",
            ControlName::Datapoint => "Aggregate By",
            ControlName::GraphType => "Graph Type",
        }
    }

    pub fn is_axis(self) -> bool {
        Self::AXES.contains(&self)
    }
}

impl fmt::Display for ControlName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One control set to one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChange {
    pub name: ControlName,
    pub value: String,
}

impl ControlChange {
    pub fn new(name: ControlName, value: impl Into<String>) -> Self {
        ControlChange {
            name,
            value: value.into(),
        }
    }
}

// ============================================================================
// LAST ACTION
// ============================================================================

/// The event that produced a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LastAction {
    #[default]
    Init,
    /// Marker pushed when the user picks another dataset; carries no data.
    ChangeDataset { from: Option<String>, to: String },
    DatasetAndDatapoint,
    Control { name: ControlName },
    ControlVector,
    Filter,
    ChangeLoad,
}

impl LastAction {
    pub fn tag(&self) -> &str {
        match self {
            LastAction::Init => "init",
            LastAction::ChangeDataset { .. } => "change_dataset",
            LastAction::DatasetAndDatapoint => "dataset_and_datapoint",
            LastAction::Control { name } => name.as_str(),
            LastAction::ControlVector => "control_vector",
            LastAction::Filter => "filter",
            LastAction::ChangeLoad => "change_load",
        }
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PivotSnapshot {
    pub dataset: Option<String>,
    /// Native name of the datapoint column.
    pub datapoint: Option<String>,
    /// Axis selections hold the alias of the plotted field.
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub color_axis: Option<String>,
    pub radius_axis: Option<String>,
    /// Native name of the animation column, or "None".
    pub animate: String,
    #[serde(rename = "graphtype")]
    pub graph_type: GraphType,
    pub filter: Filter,
    pub load_table: Option<LoadTable>,
    pub categorical_values: Arc<CategoricalValues>,
    pub pivoted_data: Arc<Vec<Record>>,
    pub processed_data: Arc<Vec<Record>>,
    pub summary_data: Arc<Vec<SummaryItem>>,
    pub load_comparison_data: Arc<Vec<LoadComparison>>,
    pub last: LastAction,
}

impl Default for PivotSnapshot {
    fn default() -> Self {
        PivotSnapshot {
            dataset: None,
            datapoint: None,
            x_axis: None,
            y_axis: None,
            color_axis: None,
            radius_axis: None,
            animate: NO_ANIMATION.to_string(),
            graph_type: GraphType::default(),
            filter: Filter::new(),
            load_table: None,
            categorical_values: Arc::default(),
            pivoted_data: Arc::default(),
            processed_data: Arc::default(),
            summary_data: Arc::default(),
            load_comparison_data: Arc::default(),
            last: LastAction::Init,
        }
    }
}

impl PivotSnapshot {
    /// The lightweight marker recorded when switching datasets.
    pub fn dataset_marker(from: Option<String>, to: impl Into<String>) -> Self {
        PivotSnapshot {
            last: LastAction::ChangeDataset { from, to: to.into() },
            ..Default::default()
        }
    }

    pub fn is_marker(&self) -> bool {
        matches!(self.last, LastAction::ChangeDataset { .. })
    }

    /// The current value of a control as stored in the snapshot.
    pub fn control(&self, name: ControlName) -> Option<&str> {
        match name {
            ControlName::XAxis => self.x_axis.as_deref(),
            ControlName::YAxis => self.y_axis.as_deref(),
            ControlName::ColorAxis => self.color_axis.as_deref(),
            ControlName::RadiusAxis => self.radius_axis.as_deref(),
            ControlName::Animate => Some(self.animate.as_str()),
            ControlName::Datapoint => self.datapoint.as_deref(),
            ControlName::GraphType => Some(self.graph_type.as_str()),
        }
    }

    pub fn set_control(&mut self, name: ControlName, value: impl Into<String>) {
        let value = value.into();
        match name {
            ControlName::XAxis => self.x_axis = Some(value),
            ControlName::YAxis => self.y_axis = Some(value),
            ControlName::ColorAxis => self.color_axis = Some(value),
            ControlName::RadiusAxis => self.radius_axis = Some(value),
            ControlName::Animate => self.animate = value,
            ControlName::Datapoint => self.datapoint = Some(value),
            ControlName::GraphType => self.graph_type = GraphType::from_name(&value),
        }
    }

    /// Animation is only meaningful on bubble charts.
    pub(crate) fn enforce_animation_rule(&mut self) {
        if self.graph_type != GraphType::Bubble {
            self.animate = NO_ANIMATION.to_string();
        }
    }
}

// ============================================================================
// PATCH (partial snapshot for merges)
// ============================================================================

/// Fields to overwrite on the current snapshot. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotPatch {
    pub dataset: Option<String>,
    pub datapoint: Option<String>,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub color_axis: Option<String>,
    pub radius_axis: Option<String>,
    pub animate: Option<String>,
    #[serde(rename = "graphtype")]
    pub graph_type: Option<GraphType>,
    pub filter: Option<Filter>,
    /// `Some(None)` clears the load table.
    pub load_table: Option<Option<LoadTable>>,
    pub categorical_values: Option<Arc<CategoricalValues>>,
    pub pivoted_data: Option<Arc<Vec<Record>>>,
    pub processed_data: Option<Arc<Vec<Record>>>,
    pub summary_data: Option<Arc<Vec<SummaryItem>>>,
    pub load_comparison_data: Option<Arc<Vec<LoadComparison>>>,
}

impl SnapshotPatch {
    /// Shallow merge onto `base`; `last` is kept.
    pub fn apply_to(self, base: &PivotSnapshot) -> PivotSnapshot {
        let mut merged = base.clone();
        if let Some(v) = self.dataset {
            merged.dataset = Some(v);
        }
        if let Some(v) = self.datapoint {
            merged.datapoint = Some(v);
        }
        if let Some(v) = self.x_axis {
            merged.x_axis = Some(v);
        }
        if let Some(v) = self.y_axis {
            merged.y_axis = Some(v);
        }
        if let Some(v) = self.color_axis {
            merged.color_axis = Some(v);
        }
        if let Some(v) = self.radius_axis {
            merged.radius_axis = Some(v);
        }
        if let Some(v) = self.animate {
            merged.animate = v;
        }
        if let Some(v) = self.graph_type {
            merged.graph_type = v;
        }
        if let Some(v) = self.filter {
            merged.filter = v;
        }
        if let Some(v) = self.load_table {
            merged.load_table = v;
        }
        if let Some(v) = self.categorical_values {
            merged.categorical_values = v;
        }
        if let Some(v) = self.pivoted_data {
            merged.pivoted_data = v;
        }
        if let Some(v) = self.processed_data {
            merged.processed_data = v;
        }
        if let Some(v) = self.summary_data {
            merged.summary_data = v;
        }
        if let Some(v) = self.load_comparison_data {
            merged.load_comparison_data = v;
        }
        merged
    }
}
