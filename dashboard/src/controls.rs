//! FILENAME: dashboard/src/controls.rs
//! PURPOSE: Control/axis resolution - which controls are enabled, what they
//! offer, and what they select.
//! CONTEXT: Everything here is derived from the active dataset's metadata,
//! the graph type, the datapoint column and the categorical value catalog.
//! Nothing is stored; the history holds only the selected values.
//!
//! Axis choices are (sorted by alias):
//! - numeric columns
//! - the datapoint itself (Date/IsoDate) or its output column (DateString),
//!   for the X and Y axes only
//! - one count field `"<alias>:<value>"` per counted categorical value

use crate::snapshot::{ControlName, PivotSnapshot, SnapshotPatch};
use engine::{CategoricalValues, ColumnFlag, ColumnType, MetadataCatalog};
use pivot_engine::{GraphType, NO_ANIMATION};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENABLEMENT
// ============================================================================

const ALL_CONTROLS: &[ControlName] = &[
    ControlName::XAxis,
    ControlName::YAxis,
    ControlName::ColorAxis,
    ControlName::RadiusAxis,
    ControlName::Animate,
    ControlName::Datapoint,
];

fn enabled_controls(graph_type: &GraphType) -> &'static [ControlName] {
    match graph_type {
        GraphType::Bubble => ALL_CONTROLS,
        GraphType::Pareto => &[ControlName::YAxis, ControlName::ColorAxis, ControlName::Datapoint],
        GraphType::Line => &[
            ControlName::XAxis,
            ControlName::YAxis,
            ControlName::Datapoint,
            ControlName::ColorAxis,
        ],
        GraphType::Force | GraphType::ForceStatus => &[ControlName::Datapoint],
        GraphType::Map => &[ControlName::Datapoint, ControlName::ColorAxis],
        GraphType::Other(_) => ALL_CONTROLS,
    }
}

/// Whether `control` is usable with `graph_type`. Unknown graph types
/// enable every control.
pub fn is_enabled(graph_type: &GraphType, control: ControlName) -> bool {
    enabled_controls(graph_type).contains(&control)
}

// ============================================================================
// TYPES
// ============================================================================

/// One entry of a choice list: the column it comes from and the label
/// (alias) the user sees. Axis selections store the alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub col: String,
    pub alias: String,
}

impl Choice {
    fn new(col: impl Into<String>, alias: impl Into<String>) -> Self {
        Choice {
            col: col.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
    pub disabled: bool,
}

/// A control ready to be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlView {
    pub name: ControlName,
    pub label: String,
    pub enabled: bool,
    pub options: Vec<ControlOption>,
}

/// Initial selection of every control for a freshly loaded dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlState {
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub color_axis: Option<String>,
    pub radius_axis: Option<String>,
    pub animate: String,
    pub datapoint: Option<String>,
    #[serde(rename = "graphtype")]
    pub graph_type: GraphType,
}

impl ControlState {
    pub fn apply(&self, snapshot: &mut PivotSnapshot) {
        snapshot.x_axis = self.x_axis.clone();
        snapshot.y_axis = self.y_axis.clone();
        snapshot.color_axis = self.color_axis.clone();
        snapshot.radius_axis = self.radius_axis.clone();
        snapshot.animate = self.animate.clone();
        snapshot.datapoint = self.datapoint.clone();
        snapshot.graph_type = self.graph_type.clone();
    }
}

/// Axis selections after stale values have been replaced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAxes {
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub color_axis: Option<String>,
    pub radius_axis: Option<String>,
}

impl ResolvedAxes {
    pub fn get(&self, axis: ControlName) -> Option<&str> {
        match axis {
            ControlName::XAxis => self.x_axis.as_deref(),
            ControlName::YAxis => self.y_axis.as_deref(),
            ControlName::ColorAxis => self.color_axis.as_deref(),
            ControlName::RadiusAxis => self.radius_axis.as_deref(),
            _ => None,
        }
    }

    fn set(&mut self, axis: ControlName, value: Option<String>) {
        match axis {
            ControlName::XAxis => self.x_axis = value,
            ControlName::YAxis => self.y_axis = value,
            ControlName::ColorAxis => self.color_axis = value,
            ControlName::RadiusAxis => self.radius_axis = value,
            _ => {}
        }
    }

    pub fn into_patch(self) -> SnapshotPatch {
        SnapshotPatch {
            x_axis: self.x_axis,
            y_axis: self.y_axis,
            color_axis: self.color_axis,
            radius_axis: self.radius_axis,
            ..Default::default()
        }
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Control resolution for one dataset, graph type and datapoint.
pub struct ControlResolver<'a> {
    catalog: &'a MetadataCatalog,
    graph_type: &'a GraphType,
    categorical_values: &'a CategoricalValues,
    datapoint: Option<&'a str>,
}

impl<'a> ControlResolver<'a> {
    pub fn new(
        catalog: &'a MetadataCatalog,
        graph_type: &'a GraphType,
        categorical_values: &'a CategoricalValues,
        datapoint: Option<&'a str>,
    ) -> Self {
        ControlResolver {
            catalog,
            graph_type,
            categorical_values,
            datapoint,
        }
    }

    /// Choice list of `control`. Graph types keep their declared order;
    /// everything else is sorted by alias.
    pub fn choices(&self, control: ControlName) -> Vec<Choice> {
        match control {
            ControlName::GraphType => GraphType::builtin()
                .into_iter()
                .map(|(g, label)| Choice::new(g.as_str(), label))
                .collect(),
            ControlName::Datapoint => {
                let mut choices: Vec<Choice> = self
                    .catalog
                    .columns_with_flag(ColumnFlag::Datapoint)
                    .into_iter()
                    .filter(|c| {
                        *self.graph_type != GraphType::Pareto
                            || !self.catalog.has_flag(c, ColumnFlag::NoPareto)
                    })
                    .map(|c| Choice::new(c, self.catalog.get_datapoint_alias(c)))
                    .collect();
                sort_by_alias(&mut choices);
                choices
            }
            ControlName::Animate => {
                let mut animations: Vec<Choice> = self
                    .catalog
                    .columns_with_flag(ColumnFlag::Animation)
                    .into_iter()
                    .map(|c| Choice::new(c, self.catalog.get_alias(c)))
                    .collect();
                sort_by_alias(&mut animations);
                let mut choices = vec![Choice::new(NO_ANIMATION, NO_ANIMATION)];
                choices.extend(animations);
                choices
            }
            axis => self.axis_choices(axis),
        }
    }

    fn axis_exclusion(axis: ControlName) -> Option<ColumnFlag> {
        match axis {
            ControlName::XAxis => Some(ColumnFlag::NoXAxis),
            ControlName::YAxis => Some(ColumnFlag::NoYAxis),
            ControlName::ColorAxis => Some(ColumnFlag::NoColor),
            ControlName::RadiusAxis => Some(ColumnFlag::NoRadius),
            _ => None,
        }
    }

    fn allowed_on_axis(&self, axis: ControlName, col: &str) -> bool {
        self.catalog.is_allowed_for_datapoint(self.datapoint, col)
            && !self.catalog.has_flag(col, ColumnFlag::NoAxis)
            && !Self::axis_exclusion(axis).is_some_and(|flag| self.catalog.has_flag(col, flag))
    }

    fn axis_choices(&self, axis: ControlName) -> Vec<Choice> {
        let mut choices: Vec<Choice> = self
            .catalog
            .numerics()
            .into_iter()
            .filter(|c| self.allowed_on_axis(axis, c))
            .map(|c| Choice::new(c, self.catalog.get_alias(c)))
            .collect();

        choices.extend(self.date_choices(axis));

        for col in self.counted_categoricals() {
            if !self.allowed_on_axis(axis, col) {
                continue;
            }
            let alias = self.catalog.get_alias(col);
            if let Some(values) = self.categorical_values.get(col) {
                choices.extend(
                    values
                        .iter()
                        .map(|v| Choice::new(col, format!("{}:{}", alias, v))),
                );
            }
        }

        sort_by_alias(&mut choices);
        choices
    }

    /// A date datapoint can be plotted on the X or Y axis.
    fn date_choices(&self, axis: ControlName) -> Vec<Choice> {
        let Some(dp) = self.datapoint else {
            return Vec::new();
        };
        if !matches!(axis, ControlName::XAxis | ControlName::YAxis) {
            return Vec::new();
        }
        let mut choices = Vec::new();
        if matches!(
            self.catalog.column_type(dp),
            Some(ColumnType::Date) | Some(ColumnType::IsoDate)
        ) && self.allowed_on_axis(axis, dp)
        {
            choices.push(Choice::new(dp, self.catalog.get_alias(dp)));
        }
        if let Some(output) = self.catalog.date_output_col(dp) {
            if self.allowed_on_axis(axis, output) {
                choices.push(Choice::new(output, self.catalog.get_alias(output)));
            }
        }
        choices
    }

    /// Categorical columns whose value counts appear in aggregated rows.
    fn counted_categoricals(&self) -> Vec<&'a str> {
        let mut cols = self.catalog.aggregate_categoricals();
        for col in self.catalog.searchable() {
            if !cols.contains(&col) && self.catalog.has_type(col, ColumnType::Categorical) {
                cols.push(col);
            }
        }
        cols.retain(|c| Some(*c) != self.datapoint);
        cols
    }

    // ========================================================================
    // INITIAL STATE
    // ========================================================================

    /// Whether `choice` is the metadata-declared default of `axis`.
    fn is_default_pivot_value(&self, axis: ControlName, choice: &Choice) -> bool {
        let Some(column) = self.catalog.column(&choice.col) else {
            return false;
        };
        let declared = match axis {
            ControlName::XAxis => column.defaults.x.as_deref(),
            ControlName::YAxis => column.defaults.y.as_deref(),
            ControlName::ColorAxis => column.defaults.color.as_deref(),
            ControlName::RadiusAxis => column.defaults.radius.as_deref(),
            _ => None,
        };
        match declared {
            Some("self") => true,
            Some(value) => format!("{}:{}", column.alias(), value) == choice.alias,
            None => false,
        }
    }

    /// Initial selections: declared axis defaults (else the first choice),
    /// no animation, the current datapoint (else the first choice) and the
    /// current graph type.
    pub fn init_state(&self) -> ControlState {
        let mut state = ControlState {
            animate: self
                .choices(ControlName::Animate)
                .first()
                .map(|c| c.alias.clone())
                .unwrap_or_else(|| NO_ANIMATION.to_string()),
            ..Default::default()
        };

        for axis in ControlName::AXES {
            let choices = self.choices(axis);
            let selected = choices
                .iter()
                .rposition(|c| self.is_default_pivot_value(axis, c))
                .unwrap_or(0);
            let value = choices.get(selected).map(|c| c.alias.clone());
            match axis {
                ControlName::XAxis => state.x_axis = value,
                ControlName::YAxis => state.y_axis = value,
                ControlName::ColorAxis => state.color_axis = value,
                _ => state.radius_axis = value,
            }
        }

        let datapoints = self.choices(ControlName::Datapoint);
        let selected = datapoints
            .iter()
            .position(|c| Some(c.col.as_str()) == self.datapoint)
            .unwrap_or(0);
        state.datapoint = datapoints.get(selected).map(|c| c.col.clone());

        let graph_types = self.choices(ControlName::GraphType);
        state.graph_type = graph_types
            .iter()
            .find(|c| c.col == self.graph_type.as_str())
            .or_else(|| graph_types.first())
            .map(|c| GraphType::from_name(&c.col))
            .unwrap_or_default();

        state
    }

    // ========================================================================
    // VIEWS
    // ========================================================================

    /// The control as the user sees it for `snapshot`'s selections.
    pub fn view(&self, control: ControlName, snapshot: &PivotSnapshot) -> ControlView {
        if control == ControlName::GraphType {
            return self.graph_type_view();
        }
        let enabled = is_enabled(self.graph_type, control);
        let geo = self.catalog.geo_columns();

        let options = self
            .choices(control)
            .into_iter()
            .enumerate()
            .map(|(i, choice)| {
                let (selected, disabled) = match control {
                    // Without the control, only "None" can be selected.
                    ControlName::Animate => {
                        let selected = if enabled {
                            choice.col == snapshot.animate
                        } else {
                            i == 0
                        };
                        (selected, !enabled)
                    }
                    ControlName::Datapoint => (
                        snapshot.datapoint.as_deref() == Some(choice.col.as_str()),
                        !enabled
                            || (*self.graph_type == GraphType::Map
                                && !geo.contains(&choice.col.as_str())),
                    ),
                    axis => (snapshot.control(axis) == Some(choice.alias.as_str()), !enabled),
                };
                let value = if control.is_axis() {
                    choice.alias.clone()
                } else {
                    choice.col
                };
                ControlOption {
                    value,
                    label: choice.alias,
                    selected,
                    disabled,
                }
            })
            .collect();

        ControlView {
            name: control,
            label: control.label().to_string(),
            enabled,
            options,
        }
    }

    /// Graph type radio list; pareto is unavailable for `noPareto`
    /// datapoints.
    pub fn graph_type_view(&self) -> ControlView {
        let no_pareto = self
            .datapoint
            .is_some_and(|dp| self.catalog.has_flag(dp, ColumnFlag::NoPareto));
        let options = GraphType::builtin()
            .into_iter()
            .map(|(g, label)| ControlOption {
                value: g.as_str().to_string(),
                label: label.to_string(),
                selected: g == *self.graph_type,
                disabled: g == GraphType::Pareto && no_pareto,
            })
            .collect();
        ControlView {
            name: ControlName::GraphType,
            label: ControlName::GraphType.label().to_string(),
            enabled: true,
            options,
        }
    }

    /// The animation column in effect: "None" unless the control is enabled.
    pub fn effective_animation<'s>(&self, snapshot: &'s PivotSnapshot) -> &'s str {
        if is_enabled(self.graph_type, ControlName::Animate) {
            snapshot.animate.as_str()
        } else {
            NO_ANIMATION
        }
    }

    /// Replaces every axis selection that is not in its choice list with the
    /// first choice.
    pub fn resolve_axes(&self, snapshot: &PivotSnapshot) -> ResolvedAxes {
        let mut resolved = ResolvedAxes::default();
        for axis in ControlName::AXES {
            let choices = self.choices(axis);
            let current = snapshot.control(axis);
            let value = match current {
                Some(v) if choices.iter().any(|c| c.alias == v) => Some(v.to_string()),
                _ => choices.first().map(|c| c.alias.clone()),
            };
            if value.as_deref() != current {
                log::debug!(
                    target: "CONTROLS",
                    "{} reset from {:?} to {:?}",
                    axis,
                    current,
                    value
                );
            }
            resolved.set(axis, value);
        }
        resolved
    }
}

fn sort_by_alias(choices: &mut [Choice]) {
    choices.sort_by(|a, b| a.alias.cmp(&b.alias));
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{ColumnDescriptor, DatasetMeta};

    fn catalog() -> MetadataCatalog {
        MetadataCatalog::new(DatasetMeta::new(
            "calls",
            vec![
                ColumnDescriptor::new("Agent", ColumnType::Categorical).with_flag(ColumnFlag::Datapoint),
                ColumnDescriptor::new("Day", ColumnType::DateString)
                    .with_flag(ColumnFlag::Datapoint)
                    .with_output("DayDate"),
                ColumnDescriptor::new("DayDate", ColumnType::Date).with_flag(ColumnFlag::NoAxis),
                ColumnDescriptor::new("Calls", ColumnType::Numeric),
                ColumnDescriptor::new("Escalations", ColumnType::Numeric).only_with(&["Agent"]),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn test_only_with_datapoint_columns() {
        let catalog = catalog();
        let values = CategoricalValues::new();
        let agent = ControlResolver::new(&catalog, &GraphType::Bubble, &values, Some("Agent"));
        let cols: Vec<String> = agent.choices(ControlName::XAxis).into_iter().map(|c| c.col).collect();
        assert_eq!(cols, vec!["Calls", "Escalations"]);

        let day = ControlResolver::new(&catalog, &GraphType::Bubble, &values, Some("Day"));
        let cols: Vec<String> = day.choices(ControlName::ColorAxis).into_iter().map(|c| c.col).collect();
        assert_eq!(cols, vec!["Calls"]);
    }

    #[test]
    fn test_graph_type_choices_keep_declared_order() {
        let catalog = catalog();
        let values = CategoricalValues::new();
        let resolver = ControlResolver::new(&catalog, &GraphType::Map, &values, None);
        let cols: Vec<String> = resolver.choices(ControlName::GraphType).into_iter().map(|c| c.col).collect();
        assert_eq!(cols, vec!["bubble", "line", "pareto", "map", "force", "forceStatus"]);
        let view = resolver.graph_type_view();
        assert!(view.options[3].selected);
    }
}
