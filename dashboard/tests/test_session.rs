//! FILENAME: tests/test_session.rs
//! End-to-end tests of the session: loading, refetch decisions, stale
//! results and dataset switches through the history.

mod common;

use common::{current, filter_of, number, row_with, TestHarness};
use dashboard::{
    ControlName, DashboardConfig, FetchKind, HistoryButton, LastAction, PivotHistory,
    PivotSession, SessionError, SnapshotPatch,
};
use engine::{record_from_pairs, Record, Value};
use persistence::ReadMode;
use pivot_engine::{GraphType, LoadRow};

// ============================================================================
// OPEN
// ============================================================================

#[test]
fn test_open_loads_default_dataset() {
    let harness = TestHarness::new();
    let mut session = harness.session();
    let pending = session.open(None, None).unwrap();
    assert_eq!(pending.kind, FetchKind::Load);
    assert_eq!(pending.mode, ReadMode::All);
    assert_eq!(pending.dataset, "people");
    assert!(session.run(pending).unwrap());

    let snapshot = current(&session);
    assert_eq!(session.history().len(), 1);
    assert_eq!(snapshot.last, LastAction::Init);
    assert_eq!(snapshot.dataset.as_deref(), Some("people"));
    assert_eq!(snapshot.datapoint.as_deref(), Some("State"));
    assert_eq!(snapshot.graph_type, GraphType::Bubble);
    assert_eq!(snapshot.animate, "None");

    // Declared defaults win; radius has none and takes the first choice.
    assert_eq!(snapshot.x_axis.as_deref(), Some("Sales"));
    assert_eq!(snapshot.y_axis.as_deref(), Some("Age"));
    assert_eq!(snapshot.color_axis.as_deref(), Some("Gender:M"));
    assert_eq!(snapshot.radius_axis.as_deref(), Some("Gender:F"));

    assert_eq!(snapshot.processed_data.len(), 2);
    let ny = row_with(&snapshot.processed_data, "State", "NY");
    assert_eq!(number(ny, "Sales"), Some(30.0));

    assert_eq!(snapshot.summary_data.len(), 1);
    assert_eq!(snapshot.summary_data[0].name, "Sales");
    assert_eq!(snapshot.summary_data[0].value, 35.0);

    assert_eq!(snapshot.load_comparison_data.len(), 1);
    assert_eq!(snapshot.load_comparison_data[0].before, 35.0);
    assert_eq!(snapshot.load_comparison_data[0].after, 35.0);
}

#[test]
fn test_open_unknown_dataset_is_rejected() {
    let harness = TestHarness::new();
    let mut session = harness.session();
    let err = session.open(Some("nope"), None).unwrap_err();
    assert!(matches!(err, SessionError::UnknownDataset(name) if name == "nope"));
    assert!(session.current().is_none());
}

#[test]
fn test_open_with_supplied_rows() {
    let harness = TestHarness::new();
    let mut session = harness.session();
    let mut row = Record::new();
    row.insert("State".to_string(), Value::from("TX"));
    row.insert("Gender".to_string(), Value::from("F"));
    row.insert("Sales".to_string(), Value::from(7.0));

    let pending = session.open(Some("people"), Some(vec![row])).unwrap();
    session.run(pending).unwrap();
    let snapshot = current(&session);
    assert_eq!(snapshot.processed_data.len(), 1);
    assert_eq!(number(&snapshot.processed_data[0], "Sales"), Some(7.0));
}

#[test]
fn test_session_from_config() {
    let harness = TestHarness::new();
    harness.write_file("metadata.json", common::METADATA_JSON);
    harness.write_file(
        "dashboard.json",
        r#"{
            "dataFolder": ".",
            "metadataFile": "metadata.json",
            "defaultDataset": "peopleByGender",
            "historyCapacity": 3
        }"#,
    );
    let config = DashboardConfig::from_path(&harness.path("dashboard.json")).unwrap();
    let mut session = PivotSession::from_config(&config).unwrap();

    let pending = session.open(None, None).unwrap();
    assert_eq!(pending.dataset, "peopleByGender");
    session.run(pending).unwrap();
    assert_eq!(current(&session).datapoint.as_deref(), Some("Gender"));

    for value in ["Sales", "State:NY", "State:CA", "Sales"] {
        assert!(session.change_control(ControlName::XAxis, value).unwrap().is_none());
    }
    assert_eq!(session.history().len(), 3);
}

#[test]
fn test_from_config_rejects_unknown_default_dataset() {
    let harness = TestHarness::new();
    harness.write_file("metadata.json", common::METADATA_JSON);
    let config = DashboardConfig {
        data_folder: harness.path("."),
        metadata_file: harness.path("metadata.json"),
        default_dataset: Some("missing".to_string()),
        ..Default::default()
    };
    let err = PivotSession::from_config(&config).err().unwrap();
    assert!(matches!(err, SessionError::UnknownDataset(_)));
}

// ============================================================================
// REFETCH DECISIONS
// ============================================================================

#[test]
fn test_axis_change_needs_no_fetch() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let pending = session.change_control(ControlName::XAxis, "Age").unwrap();
    assert!(pending.is_none());
    let snapshot = current(&session);
    assert_eq!(snapshot.x_axis.as_deref(), Some("Age"));
    assert_eq!(snapshot.last, LastAction::Control { name: ControlName::XAxis });
    assert_eq!(session.history().len(), 2);
}

#[test]
fn test_filter_change_refreshes_current_snapshot() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let pending = session
        .change_filter(filter_of(&[("State", &["NY"])]))
        .unwrap()
        .expect("filter change refetches");
    assert_eq!(pending.kind, FetchKind::Refresh);
    assert_eq!(pending.mode, ReadMode::Increment);
    assert!(session.run(pending).unwrap());

    let snapshot = current(&session);
    assert_eq!(session.history().len(), 2);
    assert_eq!(snapshot.last, LastAction::Filter);
    assert_eq!(snapshot.processed_data.len(), 1);
    assert_eq!(snapshot.summary_data[0].value, 30.0);
    // Incremental reads keep the categorical values already known.
    assert!(snapshot.categorical_values.contains_key("Gender"));
}

#[test]
fn test_load_table_redistributes_and_compares() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    session.apply(dashboard::PivotEvent::ChangeFilter(filter_of(&[("State", &["NY"])]))).unwrap();

    let pending = session
        .change_load(Some(vec![LoadRow::new("Gender:M").with_load("Load", 0.0)]))
        .unwrap()
        .expect("load change refetches");
    session.run(pending).unwrap();

    let snapshot = current(&session);
    assert_eq!(snapshot.last, LastAction::ChangeLoad);
    assert_eq!(number(&snapshot.processed_data[0], "Sales"), Some(15.0));
    let comparison = &snapshot.load_comparison_data[0];
    assert_eq!(comparison.header, "Load");
    assert_eq!(comparison.before, 30.0);
    assert_eq!(comparison.after, 15.0);
    assert_eq!(comparison.ratio, Some(0.5));
}

#[test]
fn test_datapoint_change_resets_stale_axes() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let pending = session
        .change_control(ControlName::Datapoint, "Gender")
        .unwrap()
        .expect("datapoint change refetches");
    session.run(pending).unwrap();

    let snapshot = current(&session);
    assert!(row_with(&snapshot.processed_data, "Gender", "M").get("Sales").is_some());
    assert_eq!(snapshot.x_axis.as_deref(), Some("Sales"));
    assert_eq!(snapshot.y_axis.as_deref(), Some("Age"));
    // Gender counts no longer exist when aggregating by Gender.
    assert_eq!(snapshot.color_axis.as_deref(), Some("Age"));
    assert_eq!(snapshot.radius_axis.as_deref(), Some("Sales"));
}

#[test]
fn test_animation_groups_bubble_data() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let pending = session
        .change_control(ControlName::Animate, "Year")
        .unwrap()
        .expect("animation change refetches");
    session.run(pending).unwrap();
    assert_eq!(current(&session).pivoted_data.len(), 3);

    // Leaving the bubble chart drops the animation and its grouping.
    let pending = session
        .change_control(ControlName::GraphType, "line")
        .unwrap()
        .expect("losing the animation refetches");
    session.run(pending).unwrap();
    let snapshot = current(&session);
    assert_eq!(snapshot.animate, "None");
    assert_eq!(snapshot.pivoted_data.len(), 2);
}

#[test]
fn test_force_graph_reads_raw_rows() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let pending = session
        .change_control(ControlName::GraphType, "force")
        .unwrap()
        .expect("force graph refetches");
    session.run(pending).unwrap();
    assert_eq!(current(&session).pivoted_data.len(), 3);
}

#[test]
fn test_undo_to_other_filter_refetches() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    session.apply(dashboard::PivotEvent::ChangeFilter(filter_of(&[("State", &["NY"])]))).unwrap();
    assert_eq!(current(&session).processed_data.len(), 1);

    let pending = session
        .press_button(HistoryButton::Undo)
        .unwrap()
        .expect("undo across a filter change refetches");
    session.run(pending).unwrap();
    assert_eq!(session.history().cursor(), 0);
    assert_eq!(current(&session).processed_data.len(), 2);
}

#[test]
fn test_push_and_merge_never_fetch() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let mut snapshot = current(&session).clone();
    snapshot.filter = filter_of(&[("State", &["CA"])]);
    assert!(session.push(snapshot).unwrap().is_none());
    assert_eq!(session.history().len(), 2);

    let patch = SnapshotPatch {
        x_axis: Some("Age".to_string()),
        ..Default::default()
    };
    assert!(session.merge(patch).unwrap().is_none());
    assert_eq!(session.history().len(), 2);
    assert_eq!(current(&session).x_axis.as_deref(), Some("Age"));
}

// ============================================================================
// STALE RESULTS
// ============================================================================

#[test]
fn test_stale_result_is_dropped() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let first = session.change_filter(filter_of(&[("State", &["NY"])])).unwrap().unwrap();
    let second = session.change_filter(filter_of(&[("State", &["CA"])])).unwrap().unwrap();
    assert!(second.token > first.token);

    let first_result = session.execute(&first).unwrap();
    let second_result = session.execute(&second).unwrap();

    // The newer result lands first; the older one arrives late.
    assert!(session.complete(second, second_result).unwrap());
    assert!(!session.complete(first, first_result).unwrap());

    let snapshot = current(&session);
    assert_eq!(snapshot.processed_data.len(), 1);
    row_with(&snapshot.processed_data, "State", "CA");
}

#[test]
fn test_only_latest_token_lands() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let first = session.change_filter(filter_of(&[("State", &["NY"])])).unwrap().unwrap();
    let result = session.execute(&first).unwrap();
    let _second = session.change_filter(filter_of(&[("State", &["CA"])])).unwrap().unwrap();
    assert!(!session.is_latest(first.token));
    assert!(!session.complete(first, result).unwrap());
    // The CA snapshot still holds the data it was derived with.
    assert_eq!(current(&session).processed_data.len(), 2);
}

// ============================================================================
// DATASET SWITCHES
// ============================================================================

#[test]
fn test_dataset_change_loads_and_undo_skips_marker() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let pending = session
        .change_dataset("peopleByGender")
        .unwrap()
        .expect("dataset change loads");
    assert_eq!(pending.kind, FetchKind::Load);
    assert_eq!(pending.dataset, "peopleByGender");
    assert!(current(&session).is_marker());
    assert_eq!(
        current(&session).last,
        LastAction::ChangeDataset {
            from: Some("people".to_string()),
            to: "peopleByGender".to_string(),
        }
    );

    assert!(session.run(pending).unwrap());
    let snapshot = current(&session);
    assert_eq!(session.history().len(), 3);
    assert_eq!(snapshot.dataset.as_deref(), Some("peopleByGender"));
    assert_eq!(snapshot.datapoint.as_deref(), Some("Gender"));
    assert_eq!(snapshot.processed_data.len(), 2);

    // History moves between datasets without reading again.
    assert!(session.press_button(HistoryButton::Undo).unwrap().is_none());
    assert_eq!(session.history().cursor(), 0);
    assert_eq!(current(&session).dataset.as_deref(), Some("people"));

    assert!(session.press_button(HistoryButton::Redo).unwrap().is_none());
    assert_eq!(session.history().cursor(), 2);
    assert_eq!(current(&session).dataset.as_deref(), Some("peopleByGender"));
}

#[test]
fn test_abandoned_dataset_load_is_dropped() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let pending = session.change_dataset("peopleByGender").unwrap().unwrap();
    assert!(session.press_button(HistoryButton::Undo).unwrap().is_none());

    let result = session.execute(&pending).unwrap();
    assert!(!session.complete(pending, result).unwrap());
    assert_eq!(current(&session).dataset.as_deref(), Some("people"));
    assert_eq!(session.history().len(), 2);
}

#[test]
fn test_undo_stops_at_evicted_dataset_marker() {
    let harness = TestHarness::new();
    let mut session = harness.session().with_history(PivotHistory::with_max_size(5));
    let pending = session.open(None, None).unwrap();
    session.run(pending).unwrap();
    let pending = session.change_dataset("peopleByGender").unwrap().unwrap();
    session.run(pending).unwrap();
    for x in ["Age", "Sales", "Age"] {
        assert!(session.change_control(ControlName::XAxis, x).unwrap().is_none());
    }
    // The first load was evicted, leaving the marker in front.
    assert_eq!(session.history().len(), 5);
    assert!(session.history().snapshots().next().unwrap().is_marker());

    for _ in 0..4 {
        assert!(session.press_button(HistoryButton::Undo).unwrap().is_none());
    }
    assert_eq!(session.history().cursor(), 1);
    assert!(!current(&session).is_marker());
    assert_eq!(current(&session).dataset.as_deref(), Some("peopleByGender"));
    assert_eq!(session.history().len(), 5);
    assert!(session.history().can_redo());
}

#[test]
fn test_change_to_unknown_dataset_is_rejected() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let err = session.change_dataset("nope").unwrap_err();
    assert!(matches!(err, SessionError::UnknownDataset(name) if name == "nope"));
    assert_eq!(session.history().len(), 1);
}

#[test]
fn test_dataset_and_datapoint_always_refreshes() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let pending = session
        .change_dataset_and_datapoint("people", "Gender")
        .unwrap()
        .expect("refresh");
    assert_eq!(pending.kind, FetchKind::Refresh);
    assert_eq!(pending.request.datapoint.as_deref(), Some("Gender"));
    session.run(pending).unwrap();

    let snapshot = current(&session);
    assert_eq!(snapshot.last, LastAction::DatasetAndDatapoint);
    row_with(&snapshot.processed_data, "Gender", "F");
}

// ============================================================================
// CONTROL VIEWS
// ============================================================================

#[test]
fn test_map_view_offers_only_geo_datapoints() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    assert!(session.change_control(ControlName::GraphType, "map").unwrap().is_none());

    let views = session.control_views().unwrap();
    let datapoint = views.iter().find(|v| v.name == ControlName::Datapoint).unwrap();
    let gender = datapoint.options.iter().find(|o| o.value == "Gender").unwrap();
    let state = datapoint.options.iter().find(|o| o.value == "State").unwrap();
    assert!(gender.disabled);
    assert!(!state.disabled);
    assert!(state.selected);

    let x_axis = views.iter().find(|v| v.name == ControlName::XAxis).unwrap();
    assert!(!x_axis.enabled);
    let color = views.iter().find(|v| v.name == ControlName::ColorAxis).unwrap();
    assert!(color.enabled);
}

#[test]
fn test_pareto_unavailable_for_no_pareto_datapoint() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let views = session.control_views().unwrap();
    let pareto = views[0].options.iter().find(|o| o.value == "pareto").unwrap();
    assert!(!pareto.disabled);

    session.apply(dashboard::PivotEvent::ChangeControl {
        name: ControlName::Datapoint,
        value: "Gender".to_string(),
    })
    .unwrap();
    let views = session.control_views().unwrap();
    assert_eq!(views[0].name, ControlName::GraphType);
    let pareto = views[0].options.iter().find(|o| o.value == "pareto").unwrap();
    assert!(pareto.disabled);
}

#[test]
fn test_control_vector_is_one_step() {
    let harness = TestHarness::new();
    let mut session = harness.opened_session();
    let changes = vec![
        dashboard::ControlChange::new(ControlName::XAxis, "Age"),
        dashboard::ControlChange::new(ControlName::YAxis, "Sales"),
    ];
    assert!(session.change_control_vector(changes).unwrap().is_none());
    let snapshot = current(&session);
    assert_eq!(snapshot.last, LastAction::ControlVector);
    assert_eq!(snapshot.x_axis.as_deref(), Some("Age"));
    assert_eq!(snapshot.y_axis.as_deref(), Some("Sales"));

    session.press_button(HistoryButton::Undo).unwrap();
    let snapshot = current(&session);
    assert_eq!(snapshot.x_axis.as_deref(), Some("Sales"));
    assert_eq!(snapshot.y_axis.as_deref(), Some("Age"));
}

#[test]
fn test_record_helper_rows_feed_sessions() {
    let harness = TestHarness::new();
    let mut session = harness.session();
    let mut row = record_from_pairs([("Sales", 4.0)]);
    row.insert("State".to_string(), Value::from("WA"));
    let pending = session.open(None, Some(vec![row])).unwrap();
    session.run(pending).unwrap();
    row_with(&current(&session).processed_data, "State", "WA");
}
