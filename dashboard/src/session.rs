//! FILENAME: dashboard/src/session.rs
//! PURPOSE: The dispatch surface of the pivot view.
//! CONTEXT: A session owns the metadata, the transform registry, a data
//! source and the history. Events are applied one at a time. When an event
//! makes the current data stale, `dispatch` returns a `PendingFetch`; the
//! caller runs it (possibly elsewhere) and hands the result back through
//! `complete`. Only the most recently issued fetch may land: an older
//! result arriving late is dropped instead of overwriting newer state.

use crate::config::DashboardConfig;
use crate::controls::{ControlResolver, ControlView};
use crate::history::{HistoryButton, PivotHistory};
use crate::snapshot::{ControlChange, ControlName, LastAction, PivotSnapshot, SnapshotPatch};
use crate::{log_debug, log_enter, log_exit, log_info, ConfigError};
use engine::{Filter, MetadataCatalog, MetadataError, MetadataRegistry, Record};
use persistence::{DataSource, DatasetReader, DatasetResult, FileSource, ReadError, ReadMode};
use pivot_engine::{
    load_comparison_data, load_table_changed, summary_data, GraphType, LoadTable, PivotError,
    PivotRequest, TransformRegistry,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Pivot(#[from] PivotError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Dataset \"{0}\" does not exist")]
    UnknownDataset(String),

    #[error("No dataset is available")]
    NoDataset,
}

// ============================================================================
// EVENTS AND FETCHES
// ============================================================================

/// Every transition the pivot view can request.
#[derive(Debug, Clone, PartialEq)]
pub enum PivotEvent {
    Push(PivotSnapshot),
    Merge(SnapshotPatch),
    ChangeControl { name: ControlName, value: String },
    ChangeControlVector(Vec<ControlChange>),
    ChangeFilter(Filter),
    ChangeDataset(String),
    ChangeDatasetAndDatapoint { dataset: String, datapoint: String },
    PressButton(HistoryButton),
    ChangeLoad(Option<LoadTable>),
}

/// Monotonic id of an issued fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Load a dataset from scratch; completion pushes a new snapshot.
    Load,
    /// Re-read the current dataset; completion merges into the current one.
    Refresh,
}

/// A read the caller must perform before the view is up to date.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    pub token: RequestToken,
    pub kind: FetchKind,
    pub dataset: String,
    pub mode: ReadMode,
    pub request: PivotRequest,
    raw_rows: Option<Vec<Record>>,
    /// Issued for a dataset marker; only lands while that marker is current.
    from_marker: bool,
}

/// JSON, XLSX and CSV datasets are read directly; anything else goes
/// through the aggregating read (`All` first, `Increment` afterwards).
pub fn read_mode_for(dataset: &str, kind: FetchKind) -> ReadMode {
    let lower = dataset.to_ascii_lowercase();
    if [".json", ".xlsx", ".csv"].iter().any(|ext| lower.ends_with(ext)) {
        ReadMode::File
    } else if kind == FetchKind::Load {
        ReadMode::All
    } else {
        ReadMode::Increment
    }
}

/// Whether a snapshot built for `old` must be re-read to show `new`.
fn request_changed(old: &PivotRequest, new: &PivotRequest) -> bool {
    old.datapoint != new.datapoint
        || old.filter != new.filter
        || load_table_changed(old.load_table.as_ref(), new.load_table.as_ref())
        || old.graph_type.is_force() != new.graph_type.is_force()
        || old.active_animation() != new.active_animation()
}

// ============================================================================
// SESSION
// ============================================================================

pub struct PivotSession<S: DataSource> {
    metadata: MetadataRegistry,
    transforms: TransformRegistry,
    source: S,
    history: PivotHistory,
    default_dataset: Option<String>,
    issued: u64,
}

impl PivotSession<FileSource> {
    /// Session over the configured data folder and metadata file.
    pub fn from_config(config: &DashboardConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let metadata = MetadataRegistry::from_path(&config.metadata_file)?;
        let mut session = PivotSession::new(
            metadata,
            TransformRegistry::with_builtins(),
            FileSource::new(config.data_folder.clone()),
        )?;
        if let Some(dataset) = &config.default_dataset {
            if !session.metadata.contains(dataset) {
                return Err(SessionError::UnknownDataset(dataset.clone()));
            }
        }
        session.history = PivotHistory::with_max_size(config.history_capacity);
        session.default_dataset = config.default_dataset.clone();
        Ok(session)
    }
}

impl<S: DataSource> PivotSession<S> {
    /// Fails if any dataset names a transform the registry does not know.
    pub fn new(
        metadata: MetadataRegistry,
        transforms: TransformRegistry,
        source: S,
    ) -> Result<Self, SessionError> {
        for dataset in metadata.dataset_names() {
            transforms.validate(&metadata.catalog(dataset)?)?;
        }
        Ok(PivotSession {
            metadata,
            transforms,
            source,
            history: PivotHistory::new(),
            default_dataset: None,
            issued: 0,
        })
    }

    pub fn with_history(mut self, history: PivotHistory) -> Self {
        self.history = history;
        self
    }

    pub fn history(&self) -> &PivotHistory {
        &self.history
    }

    pub fn current(&self) -> Option<&PivotSnapshot> {
        self.history.current()
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    /// Dataset opened when none is named: the configured one, else the
    /// metadata default.
    pub fn default_dataset(&self) -> Option<&str> {
        self.default_dataset
            .as_deref()
            .or_else(|| self.metadata.default_dataset())
    }

    /// Catalog of the dataset shown by the current snapshot.
    pub fn catalog(&self) -> Result<MetadataCatalog, SessionError> {
        let dataset = self
            .current()
            .and_then(|s| s.dataset.as_deref())
            .or_else(|| self.default_dataset())
            .ok_or(SessionError::NoDataset)?;
        Ok(self.metadata.catalog(dataset)?)
    }

    fn issue(&mut self) -> RequestToken {
        self.issued += 1;
        RequestToken(self.issued)
    }

    /// Whether `token` is the most recently issued one.
    pub fn is_latest(&self, token: RequestToken) -> bool {
        token.0 == self.issued
    }

    /// The datapoint a snapshot is aggregated by: the dataset's fixed
    /// datapoint, else the selected one, else the dataset default.
    fn datapoint_for(&self, snapshot: &PivotSnapshot, catalog: &MetadataCatalog) -> Option<String> {
        catalog
            .dataset()
            .datapoint_col
            .clone()
            .or_else(|| snapshot.datapoint.clone())
            .or_else(|| catalog.default_datapoint().map(str::to_string))
    }

    fn request_for(&self, snapshot: &PivotSnapshot, catalog: &MetadataCatalog) -> PivotRequest {
        PivotRequest {
            datapoint: self.datapoint_for(snapshot, catalog),
            filter: snapshot.filter.clone(),
            load_table: snapshot.load_table.clone(),
            graph_type: snapshot.graph_type.clone(),
            animation: Some(snapshot.animate.clone()),
        }
    }

    // ========================================================================
    // OPEN
    // ========================================================================

    /// Starts the view on `dataset` (or the default dataset). `raw_rows`
    /// replaces the data source when an embedding application supplies data.
    pub fn open(
        &mut self,
        dataset: Option<&str>,
        raw_rows: Option<Vec<Record>>,
    ) -> Result<PendingFetch, SessionError> {
        let dataset = dataset
            .or_else(|| self.default_dataset())
            .ok_or(SessionError::NoDataset)?
            .to_string();
        let graph_type = self
            .current()
            .map(|s| s.graph_type.clone())
            .unwrap_or_default();
        self.load_fetch(dataset, graph_type, raw_rows, false)
    }

    fn load_fetch(
        &mut self,
        dataset: String,
        graph_type: GraphType,
        raw_rows: Option<Vec<Record>>,
        from_marker: bool,
    ) -> Result<PendingFetch, SessionError> {
        let catalog = self
            .metadata
            .catalog(&dataset)
            .map_err(|_| SessionError::UnknownDataset(dataset.clone()))?;
        let request = PivotRequest {
            datapoint: catalog
                .dataset()
                .datapoint_col
                .clone()
                .or_else(|| catalog.default_datapoint().map(str::to_string)),
            filter: catalog.default_filter().clone(),
            load_table: None,
            graph_type,
            animation: None,
        };
        let token = self.issue();
        log_info!("SESSION", "load dataset={} token={}", dataset, token.0);
        Ok(PendingFetch {
            token,
            kind: FetchKind::Load,
            mode: read_mode_for(&dataset, FetchKind::Load),
            dataset,
            request,
            raw_rows,
            from_marker,
        })
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Applies one event. Returns the fetch needed to bring the new current
    /// snapshot up to date, if any.
    pub fn dispatch(&mut self, event: PivotEvent) -> Result<Option<PendingFetch>, SessionError> {
        if let PivotEvent::ChangeDataset(dataset) | PivotEvent::ChangeDatasetAndDatapoint { dataset, .. } = &event {
            if !self.metadata.contains(dataset) {
                return Err(SessionError::UnknownDataset(dataset.clone()));
            }
        }

        let before = self.current().cloned();
        let forces_refresh = matches!(event, PivotEvent::ChangeDatasetAndDatapoint { .. });
        let follows_up = !matches!(event, PivotEvent::Push(_) | PivotEvent::Merge(_));
        let switches_dataset = matches!(event, PivotEvent::ChangeDataset(_));

        match event {
            PivotEvent::Push(snapshot) => self.history.push(snapshot),
            PivotEvent::Merge(patch) => {
                self.history.merge(patch);
            }
            PivotEvent::ChangeControl { name, value } => self.history.change_control(name, value),
            PivotEvent::ChangeControlVector(changes) => self.history.change_control_vector(changes),
            PivotEvent::ChangeFilter(filter) => self.history.change_filter(filter),
            PivotEvent::ChangeDataset(dataset) => self.history.change_dataset(dataset),
            PivotEvent::ChangeDatasetAndDatapoint { dataset, datapoint } => {
                self.history.change_dataset_and_datapoint(dataset, datapoint)
            }
            PivotEvent::PressButton(button) => self.history.press(button),
            PivotEvent::ChangeLoad(load_table) => self.history.change_load(load_table),
        }

        let Some(current) = self.current().cloned() else {
            return Ok(None);
        };
        log_debug!(
            "HISTORY",
            "last={} cursor={} len={}",
            current.last.tag(),
            self.history.cursor(),
            self.history.len()
        );
        if !follows_up {
            return Ok(None);
        }

        if let LastAction::ChangeDataset { to, .. } = &current.last {
            if !switches_dataset {
                return Ok(None);
            }
            let graph_type = before.map(|s| s.graph_type).unwrap_or_default();
            return self.load_fetch(to.clone(), graph_type, None, true).map(Some);
        }

        let Some(dataset) = current.dataset.clone() else {
            return Ok(None);
        };
        let catalog = self.metadata.catalog(&dataset)?;
        let request = self.request_for(&current, &catalog);

        // Leaving a marker, or moving between datasets through the history,
        // lands on a snapshot that already holds its data.
        let same_dataset = before
            .as_ref()
            .is_some_and(|b| !b.is_marker() && b.dataset == current.dataset);
        let stale = match before.as_ref() {
            Some(b) if same_dataset => {
                forces_refresh || request_changed(&self.request_for(b, &catalog), &request)
            }
            _ => forces_refresh,
        };
        if !stale {
            return Ok(None);
        }

        // A snapshot carried over from another dataset needs its categorical
        // values read again.
        let mode = if same_dataset {
            read_mode_for(&dataset, FetchKind::Refresh)
        } else {
            read_mode_for(&dataset, FetchKind::Load)
        };
        let token = self.issue();
        log_info!("SESSION", "refresh dataset={} token={}", dataset, token.0);
        Ok(Some(PendingFetch {
            token,
            kind: FetchKind::Refresh,
            mode,
            dataset,
            request,
            raw_rows: None,
            from_marker: false,
        }))
    }

    // ========================================================================
    // FETCH
    // ========================================================================

    /// Performs the read described by `pending`.
    pub fn execute(&self, pending: &PendingFetch) -> Result<DatasetResult, SessionError> {
        let reader = DatasetReader::new(&self.metadata, &self.transforms, &self.source);
        Ok(reader.read(
            pending.mode,
            &pending.dataset,
            &pending.request,
            pending.raw_rows.clone(),
        )?)
    }

    /// Lands a finished fetch. Returns false (and changes nothing) when a
    /// newer fetch was issued since, or the view moved to other data.
    pub fn complete(&mut self, pending: PendingFetch, result: DatasetResult) -> Result<bool, SessionError> {
        if !self.is_latest(pending.token) {
            log_debug!(
                "SESSION",
                "dropping stale result token={} latest={}",
                pending.token.0,
                self.issued
            );
            return Ok(false);
        }
        let catalog = self.metadata.catalog(&pending.dataset)?;

        match pending.kind {
            FetchKind::Load => {
                let awaited = self.current().is_some_and(|s| {
                    matches!(&s.last, LastAction::ChangeDataset { to, .. } if *to == pending.dataset)
                });
                if pending.from_marker && !awaited {
                    log_debug!("SESSION", "dropping load for abandoned dataset change token={}", pending.token.0);
                    return Ok(false);
                }
                let snapshot = self.loaded_snapshot(&catalog, &pending, result);
                self.history.push(snapshot);
            }
            FetchKind::Refresh => {
                let Some(current) = self.current() else {
                    return Ok(false);
                };
                if current.dataset.as_deref() != Some(pending.dataset.as_str())
                    || request_changed(&pending.request, &self.request_for(current, &catalog))
                {
                    log_debug!("SESSION", "dropping result for superseded view token={}", pending.token.0);
                    return Ok(false);
                }
                let patch = self.refresh_patch(&catalog, &pending, result);
                self.history.merge(patch);
            }
        }
        Ok(true)
    }

    /// Executes and completes `pending`.
    pub fn run(&mut self, pending: PendingFetch) -> Result<bool, SessionError> {
        log_enter!("SESSION", "run", "token={} mode={:?}", pending.token.0, pending.mode);
        let result = self.execute(&pending)?;
        let landed = self.complete(pending, result)?;
        log_exit!("SESSION", "run", "landed={}", landed);
        Ok(landed)
    }

    /// Dispatches `event` and runs the fetch it needs, if any.
    pub fn apply(&mut self, event: PivotEvent) -> Result<(), SessionError> {
        if let Some(pending) = self.dispatch(event)? {
            self.run(pending)?;
        }
        Ok(())
    }

    fn loaded_snapshot(&self, catalog: &MetadataCatalog, pending: &PendingFetch, result: DatasetResult) -> PivotSnapshot {
        let summary = summary_data(&result.processed_data, catalog);
        let comparison = load_comparison_data(&result.pivoted_data, &result.processed_data, catalog);
        let init = ControlResolver::new(
            catalog,
            &pending.request.graph_type,
            &result.categorical_values,
            pending.request.datapoint.as_deref(),
        )
        .init_state();

        let mut snapshot = PivotSnapshot {
            dataset: Some(pending.dataset.clone()),
            filter: pending.request.filter.clone(),
            categorical_values: Arc::new(result.categorical_values),
            pivoted_data: Arc::new(result.pivoted_data),
            processed_data: Arc::new(result.processed_data),
            summary_data: Arc::new(summary),
            load_comparison_data: Arc::new(comparison),
            ..Default::default()
        };
        init.apply(&mut snapshot);
        snapshot
    }

    fn refresh_patch(&self, catalog: &MetadataCatalog, pending: &PendingFetch, result: DatasetResult) -> SnapshotPatch {
        let summary = summary_data(&result.processed_data, catalog);
        let comparison = load_comparison_data(&result.pivoted_data, &result.processed_data, catalog);

        // Incremental reads carry no categorical values; keep the known ones.
        let mut base = match self.current() {
            Some(current) => current.clone(),
            None => PivotSnapshot::default(),
        };
        if !result.categorical_values.is_empty() {
            base.categorical_values = Arc::new(result.categorical_values);
        }
        let axes = ControlResolver::new(
            catalog,
            &base.graph_type,
            &base.categorical_values,
            pending.request.datapoint.as_deref(),
        )
        .resolve_axes(&base);

        SnapshotPatch {
            categorical_values: Some(Arc::clone(&base.categorical_values)),
            pivoted_data: Some(Arc::new(result.pivoted_data)),
            processed_data: Some(Arc::new(result.processed_data)),
            summary_data: Some(Arc::new(summary)),
            load_comparison_data: Some(Arc::new(comparison)),
            ..axes.into_patch()
        }
    }

    // ========================================================================
    // CONTROLS
    // ========================================================================

    /// Every control of the current view, graph type first.
    pub fn control_views(&self) -> Result<Vec<ControlView>, SessionError> {
        let catalog = self.catalog()?;
        let current = self.current().cloned().unwrap_or_default();
        let datapoint = self.datapoint_for(&current, &catalog);
        let resolver = ControlResolver::new(
            &catalog,
            &current.graph_type,
            &current.categorical_values,
            datapoint.as_deref(),
        );
        Ok([
            ControlName::GraphType,
            ControlName::Datapoint,
            ControlName::XAxis,
            ControlName::YAxis,
            ControlName::ColorAxis,
            ControlName::RadiusAxis,
            ControlName::Animate,
        ]
        .into_iter()
        .map(|control| resolver.view(control, &current))
        .collect())
    }

    // ========================================================================
    // NAMED EVENTS
    // ========================================================================

    pub fn push(&mut self, snapshot: PivotSnapshot) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::Push(snapshot))
    }

    pub fn merge(&mut self, patch: SnapshotPatch) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::Merge(patch))
    }

    pub fn change_control(&mut self, name: ControlName, value: impl Into<String>) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::ChangeControl {
            name,
            value: value.into(),
        })
    }

    pub fn change_control_vector(&mut self, changes: Vec<ControlChange>) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::ChangeControlVector(changes))
    }

    pub fn change_filter(&mut self, filter: Filter) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::ChangeFilter(filter))
    }

    pub fn change_dataset(&mut self, dataset: impl Into<String>) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::ChangeDataset(dataset.into()))
    }

    pub fn change_dataset_and_datapoint(
        &mut self,
        dataset: impl Into<String>,
        datapoint: impl Into<String>,
    ) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::ChangeDatasetAndDatapoint {
            dataset: dataset.into(),
            datapoint: datapoint.into(),
        })
    }

    pub fn press_button(&mut self, button: HistoryButton) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::PressButton(button))
    }

    pub fn change_load(&mut self, load_table: Option<LoadTable>) -> Result<Option<PendingFetch>, SessionError> {
        self.dispatch(PivotEvent::ChangeLoad(load_table))
    }
}
