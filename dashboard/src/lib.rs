//! FILENAME: dashboard/src/lib.rs
//! PURPOSE: Session layer of the pivot dashboard.
//! CONTEXT: Ties the metadata, the data sources and the pivot pipeline to
//! the undo/redo history and the chart controls. A front end drives a
//! `PivotSession` with events and renders the current snapshot.

pub mod logging;

pub mod config;
pub mod controls;
pub mod history;
pub mod session;
pub mod snapshot;

pub use config::{ConfigError, DashboardConfig, DEFAULT_HISTORY_CAPACITY};
pub use controls::{
    is_enabled, Choice, ControlOption, ControlResolver, ControlState, ControlView, ResolvedAxes,
};
pub use history::{HistoryButton, PivotHistory, MAX_HISTORY_SIZE};
pub use logging::{init_logging, DashboardLogger};
pub use session::{
    read_mode_for, FetchKind, PendingFetch, PivotEvent, PivotSession, RequestToken, SessionError,
};
pub use snapshot::{ControlChange, ControlName, LastAction, PivotSnapshot, SnapshotPatch};
