//! FILENAME: dashboard/src/history.rs
//! PURPOSE: Undo/redo log of pivot snapshots.
//! CONTEXT: A bounded, linear history with a cursor. Every user event pushes
//! a new snapshot derived from the current one (discarding any redo tail);
//! data arriving for the current view is merged into the current slot.
//! Dataset-switch markers are never landed on by Undo/Redo.

use crate::snapshot::{ControlChange, ControlName, LastAction, PivotSnapshot, SnapshotPatch};
use engine::Filter;
use pivot_engine::LoadTable;
use std::collections::VecDeque;

/// Maximum number of snapshots kept in history.
pub const MAX_HISTORY_SIZE: usize = 5;

/// The Undo/Redo buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryButton {
    Undo,
    Redo,
}

#[derive(Debug, Clone)]
pub struct PivotHistory {
    snapshots: VecDeque<PivotSnapshot>,
    current: usize,
    max_size: usize,
}

impl Default for PivotHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PivotHistory {
    pub fn new() -> Self {
        Self::with_max_size(MAX_HISTORY_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        PivotHistory {
            snapshots: VecDeque::with_capacity(max_size.max(1)),
            current: 0,
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Index of the current snapshot.
    pub fn cursor(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&PivotSnapshot> {
        self.snapshots.get(self.current)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &PivotSnapshot> {
        self.snapshots.iter()
    }

    pub fn can_undo(&self) -> bool {
        self.snapshots.iter().take(self.current).any(|s| !s.is_marker())
    }

    pub fn can_redo(&self) -> bool {
        self.snapshots.iter().skip(self.current + 1).any(|s| !s.is_marker())
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// Appends a complete new state (initial load, dataset load finished).
    pub fn push(&mut self, mut snapshot: PivotSnapshot) {
        snapshot.last = LastAction::Init;
        self.append(snapshot);
    }

    /// Replaces the current snapshot with `patch` merged onto it.
    /// Returns false when the history is empty.
    pub fn merge(&mut self, patch: SnapshotPatch) -> bool {
        match self.snapshots.get_mut(self.current) {
            Some(slot) => {
                *slot = patch.apply_to(slot);
                true
            }
            None => false,
        }
    }

    /// Records a request to switch datasets. The marker carries no data; the
    /// caller loads the dataset and pushes the real state.
    pub fn change_dataset(&mut self, dataset: impl Into<String>) {
        let from = self.current().and_then(|s| s.dataset.clone());
        self.append(PivotSnapshot::dataset_marker(from, dataset));
    }

    pub fn change_dataset_and_datapoint(&mut self, dataset: impl Into<String>, datapoint: impl Into<String>) {
        let mut next = self.derive(LastAction::DatasetAndDatapoint);
        next.dataset = Some(dataset.into());
        next.datapoint = Some(datapoint.into());
        self.append_with_animation_rule(next);
    }

    pub fn change_control(&mut self, name: ControlName, value: impl Into<String>) {
        let mut next = self.derive(LastAction::Control { name });
        next.set_control(name, value);
        self.append_with_animation_rule(next);
    }

    /// Several controls changed by one user action (e.g. a date datapoint
    /// also moving the X axis).
    pub fn change_control_vector(&mut self, changes: Vec<ControlChange>) {
        let mut next = self.derive(LastAction::ControlVector);
        for change in changes {
            next.set_control(change.name, change.value);
        }
        self.append_with_animation_rule(next);
    }

    pub fn change_filter(&mut self, filter: Filter) {
        let mut next = self.derive(LastAction::Filter);
        next.filter = filter;
        self.append_with_animation_rule(next);
    }

    /// Replaces the load table as a whole.
    pub fn change_load(&mut self, load_table: Option<LoadTable>) {
        let mut next = self.derive(LastAction::ChangeLoad);
        next.load_table = load_table;
        self.append_with_animation_rule(next);
    }

    pub fn press(&mut self, button: HistoryButton) {
        match button {
            HistoryButton::Undo => self.undo(),
            HistoryButton::Redo => self.redo(),
        }
    }

    pub fn undo(&mut self) {
        if self.snapshots.is_empty() {
            return;
        }
        let mut prev = self.current.saturating_sub(1);
        if self.snapshots[prev].is_marker() {
            // An evicted front can leave a marker at index 0.
            if prev == 0 {
                return;
            }
            prev -= 1;
        }
        self.current = prev;
    }

    pub fn redo(&mut self) {
        if self.snapshots.is_empty() {
            return;
        }
        let last = self.snapshots.len() - 1;
        let mut next = (self.current + 1).min(last);
        if self.snapshots[next].is_marker() {
            if next == last {
                return;
            }
            next += 1;
        }
        self.current = next;
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn derive(&self, last: LastAction) -> PivotSnapshot {
        let mut next = self.current().cloned().unwrap_or_default();
        next.last = last;
        next
    }

    fn append_with_animation_rule(&mut self, mut snapshot: PivotSnapshot) {
        snapshot.enforce_animation_rule();
        self.append(snapshot);
    }

    fn append(&mut self, snapshot: PivotSnapshot) {
        if !self.snapshots.is_empty() {
            self.snapshots.truncate(self.current + 1);
        }
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.max_size {
            self.snapshots.pop_front();
        }
        self.current = self.snapshots.len() - 1;
    }
}
