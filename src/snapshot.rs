//! Snapshot history for undo.
//!
//! A snapshot is an owned deep copy of everything a step can change. The
//! history is a list plus a cursor: recording truncates anything after the
//! cursor, stepping back moves the cursor one entry left and hands out a
//! fresh copy so the stored entry never aliases live state.

use serde::Serialize;
use std::collections::VecDeque;

use crate::scheduler::EventQueue;
use crate::simulation::Status;
use crate::topology::Topology;

/// Independent copy of the mutable simulation state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub topology: Topology,
    pub queue: EventQueue,
    pub status: Status,
}

/// Ordered snapshots with a cursor at the current position.
#[derive(Clone, Debug, Default)]
pub struct SnapshotHistory {
    entries: VecDeque<Snapshot>,
    cursor: usize,
    limit: Option<usize>,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History that keeps at most `limit` snapshots, oldest dropped first.
    pub fn bounded(limit: usize) -> Self {
        Self {
            limit: Some(limit.max(1)),
            ..Self::default()
        }
    }

    /// Stores the state taken before a step.
    pub fn record(&mut self, snapshot: Snapshot) {
        self.entries.truncate(self.cursor);
        self.entries.push_back(snapshot);
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
            }
        }
        self.cursor = self.entries.len();
    }

    /// Moves one step back, returning the state to restore.
    pub fn back(&mut self) -> Option<Snapshot> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).cloned()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of steps that can still be undone.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}
