//! Synchronization status tracking.
//!
//! Every node of the mirror tree (target, list, whole show) carries a
//! [`SyncStatus`]: a tri-state value, a sticky dirty bit, and a wallclock
//! timestamp of the last change. Parents fold child statuses in with
//! [`SyncStatus::update_from_child`].

use std::time::SystemTime;

/// Tri-state synchronization value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Running,
    Complete,
}

/// Status of one node in the mirror tree.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    value: SyncState,
    dirty: bool,
    timestamp: SystemTime,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            value: SyncState::Uninitialized,
            dirty: false,
            timestamp: SystemTime::now(),
        }
    }
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> SyncState {
        self.value
    }

    /// Set the state value. A changed value marks the status dirty; the
    /// timestamp is refreshed either way.
    pub fn set_value(&mut self, value: SyncState) {
        if self.value != value {
            self.value = value;
            self.dirty = true;
        }
        self.timestamp = SystemTime::now();
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Fold a child status into this one: an incomplete child demotes a
    /// Complete parent back to Running; a dirty child makes the parent
    /// dirty and advances its timestamp to the later of the two.
    pub fn update_from_child(&mut self, child: &SyncStatus) {
        if self.value == SyncState::Complete && child.value != SyncState::Complete {
            self.set_value(SyncState::Running);
        }

        if child.dirty {
            self.dirty = true;
            if child.timestamp > self.timestamp {
                self.timestamp = child.timestamp;
            }
        }
    }
}
