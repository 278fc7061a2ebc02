//! Append-only snapshot storage.
//!
//! The store publishes its contents through a `watch` channel holding an
//! `Arc<Vec<Snapshot>>`. Appending swaps in a new vector; readers clone
//! the `Arc` and keep an immutable view that never shows a half-written
//! entry, without waiting on whoever is appending.

use crate::error::{LeakError, Result};
use leakwatch_memory::MemoryMeasurement;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// One labeled measurement at an iteration boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    sequence_index: u64,
    label: String,
    measurement: MemoryMeasurement,
}

impl Snapshot {
    /// Position in the store; 0 is the baseline
    #[must_use]
    pub const fn sequence_index(&self) -> u64 {
        self.sequence_index
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub const fn measurement(&self) -> &MemoryMeasurement {
        &self.measurement
    }

    /// Shorthand for the heap-used figure the analyzer works on
    #[must_use]
    pub const fn heap_used_bytes(&self) -> u64 {
        self.measurement.heap_used_bytes
    }
}

/// Ordered, append-only sequence of snapshots
#[derive(Debug)]
pub struct SnapshotStore {
    entries: watch::Sender<Arc<Vec<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (entries, _) = watch::channel(Arc::new(Vec::new()));
        Self { entries }
    }

    /// Append a measurement under the next sequence index.
    pub fn append(&self, label: impl Into<String>, measurement: MemoryMeasurement) -> Snapshot {
        let mut snapshot = Snapshot {
            sequence_index: 0,
            label: label.into(),
            measurement,
        };
        self.entries.send_modify(|entries| {
            snapshot.sequence_index = entries.len() as u64;
            Arc::make_mut(entries).push(snapshot.clone());
        });
        snapshot
    }

    /// Immutable view of every snapshot, in index order.
    pub fn all(&self) -> Arc<Vec<Snapshot>> {
        Arc::clone(&self.entries.borrow())
    }

    /// The snapshot at index 0.
    pub fn baseline(&self) -> Result<Snapshot> {
        self.entries
            .borrow()
            .first()
            .cloned()
            .ok_or(LeakError::NotInitialized)
    }

    pub fn last(&self) -> Option<Snapshot> {
        self.entries.borrow().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver notified after every append, for observers that want to
    /// await new samples instead of polling.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Snapshot>>> {
        self.entries.subscribe()
    }

    /// Drop every snapshot. Only used on explicit re-initialization.
    pub(crate) fn clear(&self) {
        self.entries.send_modify(|entries| *entries = Arc::new(Vec::new()));
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
