//! Seams the view depends on: the record source and the change bus.

use anyhow::Error;
use parking_lot::Mutex;
use rowview_core::{Record, RecordId, ViewId};
use std::collections::BTreeSet;

/// Backing store a view materializes its rows from.
pub trait RecordSource: Send + Sync {
    /// Native entry type accepted by the mutation operations.
    type Entry: Send + Sync;

    /// Error type bubbled up from the backing store.
    type Error: Into<Error>;

    /// Load the top-level rows of the view, children attached.
    ///
    /// # Errors
    /// Returns a store-specific error when the rows cannot be read.
    fn retrieve(&self, view_id: ViewId) -> Result<Vec<Record>, Self::Error>;

    /// Persist new entries.
    ///
    /// # Errors
    /// Returns a store-specific error when persisting fails.
    fn add_records(&self, entries: &[Self::Entry]) -> Result<(), Self::Error>;

    /// Remove entries.
    ///
    /// # Errors
    /// Returns a store-specific error when removal fails.
    fn remove_records(&self, entries: &[Self::Entry]) -> Result<(), Self::Error>;

    /// Resolve row identities to native entries.
    ///
    /// The default implementation resolves nothing.
    ///
    /// # Errors
    /// Returns a store-specific error when the lookup fails.
    fn fetch_entries(&self, ids: &BTreeSet<RecordId>) -> Result<Vec<Self::Entry>, Self::Error> {
        let _ = ids;
        Ok(Vec::new())
    }

    /// Drop any auxiliary caches kept next to the rows.
    fn invalidate_cache(&self) {}
}

/// Receiver of view-level change events.
pub trait ChangeBus: Send + Sync {
    /// Every row of the view may have changed.
    fn collect_fully_changed(&self, view_id: ViewId);
}

/// Bus that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChangeBus;

impl ChangeBus for NoopChangeBus {
    fn collect_fully_changed(&self, _view_id: ViewId) {}
}

/// Event published by a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    /// The view was invalidated as a whole.
    FullyChanged(ViewId),
}

/// In-process bus that records events until drained.
#[derive(Debug, Default)]
pub struct ChangeCollector {
    events: Mutex<Vec<ViewChange>>,
}

impl ChangeCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events recorded since the last drain.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true when nothing was recorded since the last drain.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Take every recorded event.
    pub fn drain(&self) -> Vec<ViewChange> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl ChangeBus for ChangeCollector {
    fn collect_fully_changed(&self, view_id: ViewId) {
        self.events.lock().push(ViewChange::FullyChanged(view_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_records_until_drained() {
        let bus = ChangeCollector::new();
        let view = ViewId::new();
        assert!(bus.is_empty());

        bus.collect_fully_changed(view);
        bus.collect_fully_changed(view);
        assert_eq!(bus.len(), 2);
        assert_eq!(
            bus.drain(),
            vec![ViewChange::FullyChanged(view), ViewChange::FullyChanged(view)]
        );
        assert!(bus.is_empty());
    }
}
