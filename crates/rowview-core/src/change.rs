use crate::id::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reference to a row of a backing table touched outside the view.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Table (or record kind) the row belongs to.
    pub table: String,
    /// Row identity within that table.
    pub record_id: RecordId,
}

impl RecordRef {
    /// Build a reference.
    pub fn new(table: impl Into<String>, record_id: impl Into<RecordId>) -> Self {
        Self {
            table: table.into(),
            record_id: record_id.into(),
        }
    }
}

/// Set of rows reported as mutated by an external notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    refs: BTreeSet<RecordRef>,
}

impl ChangeSet {
    /// Empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference.
    pub fn insert(&mut self, record_ref: RecordRef) -> bool {
        self.refs.insert(record_ref)
    }

    /// Number of references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Returns true when nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// All references, ordered by table then id.
    pub fn iter(&self) -> impl Iterator<Item = &RecordRef> {
        self.refs.iter()
    }

    /// Identities of the rows belonging to `table`.
    pub fn ids_for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a RecordId> {
        self.refs
            .iter()
            .filter(move |record_ref| record_ref.table == table)
            .map(|record_ref| &record_ref.record_id)
    }
}

impl FromIterator<RecordRef> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = RecordRef>>(iter: I) -> Self {
        Self {
            refs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_filtered_by_table() {
        let changes: ChangeSet = [
            RecordRef::new("M_HU", 1),
            RecordRef::new("C_Order", 2),
            RecordRef::new("M_HU", 3),
        ]
        .into_iter()
        .collect();

        let ids: Vec<&RecordId> = changes.ids_for_table("M_HU").collect();
        assert_eq!(ids, vec![&RecordId::from(1), &RecordId::from(3)]);
        assert_eq!(changes.ids_for_table("M_Product").count(), 0);
    }

    #[test]
    fn duplicate_refs_collapse() {
        let mut changes = ChangeSet::new();
        assert!(changes.insert(RecordRef::new("M_HU", 1)));
        assert!(!changes.insert(RecordRef::new("M_HU", "1")));
        assert_eq!(changes.len(), 1);
    }
}
