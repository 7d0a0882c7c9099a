//! Materialized, identity-indexed view of a record tree.

use crate::error::IndexError;
use crate::id::RecordId;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::warn;

/// What the indexer does when an identity occurs more than once in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The node visited last (in pre-order) owns the index entry.
    #[default]
    LastWins,
    /// Indexing fails with [`IndexError::DuplicateIdentity`].
    Reject,
}

/// Immutable result of loading and indexing a record tree.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    top_level: Vec<Arc<Record>>,
    by_id: HashMap<RecordId, Arc<Record>>,
    loaded_at: OffsetDateTime,
    truncated: bool,
}

impl ViewSnapshot {
    /// Index `top_level` with the default [`DuplicatePolicy::LastWins`].
    #[must_use]
    pub fn build(top_level: Vec<Arc<Record>>) -> Self {
        let by_id = index_tree(&top_level, |id| {
            warn!(record_id = %id, "Duplicate record id in view tree; keeping the later row");
        });
        Self::from_parts(top_level, by_id)
    }

    /// Index `top_level`, resolving duplicate identities with `policy`.
    ///
    /// # Errors
    /// Returns [`IndexError::DuplicateIdentity`] for the first duplicate found
    /// when `policy` is [`DuplicatePolicy::Reject`].
    pub fn build_with_policy(
        top_level: Vec<Arc<Record>>,
        policy: DuplicatePolicy,
    ) -> Result<Self, IndexError> {
        match policy {
            DuplicatePolicy::LastWins => Ok(Self::build(top_level)),
            DuplicatePolicy::Reject => {
                let mut duplicate = None;
                let by_id = index_tree(&top_level, |id| {
                    duplicate.get_or_insert_with(|| id.clone());
                });
                match duplicate {
                    Some(id) => Err(IndexError::DuplicateIdentity(id)),
                    None => Ok(Self::from_parts(top_level, by_id)),
                }
            }
        }
    }

    fn from_parts(top_level: Vec<Arc<Record>>, by_id: HashMap<RecordId, Arc<Record>>) -> Self {
        Self {
            top_level,
            by_id,
            loaded_at: OffsetDateTime::now_utc(),
            truncated: false,
        }
    }

    /// Mark whether the top level was cut short by a row limit.
    #[must_use]
    pub const fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Returns true when the source had more top-level rows than were kept.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Top-level rows in source order.
    #[must_use]
    pub fn top_level(&self) -> &[Arc<Record>] {
        &self.top_level
    }

    /// Number of top-level rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.top_level.len()
    }

    /// Returns true when the view has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top_level.is_empty()
    }

    /// Number of indexed rows at every depth.
    #[must_use]
    pub fn indexed_len(&self) -> usize {
        self.by_id.len()
    }

    /// Look up a row at any depth.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&Arc<Record>> {
        self.by_id.get(id)
    }

    /// Returns true when a row with `id` exists at any depth.
    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Every indexed identity, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.by_id.keys()
    }

    /// Time the snapshot was built (UTC).
    #[must_use]
    pub const fn loaded_at(&self) -> OffsetDateTime {
        self.loaded_at
    }
}

// Pre-order walk over an explicit stack; later duplicates overwrite earlier ones.
fn index_tree(
    top_level: &[Arc<Record>],
    mut on_duplicate: impl FnMut(&RecordId),
) -> HashMap<RecordId, Arc<Record>> {
    let mut by_id = HashMap::new();
    let mut stack: Vec<&Arc<Record>> = top_level.iter().rev().collect();
    while let Some(record) = stack.pop() {
        if by_id.insert(record.id().clone(), Arc::clone(record)).is_some() {
            on_duplicate(record.id());
        }
        stack.extend(record.children().iter().rev());
    }
    by_id
}

/// Owning pre-order iterator over a snapshot: each top-level row followed by
/// its included rows, depth first, children in source order.
#[derive(Debug, Clone)]
pub struct PreOrder {
    stack: Vec<Arc<Record>>,
    // Keeps the tree alive for as long as the iterator lives.
    _snapshot: Arc<ViewSnapshot>,
}

impl PreOrder {
    /// Start a fresh traversal.
    #[must_use]
    pub fn new(snapshot: Arc<ViewSnapshot>) -> Self {
        let stack = snapshot.top_level.iter().rev().cloned().collect();
        Self {
            stack,
            _snapshot: snapshot,
        }
    }
}

impl Iterator for PreOrder {
    type Item = Arc<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.stack.pop()?;
        self.stack.extend(record.children().iter().rev().cloned());
        Some(record)
    }
}

/// Owning iterator resolving identities against a snapshot.
///
/// Unknown identities are skipped and repeated identities are yielded once, in
/// the order they were first requested.
#[derive(Debug)]
pub struct ByIds {
    snapshot: Arc<ViewSnapshot>,
    ids: std::vec::IntoIter<RecordId>,
    seen: HashSet<RecordId>,
}

impl ByIds {
    /// Resolve `ids` against `snapshot` lazily.
    pub fn new(snapshot: Arc<ViewSnapshot>, ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            snapshot,
            ids: ids.into_iter().collect::<Vec<_>>().into_iter(),
            seen: HashSet::new(),
        }
    }
}

impl Iterator for ByIds {
    type Item = Arc<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        for id in self.ids.by_ref() {
            if !self.seen.insert(id.clone()) {
                continue;
            }
            if let Some(record) = self.snapshot.get(&id) {
                return Some(Arc::clone(record));
            }
        }
        None
    }
}
