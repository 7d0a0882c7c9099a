//! Error types for snapshot indexing.

use crate::id::RecordId;
use thiserror::Error;

/// Errors raised while indexing a record tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The same identity occurs twice in the tree and duplicates are rejected.
    #[error("duplicate record id in view tree: {0}")]
    DuplicateIdentity(RecordId),
}
