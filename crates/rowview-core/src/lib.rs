//! Domain types for hierarchical row views: records, identities, indexed
//! snapshots and change notifications.

/// External change notifications.
pub mod change;
/// Indexing errors.
pub mod error;
/// Identifier types.
pub mod id;
/// Barcode matching over row fields.
pub mod matcher;
/// Row tree nodes and field values.
pub mod record;
/// Indexed snapshots and their iterators.
pub mod snapshot;

pub use change::{ChangeSet, RecordRef};
pub use error::IndexError;
pub use id::{RecordId, ViewId};
pub use matcher::BarcodeMatcher;
pub use record::{FieldAccess, FieldValue, Record, RecordBuilder};
pub use snapshot::{ByIds, DuplicatePolicy, PreOrder, ViewSnapshot};
