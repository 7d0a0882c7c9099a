//! Error types for view operations.

use rowview_core::{IndexError, RecordId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Errors surfaced by [`ViewSelection`](crate::ViewSelection) and friends.
#[derive(Error, Debug, Clone)]
pub enum ViewError {
    /// No row with this identity exists at any depth of the view.
    #[error("No document found for documentId={0}")]
    RecordNotFound(RecordId),

    /// A selection matched no row.
    #[error("Nothing found for '{0}'")]
    NothingMatched(String),

    /// The view or a request against it is misconfigured.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The record source failed; the original error is kept as the source.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The loaded tree could not be indexed.
    #[error("Failed to index view: {0}")]
    Index(#[from] IndexError),

    /// The load this call was waiting on ended without a result.
    #[error("View load was abandoned before completing")]
    LoadAbandoned,

    /// A blocking task could not be joined.
    #[error("Task join error: {0}")]
    Join(String),
}

impl ViewError {
    /// Returns true for lookup misses and empty selections.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound(_) | Self::NothingMatched(_))
    }
}

impl From<crate::cache::Abandoned> for ViewError {
    fn from(_: crate::cache::Abandoned) -> Self {
        Self::LoadAbandoned
    }
}

/// Configuration errors, detected before any row is read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The builder was not given a record source.
    #[error("Parameter source is not set")]
    MissingSource,

    /// The view has no table name.
    #[error("table_name must not be blank")]
    BlankTableName,

    /// Sort requested on a field the view does not expose.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// A field name was declared twice.
    #[error("duplicate field `{0}` in {1}")]
    DuplicateField(String, &'static str),

    /// Page length must be at least one row.
    #[error("page length must be greater than zero")]
    InvalidPageLength,
}

/// Record source failure shared by every caller of one load.
#[derive(Clone)]
pub struct SourceError(Arc<anyhow::Error>);

impl SourceError {
    /// Wrap a source error.
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }
}

impl fmt::Debug for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
