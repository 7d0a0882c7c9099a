//! Error types for JSON store operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during `JsonFileSource` operations.
#[derive(Error, Debug)]
pub enum JsonStoreError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document on disk is not valid.
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying decoder error.
        source: serde_json::Error,
    },

    /// Failed to serialize the document.
    #[error("Failed to serialize document: {0}")]
    Serialize(String),

    /// Failed to acquire the document lock.
    #[error("Document lock error")]
    LockError,
}
