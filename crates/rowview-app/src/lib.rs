//! Application layer for rowview.
//!
//! This crate wires a [`RecordSource`] to a lazily materialized, single-flight
//! cached [`ViewSelection`], with paging, lookups, mutations, change
//! notifications, barcode selection and configuration.

pub mod async_selection;
pub mod cache;
/// Project configuration loaded from `.rowview/config.toml`.
pub mod config;
pub mod error;
pub mod order;
pub mod selection;
pub mod source;

// Re-exports for convenience
pub use async_selection::AsyncViewSelection;
pub use cache::{Abandoned, MaterializationCache};
pub use config::{ProjectConfig, ViewConfig};
pub use error::{ConfigError, Result, SourceError, ViewError};
pub use order::{Comparator, Direction, OrderSpec, ParseOrderError};
pub use selection::{SelectRowsAction, ViewPage, ViewSelection, ViewSelectionBuilder};
pub use source::{ChangeBus, ChangeCollector, NoopChangeBus, RecordSource, ViewChange};
