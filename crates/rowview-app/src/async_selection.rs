//! Async facade over [`ViewSelection`] for tokio callers.

use rowview_core::{ChangeSet, Record, RecordId, ViewId};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{Result, ViewError};
use crate::order::OrderSpec;
use crate::selection::{SelectRowsAction, ViewPage, ViewSelection};
use crate::source::RecordSource;

/// Runs the blocking view operations on tokio's blocking pool.
///
/// Loads may call into slow sources and block on the single-flight cell, so
/// they never run on the async workers.
pub struct AsyncViewSelection<S: RecordSource> {
    inner: Arc<ViewSelection<S>>,
}

impl<S: RecordSource> Clone for AsyncViewSelection<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> AsyncViewSelection<S>
where
    S: RecordSource + 'static,
    S::Entry: 'static,
{
    /// Wrap a view.
    pub const fn new(inner: Arc<ViewSelection<S>>) -> Self {
        Self { inner }
    }

    /// Identifier of the wrapped view.
    pub fn view_id(&self) -> ViewId {
        self.inner.view_id()
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ViewSelection<S>) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(inner.as_ref()))
            .await
            .map_err(|e| ViewError::Join(e.to_string()))?
    }

    /// See [`ViewSelection::size`].
    ///
    /// # Errors
    /// Returns load errors or [`ViewError::Join`].
    pub async fn size(&self) -> Result<usize> {
        self.run(ViewSelection::size).await
    }

    /// See [`ViewSelection::get_page`].
    ///
    /// # Errors
    /// Returns configuration or load errors, or [`ViewError::Join`].
    pub async fn get_page(
        &self,
        first_row: usize,
        page_length: usize,
        orders: Vec<OrderSpec>,
    ) -> Result<ViewPage> {
        self.run(move |view| view.get_page(first_row, page_length, &orders))
            .await
    }

    /// See [`ViewSelection::get_by_id`].
    ///
    /// # Errors
    /// Returns [`ViewError::RecordNotFound`], load errors or [`ViewError::Join`].
    pub async fn get_by_id(&self, id: RecordId) -> Result<Arc<Record>> {
        self.run(move |view| view.get_by_id(&id)).await
    }

    /// See [`ViewSelection::get_by_ids`].
    ///
    /// # Errors
    /// Returns load errors or [`ViewError::Join`].
    pub async fn get_by_ids(&self, ids: Vec<RecordId>) -> Result<Vec<Arc<Record>>> {
        self.run(move |view| view.get_by_ids(&ids)).await
    }

    /// Every row in pre-order.
    ///
    /// # Errors
    /// Returns load errors or [`ViewError::Join`].
    pub async fn all_recursive(&self) -> Result<Vec<Arc<Record>>> {
        self.run(|view| Ok(view.stream_all_recursive()?.collect()))
            .await
    }

    /// See [`ViewSelection::add_records`].
    ///
    /// # Errors
    /// Returns the source error or [`ViewError::Join`].
    pub async fn add_records(&self, entries: Vec<S::Entry>) -> Result<()> {
        self.run(move |view| view.add_records(&entries)).await
    }

    /// See [`ViewSelection::remove_records`].
    ///
    /// # Errors
    /// Returns the source error or [`ViewError::Join`].
    pub async fn remove_records(&self, entries: Vec<S::Entry>) -> Result<()> {
        self.run(move |view| view.remove_records(&entries)).await
    }

    /// See [`ViewSelection::select_by_barcode`].
    ///
    /// # Errors
    /// Returns [`ViewError::NothingMatched`], load errors or [`ViewError::Join`].
    pub async fn select_by_barcode(
        &self,
        barcode: String,
        selected: BTreeSet<RecordId>,
    ) -> Result<SelectRowsAction> {
        self.run(move |view| view.select_by_barcode(&barcode, &selected))
            .await
    }

    /// See [`ViewSelection::invalidate_all`]. Never waits for a load.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// See [`ViewSelection::notify_records_changed`]. Never waits for a load.
    pub fn notify_records_changed(&self, changes: &ChangeSet) -> bool {
        self.inner.notify_records_changed(changes)
    }
}
