//! Lazily materialized hierarchical view over a [`RecordSource`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rowview_core::{
    BarcodeMatcher, ByIds, ChangeSet, PreOrder, Record, RecordId, RecordRef, ViewId, ViewSnapshot,
};
use tracing::{debug, info};

use crate::cache::MaterializationCache;
use crate::config::ViewConfig;
use crate::error::{ConfigError, Result, SourceError, ViewError};
use crate::order::{self, Comparator, OrderSpec};
use crate::source::{ChangeBus, NoopChangeBus, RecordSource};

/// One page of top-level rows together with the request that produced it.
#[derive(Debug, Clone)]
pub struct ViewPage {
    /// View the rows belong to.
    pub view_id: ViewId,
    /// Offset of the first row.
    pub first_row: usize,
    /// Requested page length.
    pub page_length: usize,
    /// Ordering applied within the page.
    pub orders: Vec<OrderSpec>,
    /// The rows, already ordered.
    pub rows: Vec<Arc<Record>>,
}

/// Instruction to select rows in a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectRowsAction {
    /// View the rows belong to.
    pub view_id: ViewId,
    /// Rows to select.
    pub row_ids: BTreeSet<RecordId>,
}

/// Hierarchical row view, materialized on first access and shared by every
/// reader until invalidated.
pub struct ViewSelection<S: RecordSource> {
    view_id: ViewId,
    parent_view_id: Option<ViewId>,
    config: ViewConfig,
    source: Arc<S>,
    bus: Arc<dyn ChangeBus>,
    cache: MaterializationCache<ViewSnapshot, ViewError>,
    referencing_document_paths: BTreeSet<RecordRef>,
}

impl<S: RecordSource + 'static> ViewSelection<S> {
    /// Start configuring a view.
    pub fn builder() -> ViewSelectionBuilder<S> {
        ViewSelectionBuilder::default()
    }

    /// Identifier of this view.
    pub const fn view_id(&self) -> ViewId {
        self.view_id
    }

    /// Identifier of the view this one was opened from, if any.
    pub const fn parent_view_id(&self) -> Option<ViewId> {
        self.parent_view_id
    }

    /// Table whose change notifications concern this view.
    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    /// Documents this view was opened from, e.g. the rows a picking view
    /// was launched for. Empty unless set on the builder.
    pub const fn referencing_document_paths(&self) -> &BTreeSet<RecordRef> {
        &self.referencing_document_paths
    }

    /// Row limit applied on load, `None` when unlimited.
    pub const fn query_limit(&self) -> Option<usize> {
        self.config.query_limit()
    }

    /// Returns true when the cached snapshot was cut short by the row limit.
    ///
    /// Never loads; an unmaterialized view reports false.
    pub fn is_query_limit_hit(&self) -> bool {
        self.cache.peek().is_some_and(|snapshot| snapshot.is_truncated())
    }

    /// Returns true while a materialized snapshot is cached.
    pub fn is_loaded(&self) -> bool {
        self.cache.peek().is_some()
    }

    /// Number of invalidations so far.
    pub fn generation(&self) -> u64 {
        self.cache.generation()
    }

    /// Current snapshot, loading it if necessary.
    ///
    /// # Errors
    /// Returns the source or indexing error of a failed load.
    pub fn snapshot(&self) -> Result<Arc<ViewSnapshot>> {
        self.cache.get()
    }

    /// Number of top-level rows.
    ///
    /// # Errors
    /// Returns the source or indexing error of a failed load.
    pub fn size(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    /// Rows `[first_row, first_row + page_length)` of the top level, then
    /// ordered by `orders`.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for a zero page length or a field outside the
    /// sortable set before anything is loaded, load errors, and
    /// [`ConfigError::UnknownField`] for a key no row carries when no sortable
    /// set is configured.
    pub fn get_page(
        &self,
        first_row: usize,
        page_length: usize,
        orders: &[OrderSpec],
    ) -> Result<ViewPage> {
        if page_length == 0 {
            return Err(ConfigError::InvalidPageLength.into());
        }
        let comparator = Comparator::compile(orders, &self.config.sortable_fields)?;
        let snapshot = self.snapshot()?;
        comparator.check_fields(&snapshot)?;
        let rows = order::page(&snapshot, first_row, page_length, &comparator);
        debug!(view_id = %self.view_id, first_row, page_length, rows = rows.len(), "Served page");
        Ok(ViewPage {
            view_id: self.view_id,
            first_row,
            page_length,
            orders: orders.to_vec(),
            rows,
        })
    }

    /// Row with the given identity, at any depth.
    ///
    /// # Errors
    /// Returns [`ViewError::RecordNotFound`] when no row has this identity.
    pub fn get_by_id(&self, id: &RecordId) -> Result<Arc<Record>> {
        self.snapshot()?
            .get(id)
            .cloned()
            .ok_or_else(|| ViewError::RecordNotFound(id.clone()))
    }

    /// Rows for the known identities among `ids`; unknown ones are omitted.
    ///
    /// # Errors
    /// Returns the source or indexing error of a failed load.
    pub fn get_by_ids<'a>(&self, ids: impl IntoIterator<Item = &'a RecordId>) -> Result<Vec<Arc<Record>>> {
        Ok(self.stream_by_ids(ids.into_iter().cloned())?.collect())
    }

    /// Lazy iterator over the rows for `ids`, skipping unknown and repeated ids.
    ///
    /// # Errors
    /// Returns the source or indexing error of a failed load.
    pub fn stream_by_ids(&self, ids: impl IntoIterator<Item = RecordId>) -> Result<ByIds> {
        Ok(ByIds::new(self.snapshot()?, ids))
    }

    /// Lazy pre-order iterator over every row of the view.
    ///
    /// # Errors
    /// Returns the source or indexing error of a failed load.
    pub fn stream_all_recursive(&self) -> Result<PreOrder> {
        Ok(PreOrder::new(self.snapshot()?))
    }

    /// Drop the snapshot and the source's auxiliary caches, then announce
    /// that every row may have changed.
    pub fn invalidate_all(&self) {
        self.forget("invalidate_all");
        self.bus.collect_fully_changed(self.view_id);
    }

    /// Drop the snapshot without announcing a change.
    pub fn close(&self) {
        self.forget("close");
    }

    fn forget(&self, reason: &'static str) {
        self.cache.invalidate();
        self.source.invalidate_cache();
        info!(view_id = %self.view_id, reason, "Invalidated view");
    }

    /// Persist `entries` through the source and refresh the view.
    ///
    /// # Errors
    /// Returns the source error; the view is left untouched in that case.
    pub fn add_records(&self, entries: &[S::Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.source.add_records(entries).map_err(SourceError::new)?;
        info!(view_id = %self.view_id, count = entries.len(), "Added records");
        self.invalidate_all();
        Ok(())
    }

    /// Single-entry form of [`add_records`](Self::add_records); `None` does nothing.
    ///
    /// # Errors
    /// Returns the source error.
    pub fn add_record(&self, entry: Option<S::Entry>) -> Result<()> {
        entry.map_or(Ok(()), |entry| self.add_records(std::slice::from_ref(&entry)))
    }

    /// Remove `entries` through the source and refresh the view.
    ///
    /// # Errors
    /// Returns the source error; the view is left untouched in that case.
    pub fn remove_records(&self, entries: &[S::Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.source.remove_records(entries).map_err(SourceError::new)?;
        info!(view_id = %self.view_id, count = entries.len(), "Removed records");
        self.invalidate_all();
        Ok(())
    }

    /// Single-entry form of [`remove_records`](Self::remove_records); `None` does nothing.
    ///
    /// # Errors
    /// Returns the source error.
    pub fn remove_record(&self, entry: Option<S::Entry>) -> Result<()> {
        entry.map_or(Ok(()), |entry| self.remove_records(std::slice::from_ref(&entry)))
    }

    /// React to rows changed elsewhere. Returns true when the view was invalidated.
    ///
    /// Never loads: an unmaterialized view has nothing to go stale.
    pub fn notify_records_changed(&self, changes: &ChangeSet) -> bool {
        let Some(snapshot) = self.cache.peek() else {
            debug!(view_id = %self.view_id, "Ignoring change notification for unloaded view");
            return false;
        };
        let affected = changes
            .ids_for_table(&self.config.table_name)
            .any(|id| snapshot.contains(id));
        if !affected {
            debug!(
                view_id = %self.view_id,
                changes = changes.len(),
                "Change notification does not touch this view"
            );
            return false;
        }
        self.invalidate_all();
        true
    }

    /// Identities of every row matching `predicate`, united with `selected`.
    ///
    /// # Errors
    /// Returns [`ViewError::NothingMatched`] when no row matches.
    pub fn select_by_match<P>(&self, predicate: P, selected: &BTreeSet<RecordId>) -> Result<BTreeSet<RecordId>>
    where
        P: Fn(&Record) -> bool,
    {
        self.collect_matches(predicate, selected)?
            .ok_or_else(|| ViewError::NothingMatched(format!("view {}", self.view_id)))
    }

    /// Select every row whose barcode fields contain `barcode`, case-insensitively.
    ///
    /// # Errors
    /// Returns [`ViewError::NothingMatched`] for a blank barcode or when no row matches.
    pub fn select_by_barcode(&self, barcode: &str, selected: &BTreeSet<RecordId>) -> Result<SelectRowsAction> {
        let nothing = || ViewError::NothingMatched(barcode.to_owned());
        let matcher = BarcodeMatcher::new(barcode, &self.config.barcode_fields).ok_or_else(nothing)?;
        let row_ids = self
            .collect_matches(|row| matcher.matches(row), selected)?
            .ok_or_else(nothing)?;
        Ok(SelectRowsAction {
            view_id: self.view_id,
            row_ids,
        })
    }

    fn collect_matches<P>(&self, predicate: P, selected: &BTreeSet<RecordId>) -> Result<Option<BTreeSet<RecordId>>>
    where
        P: Fn(&Record) -> bool,
    {
        let matched: BTreeSet<RecordId> = self
            .stream_all_recursive()?
            .filter(|row| predicate(row.as_ref()))
            .map(|row| row.id().clone())
            .collect();
        if matched.is_empty() {
            return Ok(None);
        }
        Ok(Some(matched.into_iter().chain(selected.iter().cloned()).collect()))
    }

    /// Native entries for the rows of `ids` present in this view.
    ///
    /// # Errors
    /// Returns load errors or the source error of the lookup.
    pub fn retrieve_entries_by_ids(&self, ids: &BTreeSet<RecordId>) -> Result<Vec<S::Entry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot()?;
        let present: BTreeSet<RecordId> = ids.iter().filter(|id| snapshot.contains(id)).cloned().collect();
        if present.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.source.fetch_entries(&present).map_err(SourceError::new)?)
    }
}

impl<S: RecordSource> fmt::Debug for ViewSelection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSelection")
            .field("view_id", &self.view_id)
            .field("parent_view_id", &self.parent_view_id)
            .field("table_name", &self.config.table_name)
            .field("referencing_document_paths", &self.referencing_document_paths)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ViewSelection`].
pub struct ViewSelectionBuilder<S> {
    view_id: Option<ViewId>,
    parent_view_id: Option<ViewId>,
    source: Option<Arc<S>>,
    bus: Option<Arc<dyn ChangeBus>>,
    config: ViewConfig,
    referencing_document_paths: BTreeSet<RecordRef>,
}

impl<S> Default for ViewSelectionBuilder<S> {
    fn default() -> Self {
        Self {
            view_id: None,
            parent_view_id: None,
            source: None,
            bus: None,
            config: ViewConfig::default(),
            referencing_document_paths: BTreeSet::new(),
        }
    }
}

impl<S: RecordSource + 'static> ViewSelectionBuilder<S> {
    /// Use a fixed view id instead of a fresh one.
    #[must_use]
    pub const fn view_id(mut self, view_id: ViewId) -> Self {
        self.view_id = Some(view_id);
        self
    }

    /// Record the view this one was opened from.
    #[must_use]
    pub const fn parent_view_id(mut self, parent: Option<ViewId>) -> Self {
        self.parent_view_id = parent;
        self
    }

    /// Source the rows are loaded from. Mandatory.
    #[must_use]
    pub fn source(mut self, source: Arc<S>) -> Self {
        self.source = Some(source);
        self
    }

    /// Bus receiving change events; defaults to [`NoopChangeBus`].
    #[must_use]
    pub fn change_bus(mut self, bus: Arc<dyn ChangeBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// View settings; defaults to [`ViewConfig::default`].
    #[must_use]
    pub fn config(mut self, config: ViewConfig) -> Self {
        self.config = config;
        self
    }

    /// Documents the view was opened from.
    #[must_use]
    pub fn referencing_document_paths(mut self, paths: impl IntoIterator<Item = RecordRef>) -> Self {
        self.referencing_document_paths = paths.into_iter().collect();
        self
    }

    /// Validate the parameters and create the view. Nothing is loaded yet.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingSource`] without a source, or the first
    /// configuration rule that fails.
    pub fn build(self) -> std::result::Result<ViewSelection<S>, ConfigError> {
        let source = self.source.ok_or(ConfigError::MissingSource)?;
        self.config.validate()?;

        let view_id = self.view_id.unwrap_or_else(ViewId::new);
        let cache = MaterializationCache::new(loader(Arc::clone(&source), view_id, &self.config));

        Ok(ViewSelection {
            view_id,
            parent_view_id: self.parent_view_id,
            config: self.config,
            source,
            bus: self.bus.unwrap_or_else(|| Arc::new(NoopChangeBus)),
            cache,
            referencing_document_paths: self.referencing_document_paths,
        })
    }
}

fn loader<S: RecordSource + 'static>(
    source: Arc<S>,
    view_id: ViewId,
    config: &ViewConfig,
) -> impl Fn() -> Result<ViewSnapshot> + Send + Sync + 'static {
    let policy = config.duplicate_ids;
    let limit = config.query_limit();
    move || {
        let started = Instant::now();
        let mut rows = source.retrieve(view_id).map_err(SourceError::new)?;
        let truncated = limit.is_some_and(|limit| rows.len() > limit);
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        let snapshot = ViewSnapshot::build_with_policy(rows.into_iter().map(Arc::new).collect(), policy)?
            .with_truncated(truncated);
        info!(
            view_id = %view_id,
            loaded_at = %snapshot.loaded_at(),
            top_level = snapshot.len(),
            indexed = snapshot.indexed_len(),
            truncated,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Loaded view"
        );
        Ok(snapshot)
    }
}
