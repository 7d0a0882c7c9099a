//! JSON-file backed record source for rowview.
//!
//! The document layout is
//!
//! ```json
//! { "records": [ { "id": 1, "fields": { "name": "pallet" }, "children": [] } ] }
//! ```

pub mod error;

pub use error::JsonStoreError;

use rowview_app::RecordSource;
use rowview_core::{FieldValue, Record, RecordId, ViewId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// On-disk form of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDoc {
    /// Row identity.
    pub id: RecordId,
    /// Field values by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,
    /// Included rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RecordDoc>,
}

fn record_with_children(doc: &RecordDoc, children: Vec<Record>) -> Record {
    doc.fields
        .iter()
        .fold(Record::builder(doc.id.clone()), |builder, (name, value)| {
            builder.field(name.clone(), value.clone())
        })
        .children(children)
        .build()
}

fn doc_with_children(record: &Record, children: Vec<RecordDoc>) -> RecordDoc {
    RecordDoc {
        id: record.id().clone(),
        fields: record.fields().clone(),
        children,
    }
}

impl From<&RecordDoc> for Record {
    fn from(doc: &RecordDoc) -> Self {
        let children = convert_forest(&doc.children, |node: &RecordDoc| node.children.as_slice(), record_with_children);
        record_with_children(doc, children)
    }
}

impl From<&Record> for RecordDoc {
    fn from(record: &Record) -> Self {
        let children = convert_forest(
            record.children(),
            |record: &Arc<Record>| record.children(),
            |record, children| doc_with_children(record, children),
        );
        doc_with_children(record, children)
    }
}

/// Convert a forest bottom-up over an explicit stack. Children are converted
/// before their parent and keep their order.
fn convert_forest<'a, N, O>(
    roots: &'a [N],
    children_of: impl Fn(&'a N) -> &'a [N],
    convert: impl Fn(&'a N, Vec<O>) -> O,
) -> Vec<O> {
    struct Frame<'a, N, O> {
        node: Option<&'a N>,
        pending: &'a [N],
        built: Vec<O>,
    }

    let mut stack = vec![Frame {
        node: None,
        pending: roots,
        built: Vec::with_capacity(roots.len()),
    }];
    while let Some(frame) = stack.pop() {
        let pending = frame.pending;
        if let Some(next) = pending.get(frame.built.len()) {
            let grandchildren = children_of(next);
            stack.push(frame);
            stack.push(Frame {
                node: Some(next),
                pending: grandchildren,
                built: Vec::with_capacity(grandchildren.len()),
            });
            continue;
        }
        let Some(node) = frame.node else {
            return frame.built;
        };
        let converted = convert(node, frame.built);
        if let Some(parent) = stack.last_mut() {
            parent.built.push(converted);
        }
    }
    Vec::new()
}

/// Whole document stored in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Top-level rows in order.
    #[serde(default)]
    pub records: Vec<RecordDoc>,
}

impl Document {
    fn find<'a>(&'a self, ids: &BTreeSet<RecordId>, out: &mut Vec<&'a RecordDoc>) {
        let mut stack: Vec<&RecordDoc> = self.records.iter().rev().collect();
        while let Some(doc) = stack.pop() {
            if ids.contains(&doc.id) {
                out.push(doc);
            }
            stack.extend(doc.children.iter().rev());
        }
    }
}

/// Record source reading and writing a single JSON document.
///
/// The parsed document is kept in memory until
/// [`invalidate_cache`](RecordSource::invalidate_cache) is called.
pub struct JsonFileSource {
    path: PathBuf,
    document: Mutex<Option<Arc<Document>>>,
}

impl JsonFileSource {
    /// Open the document at `path`. A missing file reads as an empty document
    /// and is created on the first write.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            document: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Arc<Document>>>, JsonStoreError> {
        self.document.lock().map_err(|_| JsonStoreError::LockError)
    }

    fn cached_or_read(
        &self,
        slot: &mut Option<Arc<Document>>,
    ) -> Result<Arc<Document>, JsonStoreError> {
        if let Some(document) = slot.as_ref() {
            return Ok(Arc::clone(document));
        }
        let document = Arc::new(self.read_document()?);
        *slot = Some(Arc::clone(&document));
        Ok(document)
    }

    fn read_document(&self) -> Result<Document, JsonStoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Document missing; starting empty");
            return Ok(Document::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|source| JsonStoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write_document(&self, document: &Document) -> Result<(), JsonStoreError> {
        let body = serde_json::to_string_pretty(document)
            .map_err(|e| JsonStoreError::Serialize(e.to_string()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(body.as_bytes())?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        info!(path = %self.path.display(), records = document.records.len(), "Wrote document");
        Ok(())
    }

    fn update<F>(&self, apply: F) -> Result<(), JsonStoreError>
    where
        F: FnOnce(&mut Document),
    {
        let mut slot = self.lock()?;
        let mut document = (*self.cached_or_read(&mut slot)?).clone();
        apply(&mut document);
        self.write_document(&document)?;
        *slot = Some(Arc::new(document));
        Ok(())
    }
}

impl RecordSource for JsonFileSource {
    type Entry = Record;
    type Error = JsonStoreError;

    fn retrieve(&self, view_id: ViewId) -> Result<Vec<Record>, Self::Error> {
        let mut slot = self.lock()?;
        let document = self.cached_or_read(&mut slot)?;
        drop(slot);
        debug!(%view_id, records = document.records.len(), "Retrieved rows");
        Ok(document.records.iter().map(Record::from).collect())
    }

    fn add_records(&self, entries: &[Record]) -> Result<(), Self::Error> {
        self.update(|document| {
            document.records.extend(entries.iter().map(RecordDoc::from));
        })
    }

    fn remove_records(&self, entries: &[Record]) -> Result<(), Self::Error> {
        let doomed: BTreeSet<&RecordId> = entries.iter().map(Record::id).collect();
        self.update(|document| {
            let before = document.records.len();
            document.records.retain(|doc| !doomed.contains(&doc.id));
            let removed = before - document.records.len();
            if removed < doomed.len() {
                debug!(
                    requested = doomed.len(),
                    removed,
                    "Some records to remove were not top-level rows"
                );
            }
        })
    }

    fn fetch_entries(&self, ids: &BTreeSet<RecordId>) -> Result<Vec<Record>, Self::Error> {
        let mut slot = self.lock()?;
        let document = self.cached_or_read(&mut slot)?;
        drop(slot);
        let mut found = Vec::new();
        document.find(ids, &mut found);
        Ok(found.into_iter().map(Record::from).collect())
    }

    fn invalidate_cache(&self) {
        // A panic elsewhere must not pin a stale document.
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
