//! Per-document view state: where the reader was, restored on the next open.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::{DocumentInfo, Rotation};
use crate::viewport::ViewMode;

/// Documents remembered by one store; the least recently saved ones are forgotten first.
pub const MAX_REMEMBERED_DOCUMENTS: usize = 256;

const INDEX_FILE: &str = "views.json";

/// Where the user left a document, restored the next time it is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedViewState {
    pub current_page: usize,
    pub zoom: f32,
    pub rotation: Rotation,
    pub view_mode: ViewMode,
}

impl Default for PersistedViewState {
    fn default() -> Self {
        Self {
            current_page: 0,
            zoom: 1.0,
            rotation: Rotation::None,
            view_mode: ViewMode::Continuous,
        }
    }
}

pub trait ViewStateStore: Send + Sync {
    /// View state saved for this document, or `None` when it was never saved or the file
    /// behind the path has changed shape since.
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedViewState>>;
    fn save(&self, doc: &DocumentInfo, state: &PersistedViewState) -> Result<()>;
}

/// One remembered document. The page count guards against a different file having taken
/// the path since the state was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ViewRecord {
    path: PathBuf,
    page_count: usize,
    /// Save order, used to pick what to forget.
    sequence: u64,
    view: PersistedViewState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct ViewIndex {
    next_sequence: u64,
    /// Keyed by the document id rendered as text.
    documents: BTreeMap<String, ViewRecord>,
}

impl ViewIndex {
    fn lookup(&self, doc: &DocumentInfo) -> Option<PersistedViewState> {
        let record = self.documents.get(&doc.id.to_string())?;
        if record.page_count != doc.page_count {
            return None;
        }
        let mut view = record.view.clone();
        view.current_page = view.current_page.min(doc.page_count.saturating_sub(1));
        Some(view)
    }

    fn record(&mut self, doc: &DocumentInfo, view: &PersistedViewState) {
        self.next_sequence += 1;
        self.documents.insert(
            doc.id.to_string(),
            ViewRecord {
                path: doc.path.clone(),
                page_count: doc.page_count,
                sequence: self.next_sequence,
                view: view.clone(),
            },
        );
        while self.documents.len() > MAX_REMEMBERED_DOCUMENTS {
            let oldest = self
                .documents
                .iter()
                .min_by_key(|(_, record)| record.sequence)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    self.documents.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// Keeps every document's view state in a single `views.json` under `root`. The index is
/// read once and rewritten through a temp file on every save.
pub struct FileViewStateStore {
    index_path: PathBuf,
    index: Mutex<Option<ViewIndex>>,
}

impl FileViewStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create view state directory at {:?}", root))?;
        Ok(Self {
            index_path: root.join(INDEX_FILE),
            index: Mutex::new(None),
        })
    }

    fn read_index(&self) -> Result<ViewIndex> {
        match fs::read_to_string(&self.index_path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("failed to decode view state {:?}", self.index_path)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ViewIndex::default()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read view state {:?}", self.index_path)),
        }
    }

    fn with_index<R>(&self, f: impl FnOnce(&mut ViewIndex) -> R) -> Result<R> {
        let mut guard = self.index.lock();
        let index = match guard.take() {
            Some(index) => index,
            None => self.read_index()?,
        };
        Ok(f(guard.insert(index)))
    }

    fn write_index(&self, index: &ViewIndex) -> Result<()> {
        let tmp = self.index_path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(index)?;
        fs::write(&tmp, payload)
            .with_context(|| format!("failed to write temp view state {:?}", tmp))?;
        fs::rename(&tmp, &self.index_path).with_context(|| {
            format!("failed to move view state into place at {:?}", self.index_path)
        })
    }
}

impl ViewStateStore for FileViewStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedViewState>> {
        self.with_index(|index| index.lookup(doc))
    }

    fn save(&self, doc: &DocumentInfo, state: &PersistedViewState) -> Result<()> {
        let snapshot = self.with_index(|index| {
            index.record(doc, state);
            index.clone()
        })?;
        self.write_index(&snapshot)
    }
}

/// Same bookkeeping as the file store without touching disk.
#[derive(Default)]
pub struct MemoryViewStateStore {
    index: Mutex<ViewIndex>,
}

impl MemoryViewStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViewStateStore for MemoryViewStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedViewState>> {
        Ok(self.index.lock().lookup(doc))
    }

    fn save(&self, doc: &DocumentInfo, state: &PersistedViewState) -> Result<()> {
        self.index.lock().record(doc, state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use tempfile::tempdir;

    use crate::backend::{document_id_for_path, DocumentMetadata};

    fn doc(path: &Path, page_count: usize) -> DocumentInfo {
        DocumentInfo {
            id: document_id_for_path(path),
            path: path.to_path_buf(),
            page_count,
            page_sizes: Vec::new(),
            metadata: DocumentMetadata::default(),
        }
    }

    fn view(current_page: usize) -> PersistedViewState {
        PersistedViewState {
            current_page,
            zoom: 1.5,
            rotation: Rotation::Half,
            view_mode: ViewMode::TwoPage,
        }
    }

    #[test]
    fn file_store_survives_a_new_instance() {
        let dir = tempdir().unwrap();
        let pdf = dir.path().join("sample.pdf");
        fs::write(&pdf, b"dummy").unwrap();
        let root = dir.path().join("state");

        let store = FileViewStateStore::new(root.clone()).unwrap();
        assert_eq!(store.load(&doc(&pdf, 3)).unwrap(), None);
        store.save(&doc(&pdf, 3), &view(2)).unwrap();

        let reopened = FileViewStateStore::new(root.clone()).unwrap();
        assert_eq!(reopened.load(&doc(&pdf, 3)).unwrap(), Some(view(2)));
        assert!(root.join(INDEX_FILE).exists());
        assert!(!root.join("views.json.tmp").exists());
    }

    #[test]
    fn changed_page_count_means_a_different_document() {
        let store = MemoryViewStateStore::new();
        let path = Path::new("/tmp/report.pdf");
        store.save(&doc(path, 10), &view(7)).unwrap();

        assert_eq!(store.load(&doc(path, 4)).unwrap(), None);
        assert_eq!(store.load(&doc(path, 10)).unwrap(), Some(view(7)));
        assert_eq!(store.load(&doc(Path::new("/tmp/other.pdf"), 10)).unwrap(), None);
    }

    #[test]
    fn restored_page_is_clamped_to_the_document() {
        let mut index = ViewIndex::default();
        let path = Path::new("/tmp/short.pdf");
        index.record(&doc(path, 3), &view(9));
        assert_eq!(index.lookup(&doc(path, 3)).map(|v| v.current_page), Some(2));
    }

    #[test]
    fn least_recently_saved_documents_are_forgotten() {
        let store = MemoryViewStateStore::new();
        let first = doc(Path::new("/tmp/first.pdf"), 1);
        store.save(&first, &view(0)).unwrap();
        for n in 0..MAX_REMEMBERED_DOCUMENTS {
            store
                .save(&doc(Path::new(&format!("/tmp/doc-{n}.pdf")), 1), &view(0))
                .unwrap();
        }
        assert_eq!(store.load(&first).unwrap(), None);
        assert_eq!(store.index.lock().documents.len(), MAX_REMEMBERED_DOCUMENTS);
    }

    #[test]
    fn corrupt_index_reports_context() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), "{not json").unwrap();
        let store = FileViewStateStore::new(dir.path().to_path_buf()).unwrap();
        let err = store.load(&doc(&dir.path().join("x.pdf"), 1)).unwrap_err();
        assert!(format!("{err:#}").contains("failed to decode view state"));
    }
}
