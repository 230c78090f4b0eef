use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::events::{EventHub, ViewerEvent};

/// Identifies a position in the edit history. The document is clean exactly when the
/// current position equals the one recorded at the last successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HistoryMark(pub(crate) u64);

impl HistoryMark {
    pub const ORIGIN: HistoryMark = HistoryMark(0);
}

#[derive(Debug)]
struct Inner {
    path: Option<PathBuf>,
    version: u64,
    head: HistoryMark,
    clean: Option<HistoryMark>,
    next_detached: u64,
}

impl Inner {
    fn dirty(&self) -> bool {
        self.clean != Some(self.head)
    }
}

/// Dirty flag, file binding and mutation counter of one open document.
///
/// All methods take `&self` and serialize on one lock so a save completing on a worker
/// thread can mark the document clean while the interactive thread keeps editing.
pub struct DocumentStateManager {
    inner: Mutex<Inner>,
    events: EventHub,
}

impl DocumentStateManager {
    pub fn new(path: Option<PathBuf>, events: EventHub) -> Self {
        Self {
            inner: Mutex::new(Inner {
                path,
                version: 0,
                head: HistoryMark::ORIGIN,
                clean: Some(HistoryMark::ORIGIN),
                // Detached marks count down from the top so they never meet undo marks.
                next_detached: u64::MAX,
            }),
            events,
        }
    }

    /// Marks the document as modified by something outside the undo history.
    pub fn mark_dirty(&self) {
        let mut inner = self.inner.lock();
        let mark = HistoryMark(inner.next_detached);
        inner.next_detached -= 1;
        self.transition(inner, |inner| {
            inner.head = mark;
            inner.version += 1;
        });
    }

    /// Records that an edit (forward, undo or redo) moved the history to `head`.
    pub fn record_edit(&self, head: HistoryMark) {
        let inner = self.inner.lock();
        self.transition(inner, |inner| {
            inner.head = head;
            inner.version += 1;
        });
    }

    /// Binds `path` and declares the current contents saved.
    pub fn mark_clean(&self, path: PathBuf) {
        let inner = self.inner.lock();
        self.transition(inner, |inner| {
            inner.clean = Some(inner.head);
            inner.path = Some(path);
        });
    }

    /// Like [`Self::mark_clean`] for a save that captured the document at `saved`; edits made
    /// while the save was running keep the document dirty.
    pub fn mark_clean_at(&self, saved: HistoryMark, path: PathBuf) {
        let inner = self.inner.lock();
        self.transition(inner, |inner| {
            inner.clean = Some(saved);
            inner.path = Some(path);
        });
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    pub fn head(&self) -> HistoryMark {
        self.inner.lock().head
    }

    pub fn display_name(&self) -> String {
        let inner = self.inner.lock();
        let name = inner
            .path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .unwrap_or("Untitled")
            .to_string();
        if inner.dirty() {
            format!("{name}*")
        } else {
            name
        }
    }

    fn transition<F>(&self, mut inner: parking_lot::MutexGuard<'_, Inner>, update: F)
    where
        F: FnOnce(&mut Inner),
    {
        update(&mut *inner);
        let dirty = inner.dirty();
        let path = inner.path.clone();
        let version = inner.version;
        drop(inner);
        debug!(dirty, version, "document state changed");
        self.events.publish(ViewerEvent::StateChanged { dirty, path });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::events::EventLog;

    fn manager() -> (Arc<DocumentStateManager>, Arc<EventLog>) {
        let hub = EventHub::new();
        let log = Arc::new(EventLog::new());
        hub.subscribe(log.clone());
        let manager = DocumentStateManager::new(Some(PathBuf::from("/tmp/a.pdf")), hub);
        (Arc::new(manager), log)
    }

    #[test]
    fn mark_dirty_bumps_version_and_notifies() {
        let (state, log) = manager();
        assert!(!state.is_dirty());
        state.mark_dirty();
        state.mark_dirty();
        assert!(state.is_dirty());
        assert_eq!(state.version(), 2);
        let events = log.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ViewerEvent::StateChanged { dirty: true, .. }));
    }

    #[test]
    fn returning_to_the_saved_mark_is_clean() {
        let (state, _) = manager();
        state.record_edit(HistoryMark(1));
        assert!(state.is_dirty());
        state.record_edit(HistoryMark::ORIGIN);
        assert!(!state.is_dirty());
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn mark_clean_binds_path() {
        let (state, log) = manager();
        state.record_edit(HistoryMark(5));
        state.mark_clean(PathBuf::from("/tmp/b.pdf"));
        assert!(!state.is_dirty());
        assert_eq!(state.path(), Some(PathBuf::from("/tmp/b.pdf")));
        assert_eq!(state.display_name(), "b.pdf");
        match log.drain().pop() {
            Some(ViewerEvent::StateChanged { dirty, path }) => {
                assert!(!dirty);
                assert_eq!(path, Some(PathBuf::from("/tmp/b.pdf")));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn clean_at_older_mark_keeps_later_edits_dirty() {
        let (state, _) = manager();
        state.record_edit(HistoryMark(1));
        state.record_edit(HistoryMark(2));
        state.mark_clean_at(HistoryMark(1), PathBuf::from("/tmp/a.pdf"));
        assert!(state.is_dirty());
        assert_eq!(state.display_name(), "a.pdf*");
    }

    #[test]
    fn background_threads_can_mark_clean() {
        let (state, _) = manager();
        state.record_edit(HistoryMark(3));
        let worker = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || state.mark_clean(PathBuf::from("/tmp/a.pdf")))
        };
        worker.join().unwrap();
        assert!(!state.is_dirty());
    }

    #[test]
    fn untitled_documents_have_no_path() {
        let state = DocumentStateManager::new(None, EventHub::new());
        assert_eq!(state.path(), None);
        assert_eq!(state.display_name(), "Untitled");
    }
}
