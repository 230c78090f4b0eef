use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use pdfdesk_core::{BitmapHandle, ViewerShell};
use tracing::debug;

/// Terminal-side record of everything the session has told us. Notifications may arrive from
/// worker threads; the draw loop reads a consistent view and redraws when `take_redraw` says so.
#[derive(Default)]
pub struct TerminalShell {
    inner: Mutex<ShellState>,
}

#[derive(Default)]
struct ShellState {
    pages: HashMap<usize, BitmapHandle>,
    failures: HashMap<usize, String>,
    dirty: bool,
    path: Option<PathBuf>,
    current_page: usize,
    total: usize,
    needs_redraw: bool,
}

impl TerminalShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether anything visible changed since the last call and resets the flag.
    pub fn take_redraw(&self) -> bool {
        std::mem::take(&mut self.inner.lock().needs_redraw)
    }

    pub fn request_redraw(&self) {
        self.inner.lock().needs_redraw = true;
    }

    pub fn bitmap(&self, page_index: usize) -> Option<BitmapHandle> {
        self.inner.lock().pages.get(&page_index).cloned()
    }

    pub fn failure(&self, page_index: usize) -> Option<String> {
        self.inner.lock().failures.get(&page_index).cloned()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    pub fn current_page(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.current_page, inner.total)
    }

    /// File name with a trailing `*` while there are unsaved edits.
    pub fn document_name(&self) -> String {
        let inner = self.inner.lock();
        let base = inner
            .path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        if inner.dirty {
            format!("{base}*")
        } else {
            base
        }
    }

    /// Drops bitmaps for pages the session no longer keeps around.
    pub fn retain_pages(&self, required: &BTreeSet<usize>) {
        let mut inner = self.inner.lock();
        inner.pages.retain(|page, _| required.contains(page));
        inner.failures.retain(|page, _| required.contains(page));
    }
}

impl ViewerShell for TerminalShell {
    fn state_changed(&self, dirty: bool, path: Option<&Path>) {
        let mut inner = self.inner.lock();
        inner.dirty = dirty;
        inner.path = path.map(Path::to_path_buf);
        inner.needs_redraw = true;
    }

    fn page_ready(&self, page_index: usize, bitmap: &BitmapHandle) {
        let mut inner = self.inner.lock();
        inner.failures.remove(&page_index);
        inner.pages.insert(page_index, BitmapHandle::clone(bitmap));
        inner.needs_redraw = true;
    }

    fn page_failed(&self, page_index: usize, reason: &str) {
        debug!(page = page_index, reason, "showing failed page placeholder");
        let mut inner = self.inner.lock();
        inner.pages.remove(&page_index);
        inner.failures.insert(page_index, reason.to_string());
        inner.needs_redraw = true;
    }

    fn current_page_changed(&self, page_index: usize, total: usize) {
        let mut inner = self.inner.lock();
        inner.current_page = page_index;
        inner.total = total;
        inner.needs_redraw = true;
    }

    fn objects_changed(&self, _page_index: usize) {
        self.inner.lock().needs_redraw = true;
    }
}
