//! In-crate fakes shared by the unit tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::backend::{
    Bitmap, DocumentHandle, DocumentMetadata, PageSize, PdfBackend, RenderRequest,
};
use crate::collection::CollectionSnapshot;
use crate::error::{CommitError, OpenError, RenderError};

pub(crate) struct FakeBackend {
    pages: Vec<PageSize>,
    failing: HashSet<usize>,
    pub renders: Mutex<Vec<RenderRequest>>,
    pub commits: Mutex<Vec<(CollectionSnapshot, PathBuf)>>,
    pub fail_commits: AtomicBool,
    pub closed: AtomicBool,
}

impl FakeBackend {
    pub fn with_pages(pages: Vec<PageSize>) -> Self {
        Self {
            pages,
            failing: HashSet::new(),
            renders: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            fail_commits: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// `count` letter-sized pages.
    pub fn letter(count: usize) -> Self {
        Self::with_pages(vec![PageSize::new(612.0, 792.0); count])
    }

    pub fn failing_on(mut self, page_index: usize) -> Self {
        self.failing.insert(page_index);
        self
    }

    pub fn render_count(&self) -> usize {
        self.renders.lock().len()
    }
}

impl PdfBackend for FakeBackend {
    fn open(&self, path: &Path) -> Result<DocumentHandle, OpenError> {
        if path.to_string_lossy().contains("missing") {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }
        Ok(DocumentHandle(1))
    }

    fn page_count(&self, _handle: DocumentHandle) -> usize {
        self.pages.len()
    }

    fn page_size(&self, _handle: DocumentHandle, page_index: usize) -> Result<PageSize, RenderError> {
        self.pages
            .get(page_index)
            .copied()
            .ok_or(RenderError::PageOutOfRange(page_index))
    }

    fn render_page(&self, handle: DocumentHandle, request: RenderRequest) -> Result<Bitmap, RenderError> {
        self.renders.lock().push(request);
        let size = self
            .page_size(handle, request.page_index)?
            .rotated(request.rotation);
        if self.failing.contains(&request.page_index) {
            return Err(RenderError::Decode {
                page: request.page_index,
                reason: "broken content stream".into(),
            });
        }
        let width = ((size.width * request.zoom).round() as u32).max(1);
        let height = ((size.height * request.zoom).round() as u32).max(1);
        Ok(Bitmap {
            width,
            height,
            pixels: vec![0xff; (width * height * 4) as usize],
        })
    }

    fn commit_objects(
        &self,
        _handle: DocumentHandle,
        snapshot: &CollectionSnapshot,
        target: &Path,
    ) -> Result<(), CommitError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(CommitError::PermissionDenied(target.to_path_buf()));
        }
        self.commits
            .lock()
            .push((snapshot.clone(), target.to_path_buf()));
        Ok(())
    }

    fn metadata(&self, _handle: DocumentHandle) -> DocumentMetadata {
        DocumentMetadata {
            title: Some("Fixture".into()),
            ..DocumentMetadata::default()
        }
    }

    fn close(&self, _handle: DocumentHandle) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
