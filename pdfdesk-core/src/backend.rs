use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::CollectionSnapshot;
use crate::error::{CommitError, OpenError, RenderError};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0d7a2e-5c41-5b8e-9d27-6a1e4c9b0f53").unwrap_or_else(|_| Uuid::nil())
});

/// Stable id for a document path, used to key persisted view state across runs.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

/// Opaque token the backend hands out for one open document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Vec<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
}

/// Unrotated page extent in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn rotated(self, rotation: Rotation) -> Self {
        if rotation.swaps_axes() {
            Self {
                width: self.height,
                height: self.width,
            }
        } else {
            self
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    pub page_sizes: Vec<PageSize>,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    None,
    Quarter,
    Half,
    ThreeQuarters,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarters => 270,
        }
    }

    /// Normalizes any multiple of 90 degrees; other angles snap down to the previous quarter.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) / 90 {
            1 => Rotation::Quarter,
            2 => Rotation::Half,
            3 => Rotation::ThreeQuarters,
            _ => Rotation::None,
        }
    }

    pub fn clockwise(self) -> Self {
        Self::from_degrees(i32::from(self.degrees()) + 90)
    }

    pub fn counter_clockwise(self) -> Self {
        Self::from_degrees(i32::from(self.degrees()) - 90)
    }

    pub fn combine(self, other: Rotation) -> Self {
        Self::from_degrees(i32::from(self.degrees()) + i32::from(other.degrees()))
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Quarter | Rotation::ThreeQuarters)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub zoom: f32,
    pub rotation: Rotation,
}

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

pub type BitmapHandle = Arc<Bitmap>;

/// The PDF engine the core drives. Implementations must tolerate calls from worker threads.
pub trait PdfBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<DocumentHandle, OpenError>;

    fn page_count(&self, handle: DocumentHandle) -> usize;

    fn page_size(&self, handle: DocumentHandle, page_index: usize) -> Result<PageSize, RenderError>;

    fn render_page(&self, handle: DocumentHandle, request: RenderRequest) -> Result<Bitmap, RenderError>;

    /// Writes `snapshot` into the document and persists it at `target`.
    fn commit_objects(
        &self,
        handle: DocumentHandle,
        snapshot: &CollectionSnapshot,
        target: &Path,
    ) -> Result<(), CommitError>;

    fn metadata(&self, _handle: DocumentHandle) -> DocumentMetadata {
        DocumentMetadata::default()
    }

    fn close(&self, _handle: DocumentHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn document_id_is_stable_for_same_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sample.pdf");
        std::fs::write(&file_path, b"dummy").unwrap();

        let first = document_id_for_path(&file_path);
        let second = document_id_for_path(&file_path);

        assert_eq!(first, second);
        assert_ne!(first, document_id_for_path(&dir.path().join("other.pdf")));
    }

    #[test]
    fn rotation_wraps_in_both_directions() {
        assert_eq!(Rotation::ThreeQuarters.clockwise(), Rotation::None);
        assert_eq!(Rotation::None.counter_clockwise(), Rotation::ThreeQuarters);
        assert_eq!(Rotation::Quarter.combine(Rotation::Half), Rotation::ThreeQuarters);
        assert_eq!(Rotation::from_degrees(-90), Rotation::ThreeQuarters);
    }

    #[test]
    fn quarter_turns_swap_page_axes() {
        let size = PageSize::new(612.0, 792.0);
        assert_eq!(size.rotated(Rotation::Quarter), PageSize::new(792.0, 612.0));
        assert_eq!(size.rotated(Rotation::Half), size);
    }
}
