use std::path::PathBuf;

use thiserror::Error;

use crate::objects::ObjectId;

/// Rejected edits. These are caller bugs: the operation leaves all state untouched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("object {0} does not exist")]
    ObjectNotFound(ObjectId),

    #[error("object {0} already exists")]
    DuplicateObject(ObjectId),

    #[error("invalid geometry: {width}x{height} must have a positive width and height")]
    InvalidGeometry { width: f32, height: f32 },

    #[error("property `{property}` does not apply to a {kind} object")]
    PropertyMismatch {
        property: &'static str,
        kind: &'static str,
    },

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpenError {
    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    #[error("document is corrupt: {0}")]
    Corrupt(String),

    #[error("document is encrypted")]
    Encrypted,

    #[error("unsupported PDF version: {0}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("page {0} out of range")]
    PageOutOfRange(usize),

    #[error("failed to decode page {page}: {reason}")]
    Decode { page: usize, reason: String },

    #[error("backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    #[error("document has no file path; use save-as")]
    Untitled,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("background task failed: {0}")]
    Worker(String),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
