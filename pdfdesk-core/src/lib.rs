pub mod backend;
pub mod cache;
pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod objects;
pub mod session;
pub mod state;
pub mod undo;
pub mod viewport;
pub mod viewstore;

#[cfg(test)]
mod testing;

pub use backend::{
    document_id_for_path, Bitmap, BitmapHandle, DocumentHandle, DocumentId, DocumentInfo,
    DocumentMetadata, PageSize, PdfBackend, RenderRequest, Rotation,
};
pub use cache::{CacheKey, CacheStats, PageRenderCache};
pub use collection::{CollectionSnapshot, ObjectCollection, ZDirection};
pub use config::EditorConfig;
pub use error::{CommitError, ModelError, OpenError, RenderError, SessionError, SessionResult};
pub use events::{EventHub, EventLog, SubscriptionId, ViewerEvent, ViewerShell};
pub use executor::{Clock, InlineExecutor, ManualClock, ManualExecutor, RenderExecutor, SystemClock, ThreadPoolExecutor};
pub use objects::{
    Color, EditableObject, ImagePayload, ImageSource, ObjectDraft, ObjectId, ObjectPayload,
    Point, Property, Rect, ShapeKind, ShapePayload, TextPayload, TextStyle,
};
pub use session::{Intent, PdfDocumentSession, PendingCommit, SessionServices};
pub use state::{DocumentStateManager, HistoryMark};
pub use undo::{EditCommand, UndoManager};
pub use viewport::{PagePlacement, ViewMode, ViewportController};
pub use viewstore::{FileViewStateStore, MemoryViewStateStore, PersistedViewState, ViewStateStore};
