//! One open document: object model, history, viewport and page cache behind one facade.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::backend::{
    document_id_for_path, DocumentHandle, DocumentInfo, PageSize, PdfBackend, Rotation,
};
use crate::cache::{CacheKey, CacheStats, CompletionOutcome, Fetch, PageRenderCache, RenderCompletion};
use crate::collection::{ObjectCollection, ZDirection};
use crate::config::EditorConfig;
use crate::error::{CommitError, ModelError, OpenError, SessionError, SessionResult};
use crate::events::{EventHub, SubscriptionId, ViewerEvent, ViewerShell};
use crate::executor::{Clock, RenderExecutor};
use crate::objects::{EditableObject, ObjectDraft, ObjectId, Point, Property, Rect, TextPayload};
use crate::state::DocumentStateManager;
use crate::undo::{EditCommand, EditEffects, UndoManager};
use crate::viewport::{PageChange, ViewMode, ViewportController};
use crate::viewstore::{PersistedViewState, ViewStateStore};

/// Collaborators a session needs besides its configuration.
#[derive(Clone)]
pub struct SessionServices {
    pub backend: Arc<dyn PdfBackend>,
    pub executor: Arc<dyn RenderExecutor>,
    pub clock: Arc<dyn Clock>,
    pub store: Option<Arc<dyn ViewStateStore>>,
}

/// User intents the shell forwards without caring how they are carried out.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    ScrollBy { delta: f32 },
    NextPage { count: usize },
    PrevPage { count: usize },
    GoToPage { page: usize },
    FirstPage,
    LastPage,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    FitWidth,
    FitPage,
    RotateClockwise,
    RotateCounterClockwise,
    CycleViewMode,
    Resize { width: f32, height: f32 },
    AddNote,
    DeleteSelection,
    SelectNext,
    Reorder(ZDirection),
    /// Moves the selection; consecutive nudges form one undo entry.
    Nudge { dx: f32, dy: f32 },
    Undo,
    Redo,
}

const NUDGE_GESTURE: &str = "Nudge";
const NOTE_WIDTH: f32 = 160.0;
const NOTE_HEIGHT: f32 = 24.0;

/// A save running on a blocking worker.
pub struct PendingCommit {
    target: PathBuf,
    task: JoinHandle<Result<(), CommitError>>,
}

impl PendingCommit {
    pub fn target(&self) -> &PathBuf {
        &self.target
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> SessionResult<()> {
        let result = self
            .task
            .await
            .map_err(|err| SessionError::Worker(err.to_string()))?;
        match result {
            Ok(()) => {
                info!(path = ?self.target, "document saved");
                Ok(())
            }
            Err(err) => {
                warn!(path = ?self.target, %err, "save failed");
                Err(err.into())
            }
        }
    }
}

pub struct PdfDocumentSession {
    info: DocumentInfo,
    backend: Arc<dyn PdfBackend>,
    handle: DocumentHandle,
    events: EventHub,
    state: Arc<DocumentStateManager>,
    objects: ObjectCollection,
    undo: UndoManager,
    viewport: ViewportController,
    cache: PageRenderCache,
    completions: UnboundedReceiver<RenderCompletion>,
    /// Cache key whose result the shell currently shows, per required page.
    delivered: HashMap<usize, CacheKey>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn ViewStateStore>>,
}

impl PdfDocumentSession {
    /// Opens `path` and binds the session to it.
    #[instrument(skip(services, config))]
    pub async fn open(
        services: SessionServices,
        path: PathBuf,
        config: &EditorConfig,
    ) -> SessionResult<Self> {
        Self::open_inner(services, path, config, true).await
    }

    /// Opens `path` as the starting content of a new, untitled document.
    #[instrument(skip(services, config))]
    pub async fn open_template(
        services: SessionServices,
        path: PathBuf,
        config: &EditorConfig,
    ) -> SessionResult<Self> {
        Self::open_inner(services, path, config, false).await
    }

    async fn open_inner(
        services: SessionServices,
        path: PathBuf,
        config: &EditorConfig,
        bind_path: bool,
    ) -> SessionResult<Self> {
        let backend = Arc::clone(&services.backend);
        let task_path = path.clone();
        let (handle, page_sizes, metadata) = tokio::task::spawn_blocking(move || {
            let handle = backend.open(&task_path)?;
            let page_count = backend.page_count(handle);
            let page_sizes = (0..page_count)
                .map(|index| backend.page_size(handle, index))
                .collect::<Result<Vec<PageSize>, _>>()
                .map_err(|err| {
                    backend.close(handle);
                    OpenError::Corrupt(err.to_string())
                })?;
            let metadata = backend.metadata(handle);
            Ok::<_, OpenError>((handle, page_sizes, metadata))
        })
        .await
        .map_err(|err| SessionError::Worker(err.to_string()))??;

        let info = DocumentInfo {
            id: document_id_for_path(&path),
            path: path.clone(),
            page_count: page_sizes.len(),
            page_sizes: page_sizes.clone(),
            metadata,
        };
        info!(pages = info.page_count, id = %info.id, "document opened");

        let events = EventHub::new();
        let state = Arc::new(DocumentStateManager::new(
            bind_path.then(|| path.clone()),
            events.clone(),
        ));
        let (cache, completions) = PageRenderCache::new(
            Arc::clone(&services.backend),
            handle,
            Arc::clone(&services.executor),
            config.cache_budget_bytes,
            config.zoom_bucket_percent,
        );
        let mut viewport = ViewportController::new(page_sizes, config.viewport_settings());
        viewport.set_view_mode(config.view_mode);

        let mut session = Self {
            info,
            backend: services.backend,
            handle,
            events,
            state,
            objects: ObjectCollection::new(),
            undo: UndoManager::with_depth(config.undo_depth),
            viewport,
            cache,
            completions,
            delivered: HashMap::new(),
            clock: services.clock,
            store: services.store,
        };
        if bind_path {
            session.restore_view_state();
        }
        session.sync_required();
        Ok(session)
    }

    fn restore_view_state(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        match store.load(&self.info) {
            Ok(Some(saved)) => {
                debug!(?saved, "restoring view state");
                self.viewport.set_view_mode(saved.view_mode);
                self.viewport.set_rotation(saved.rotation);
                self.viewport.set_zoom(saved.zoom);
                self.viewport.go_to_page(saved.current_page);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to load view state"),
        }
    }

    /// Registers a shell and tells it where the document stands right away.
    pub fn subscribe(&self, shell: Arc<dyn ViewerShell>) -> SubscriptionId {
        let id = self.events.subscribe(Arc::clone(&shell));
        ViewerEvent::StateChanged {
            dirty: self.state.is_dirty(),
            path: self.state.path(),
        }
        .dispatch(shell.as_ref());
        ViewerEvent::CurrentPageChanged {
            page_index: self.viewport.current_page(),
            total: self.info.page_count,
        }
        .dispatch(shell.as_ref());
        for (page_index, key) in &self.delivered {
            match self.cache.get_or_fetch(*key) {
                Fetch::Ready(bitmap) => shell.page_ready(*page_index, &bitmap),
                Fetch::Failed(reason) => shell.page_failed(*page_index, &reason),
                Fetch::Pending => {}
            }
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    pub fn objects(&self) -> &ObjectCollection {
        &self.objects
    }

    pub fn state(&self) -> &DocumentStateManager {
        &self.state
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn resident_bytes(&self) -> usize {
        self.cache.resident_bytes()
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn apply(&mut self, intent: Intent) -> SessionResult<()> {
        if !matches!(intent, Intent::Nudge { .. }) {
            self.end_gesture();
        }
        match intent {
            Intent::ScrollBy { delta } => self.scroll_by(delta),
            Intent::NextPage { count } => self.next_page(count),
            Intent::PrevPage { count } => self.prev_page(count),
            Intent::GoToPage { page } => self.go_to_page(page),
            Intent::FirstPage => self.first_page(),
            Intent::LastPage => self.last_page(),
            Intent::ZoomIn => self.zoom_in(),
            Intent::ZoomOut => self.zoom_out(),
            Intent::ResetZoom => self.reset_zoom(),
            Intent::FitWidth => self.fit_width(),
            Intent::FitPage => self.fit_page(),
            Intent::RotateClockwise => self.rotate_clockwise(),
            Intent::RotateCounterClockwise => self.rotate_counter_clockwise(),
            Intent::CycleViewMode => self.set_view_mode(self.viewport.view_mode().next()),
            Intent::Resize { width, height } => self.resize(width, height),
            Intent::AddNote => {
                self.add_note(self.viewport.current_page())?;
            }
            Intent::DeleteSelection => self.edit_selection("Delete Selection", EditCommand::remove)?,
            Intent::SelectNext => {
                self.select_next(self.viewport.current_page())?;
            }
            Intent::Reorder(direction) => self.edit_selection("Reorder Selection", |id| {
                EditCommand::reorder(id, direction)
            })?,
            Intent::Nudge { dx, dy } => self.nudge(dx, dy)?,
            Intent::Undo => {
                self.undo()?;
            }
            Intent::Redo => {
                self.redo()?;
            }
        }
        Ok(())
    }

    // Viewport intents. Rendering follows immediately; only the settled page is debounced.

    pub fn scroll_by(&mut self, delta: f32) {
        let now = self.clock.now();
        self.viewport.scroll_by(delta, now);
        self.sync_required();
    }

    pub fn scroll_to(&mut self, offset: f32) {
        let now = self.clock.now();
        self.viewport.scroll_to(offset, now);
        self.sync_required();
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.resize(width, height);
        self.sync_required();
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.viewport.set_zoom(zoom);
        self.sync_required();
    }

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
        self.sync_required();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
        self.sync_required();
    }

    pub fn reset_zoom(&mut self) {
        self.viewport.reset_zoom();
        self.sync_required();
    }

    pub fn fit_width(&mut self) {
        self.viewport.fit_width();
        self.sync_required();
    }

    pub fn fit_page(&mut self) {
        self.viewport.fit_page();
        self.sync_required();
    }

    pub fn rotate_view(&mut self, rotation: Rotation) {
        self.viewport.set_rotation(rotation);
        self.sync_required();
    }

    pub fn rotate_clockwise(&mut self) {
        self.rotate_view(self.viewport.rotation().clockwise());
    }

    pub fn rotate_counter_clockwise(&mut self) {
        self.rotate_view(self.viewport.rotation().counter_clockwise());
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.viewport.set_view_mode(mode);
        self.sync_required();
    }

    pub fn go_to_page(&mut self, page: usize) {
        let change = self.viewport.go_to_page(page);
        self.navigated(change);
    }

    pub fn next_page(&mut self, count: usize) {
        let change = self.viewport.next_page(count);
        self.navigated(change);
    }

    pub fn prev_page(&mut self, count: usize) {
        let change = self.viewport.prev_page(count);
        self.navigated(change);
    }

    pub fn first_page(&mut self) {
        let change = self.viewport.first_page();
        self.navigated(change);
    }

    pub fn last_page(&mut self) {
        let change = self.viewport.last_page();
        self.navigated(change);
    }

    fn navigated(&mut self, change: Option<PageChange>) {
        self.publish_page_change(change);
        self.sync_required();
    }

    /// Emits the settled current page once scrolling has been quiet long enough.
    pub fn tick(&mut self) {
        let change = self.viewport.tick(self.clock.now());
        self.publish_page_change(change);
    }

    fn publish_page_change(&self, change: Option<PageChange>) {
        if let Some(PageChange { page_index, total }) = change {
            self.events
                .publish(ViewerEvent::CurrentPageChanged { page_index, total });
        }
    }

    /// Applies every render that finished since the last call. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.handle_completion(completion);
            handled += 1;
        }
        if handled > 0 {
            self.cache.evict_to_budget();
        }
        handled
    }

    /// Waits for the next finished render and applies it. Returns false once no render can
    /// arrive any more.
    pub async fn next_render(&mut self) -> bool {
        match self.completions.recv().await {
            Some(completion) => {
                self.handle_completion(completion);
                self.cache.evict_to_budget();
                true
            }
            None => false,
        }
    }

    fn handle_completion(&mut self, completion: RenderCompletion) {
        match self.cache.complete(completion) {
            CompletionOutcome::Ready { key, bitmap } => {
                if self.wants(&key) {
                    self.delivered.insert(key.page_index, key);
                    self.events.publish(ViewerEvent::PageReady {
                        page_index: key.page_index,
                        bitmap,
                    });
                }
            }
            CompletionOutcome::Failed { key, reason } => {
                if self.wants(&key) {
                    self.delivered.insert(key.page_index, key);
                    self.events.publish(ViewerEvent::PageFailed {
                        page_index: key.page_index,
                        reason,
                    });
                }
            }
            CompletionOutcome::Stale { .. } | CompletionOutcome::Cancelled { .. } => {}
        }
    }

    fn key_for(&self, page_index: usize) -> CacheKey {
        self.cache.key(
            page_index,
            self.viewport.zoom(),
            self.viewport.effective_rotation(page_index),
        )
    }

    fn wants(&self, key: &CacheKey) -> bool {
        self.viewport.required_pages().contains(&key.page_index)
            && self.key_for(key.page_index) == *key
    }

    /// Pins the required page set and requests whatever the shell does not have yet.
    fn sync_required(&mut self) {
        let pages = self.viewport.required_pages();
        let keys: Vec<CacheKey> = pages.iter().map(|page| self.key_for(*page)).collect();
        self.cache.set_required(keys.iter().copied());
        self.delivered.retain(|page, _| pages.contains(page));

        for key in keys {
            if self.delivered.get(&key.page_index) == Some(&key) {
                continue;
            }
            match self.cache.get_or_fetch(key) {
                Fetch::Ready(bitmap) => {
                    self.delivered.insert(key.page_index, key);
                    self.events.publish(ViewerEvent::PageReady {
                        page_index: key.page_index,
                        bitmap,
                    });
                }
                Fetch::Failed(reason) => {
                    self.delivered.insert(key.page_index, key);
                    self.events.publish(ViewerEvent::PageFailed {
                        page_index: key.page_index,
                        reason,
                    });
                }
                Fetch::Pending => {}
            }
        }
    }

    /// Drops a page's cached renders, including a remembered failure, and renders it again.
    pub fn reload_page(&mut self, page_index: usize) {
        self.cache.invalidate_page(page_index);
        self.delivered.remove(&page_index);
        self.sync_required();
    }

    // Edits. Every history change funnels through `apply_effects`.

    fn check_page(&self, page_index: usize) -> Result<(), ModelError> {
        if page_index < self.info.page_count {
            Ok(())
        } else {
            Err(ModelError::PageOutOfRange {
                page: page_index,
                page_count: self.info.page_count,
            })
        }
    }

    fn execute(&mut self, command: EditCommand) -> SessionResult<EditEffects> {
        let effects = self.undo.execute(command, &mut self.objects)?;
        self.apply_effects(&effects);
        Ok(effects)
    }

    fn apply_effects(&mut self, effects: &EditEffects) {
        self.state.record_edit(effects.head);
        for page in &effects.touched.layout_pages {
            self.viewport
                .set_page_rotation(*page, self.objects.page_rotation(*page));
            self.cache.invalidate_page(*page);
            self.delivered.remove(page);
        }
        let pages: BTreeSet<usize> = effects
            .touched
            .object_pages
            .union(&effects.touched.layout_pages)
            .copied()
            .collect();
        for page_index in pages {
            self.events
                .publish(ViewerEvent::ObjectsChanged { page_index });
        }
        if !effects.touched.layout_pages.is_empty() {
            self.sync_required();
        }
    }

    pub fn add_object(&mut self, draft: ObjectDraft) -> SessionResult<ObjectId> {
        self.check_page(draft.page_index)?;
        let effects = self.execute(EditCommand::add(draft))?;
        effects
            .created
            .ok_or_else(|| SessionError::Worker("add produced no object".into()))
    }

    /// Adds a default text note centered on `page_index`.
    pub fn add_note(&mut self, page_index: usize) -> SessionResult<ObjectId> {
        let size = self
            .info
            .page_sizes
            .get(page_index)
            .copied()
            .ok_or(ModelError::PageOutOfRange {
                page: page_index,
                page_count: self.info.page_count,
            })?;
        let bounds = Rect::new(
            ((size.width - NOTE_WIDTH) / 2.0).max(0.0),
            ((size.height - NOTE_HEIGHT) / 2.0).max(0.0),
            NOTE_WIDTH.min(size.width),
            NOTE_HEIGHT.min(size.height),
        );
        let id = self.add_object(ObjectDraft::text(page_index, bounds, TextPayload::new("Note")))?;
        self.select(id)?;
        Ok(id)
    }

    pub fn remove_object(&mut self, id: ObjectId) -> SessionResult<()> {
        self.execute(EditCommand::remove(id))?;
        Ok(())
    }

    pub fn move_object(&mut self, id: ObjectId, bounds: Rect) -> SessionResult<()> {
        self.execute(EditCommand::move_to(id, bounds))?;
        Ok(())
    }

    pub fn set_property(&mut self, id: ObjectId, property: Property) -> SessionResult<()> {
        self.execute(EditCommand::set_property(id, property))?;
        Ok(())
    }

    pub fn reorder(&mut self, id: ObjectId, direction: ZDirection) -> SessionResult<()> {
        self.execute(EditCommand::reorder(id, direction))?;
        Ok(())
    }

    /// Runs one command per selected object as a single undo entry; if any of them fails,
    /// none is applied.
    fn edit_selection(
        &mut self,
        label: &str,
        command: impl Fn(ObjectId) -> EditCommand,
    ) -> SessionResult<()> {
        let commands: Vec<EditCommand> = self.objects.selected().into_iter().map(command).collect();
        if commands.is_empty() {
            return Ok(());
        }
        self.execute(EditCommand::group(label, commands))?;
        Ok(())
    }

    /// Sets the stored rotation of one page as an undoable edit.
    pub fn rotate_page(&mut self, page_index: usize, rotation: Rotation) -> SessionResult<()> {
        self.check_page(page_index)?;
        self.execute(EditCommand::rotate_page(page_index, rotation))?;
        Ok(())
    }

    pub fn begin_gesture(&mut self, label: &str) {
        self.end_gesture();
        self.undo.begin_gesture(label);
    }

    pub fn end_gesture(&mut self) {
        self.undo.end_gesture();
    }

    pub fn cancel_gesture(&mut self) -> SessionResult<()> {
        if let Some(effects) = self.undo.cancel_gesture(&mut self.objects)? {
            self.apply_effects(&effects);
        }
        Ok(())
    }

    fn nudge(&mut self, dx: f32, dy: f32) -> SessionResult<()> {
        let selected: Vec<EditableObject> = self
            .objects
            .selected()
            .into_iter()
            .filter_map(|id| self.objects.get(id).cloned())
            .collect();
        if selected.is_empty() {
            return Ok(());
        }
        if !self.undo.in_gesture() {
            self.undo.begin_gesture(NUDGE_GESTURE);
        }
        for object in selected {
            self.move_object(object.id, object.bounds.translated(dx, dy))?;
        }
        Ok(())
    }

    /// Undoes the newest edit. Returns false when there was nothing to undo.
    pub fn undo(&mut self) -> SessionResult<bool> {
        match self.undo.undo(&mut self.objects)? {
            Some(effects) => {
                self.apply_effects(&effects);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> SessionResult<bool> {
        match self.undo.redo(&mut self.objects)? {
            Some(effects) => {
                self.apply_effects(&effects);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // Selection is presentation state: no history, no dirty flag.

    pub fn select(&mut self, id: ObjectId) -> SessionResult<()> {
        let pages = self.objects.select(id)?;
        self.publish_objects_changed(pages);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        let pages = self.objects.clear_selection();
        self.publish_objects_changed(pages);
    }

    pub fn selected(&self) -> Vec<ObjectId> {
        self.objects.selected()
    }

    pub fn hit_test(&self, page_index: usize, point: Point) -> Option<ObjectId> {
        self.objects.hit_test(page_index, point)
    }

    /// Selects the object after the current selection on `page_index`, bottom to top,
    /// wrapping around.
    pub fn select_next(&mut self, page_index: usize) -> SessionResult<Option<ObjectId>> {
        let ids: Vec<ObjectId> = self
            .objects
            .objects_on_page(page_index)
            .iter()
            .map(|object| object.id)
            .collect();
        if ids.is_empty() {
            return Ok(None);
        }
        let next = self
            .objects
            .selected()
            .first()
            .and_then(|current| ids.iter().position(|id| id == current))
            .map_or(0, |position| (position + 1) % ids.len());
        self.select(ids[next])?;
        Ok(Some(ids[next]))
    }

    fn publish_objects_changed(&self, pages: BTreeSet<usize>) {
        for page_index in pages {
            self.events
                .publish(ViewerEvent::ObjectsChanged { page_index });
        }
    }

    // Saving.

    /// Writes the objects back to the bound file.
    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> SessionResult<()> {
        self.start_commit()?.wait().await
    }

    #[instrument(skip(self))]
    pub async fn save_as(&mut self, path: PathBuf) -> SessionResult<()> {
        self.start_save_as(path)?.wait().await
    }

    pub fn start_commit(&mut self) -> SessionResult<PendingCommit> {
        let target = self.state.path().ok_or(CommitError::Untitled)?;
        self.start_save_as(target)
    }

    /// Hands the current snapshot to a blocking worker and returns immediately. The worker
    /// marks the document clean at the history position captured here, so edits made while it
    /// runs keep the document dirty. Must be called inside a tokio runtime.
    pub fn start_save_as(&mut self, target: PathBuf) -> SessionResult<PendingCommit> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| SessionError::Worker(err.to_string()))?;
        self.end_gesture();
        let snapshot = self.objects.serialize();
        let saved = self.undo.head();
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let handle = self.handle;
        let task_target = target.clone();
        debug!(path = ?target, objects = snapshot.objects.len(), "starting save");
        let task = runtime.spawn_blocking(move || {
            backend.commit_objects(handle, &snapshot, &task_target)?;
            state.mark_clean_at(saved, task_target);
            Ok::<(), CommitError>(())
        });
        Ok(PendingCommit { target, task })
    }

    pub fn view_state(&self) -> PersistedViewState {
        PersistedViewState {
            current_page: self.viewport.current_page(),
            zoom: self.viewport.zoom(),
            rotation: self.viewport.rotation(),
            view_mode: self.viewport.view_mode(),
        }
    }

    pub fn persist_view_state(&self) -> anyhow::Result<()> {
        match &self.store {
            Some(store) => store.save(&self.info, &self.view_state()),
            None => Ok(()),
        }
    }

    /// Remembers where the user was and releases the backend document.
    pub fn close(self) {
        if let Err(err) = self.persist_view_state() {
            warn!(error = %err, "failed to persist view state");
        }
        self.cache.clear();
        self.backend.close(self.handle);
        info!(id = %self.info.id, "document closed");
    }
}
