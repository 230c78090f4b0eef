use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event;
use crossterm::terminal::{self, Clear, ClearType, WindowSize};
use directories::ProjectDirs;
use pdfdesk_core::{
    CommitError, EditorConfig, FileViewStateStore, Intent, PdfDocumentSession, PendingCommit,
    SessionError, SessionServices, SystemClock, ThreadPoolExecutor, ViewStateStore, ViewerShell,
};
use pdfdesk_render::PdfiumBackend;
use pdfdesk_tty::{
    compose_frame, format_status, write_status_line, CellArea, EventMapper, KittyRenderer,
    PageView, TerminalShell, UiEvent,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "pdfdesk",
    version,
    about = "Terminal PDF editor with undoable text, image and shape objects"
)]
struct Args {
    /// Page to open the document on (0-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Config file to use instead of the platform default
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Open the file as the starting point of a new document, saved with --save-as
    #[arg(long = "template", requires = "save_as")]
    template: bool,

    /// Target path for `s` when editing a template
    #[arg(long = "save-as")]
    save_as: Option<PathBuf>,

    /// Path to the PDF file to open
    file: PathBuf,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfdesk", "pdfdesk")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| EditorConfig::default_path(&project_dirs));
    let config = EditorConfig::load_or_default(&config_path)?;
    info!(path = ?config_path, "configuration loaded");

    let state_dir = project_dirs.data_local_dir().join("state");
    let store: Arc<dyn ViewStateStore> = Arc::new(FileViewStateStore::new(state_dir)?);
    let services = SessionServices {
        backend: Arc::new(PdfiumBackend::new(config.pdfium_library.as_deref())?),
        executor: Arc::new(ThreadPoolExecutor::new(config.render_threads)?),
        clock: Arc::new(SystemClock),
        store: Some(store),
    };

    let mut session = if args.template {
        PdfDocumentSession::open_template(services, args.file.clone(), &config).await
    } else {
        PdfDocumentSession::open(services, args.file.clone(), &config).await
    }
    .with_context(|| format!("failed to open {:?}", args.file))?;

    let shell = Arc::new(TerminalShell::new());
    session.subscribe(Arc::clone(&shell) as Arc<dyn ViewerShell>);

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide, Clear(ClearType::All))?;
    let mut renderer = KittyRenderer::new(stdout);

    let (width, height) = canvas_size(&terminal::window_size()?);
    session.resize(width as f32, height as f32);
    if let Some(page) = args.page {
        session.go_to_page(page);
    }

    let mut app = App {
        session,
        shell,
        mapper: EventMapper::new(),
        save_as: args.save_as,
        saving: None,
        message: None,
        quit_armed: false,
    };
    let result = app.run(&mut renderer).await;

    {
        let mut writer = renderer.writer();
        crossterm::execute!(&mut writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    }
    renderer.forget()?;
    app.finish().await;
    result
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

struct App {
    session: PdfDocumentSession,
    shell: Arc<TerminalShell>,
    mapper: EventMapper,
    save_as: Option<PathBuf>,
    saving: Option<PendingCommit>,
    message: Option<String>,
    quit_armed: bool,
}

impl App {
    async fn run(&mut self, renderer: &mut KittyRenderer<io::Stdout>) -> Result<()> {
        let mut dirty = true;
        loop {
            if event::poll(Duration::from_millis(50))? {
                let ev = event::read()?;
                let ui_event = self.mapper.map_event(ev);
                match self.handle_event(ui_event)? {
                    LoopAction::ContinueRedraw => dirty = true,
                    LoopAction::Continue => {}
                    LoopAction::Quit => break,
                }
            }

            self.session.tick();
            self.session.pump();
            if self.poll_save().await {
                dirty = true;
            }

            if self.shell.take_redraw() || dirty {
                self.redraw(renderer)?;
                dirty = false;
            }
        }
        Ok(())
    }

    fn handle_event(&mut self, event: UiEvent) -> Result<LoopAction> {
        if !matches!(event, UiEvent::Quit | UiEvent::None) {
            self.quit_armed = false;
        }
        match event {
            UiEvent::Intent(intent) => {
                self.message = None;
                if let Err(err) = self.session.apply(intent.clone()) {
                    warn!(?intent, %err, "intent rejected");
                    self.message = Some(err.to_string());
                }
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::ClearSelection => {
                self.session.clear_selection();
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Resize { .. } => {
                let (width, height) = canvas_size(&terminal::window_size()?);
                self.session.apply(Intent::Resize {
                    width: width as f32,
                    height: height as f32,
                })?;
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Save => {
                self.start_save();
                Ok(LoopAction::ContinueRedraw)
            }
            UiEvent::Quit => {
                if self.shell.is_dirty() && !self.quit_armed {
                    self.quit_armed = true;
                    self.message = Some("unsaved changes, press q again to quit".to_string());
                    Ok(LoopAction::ContinueRedraw)
                } else {
                    Ok(LoopAction::Quit)
                }
            }
            // Digits only change the pending count shown on the status line.
            UiEvent::None if self.mapper.pending_input().is_some() => Ok(LoopAction::ContinueRedraw),
            UiEvent::None => Ok(LoopAction::Continue),
        }
    }

    fn start_save(&mut self) {
        if self.saving.is_some() {
            self.message = Some("save already in progress".to_string());
            return;
        }
        let started = match (self.session.state().path(), &self.save_as) {
            (None, Some(target)) => self.session.start_save_as(target.clone()),
            _ => self.session.start_commit(),
        };
        match started {
            Ok(pending) => {
                self.message = Some(format!("saving to {}", pending.target().display()));
                self.saving = Some(pending);
            }
            Err(SessionError::Commit(CommitError::Untitled)) => {
                self.message = Some("untitled document: restart with --save-as".to_string());
            }
            Err(err) => {
                warn!(%err, "failed to start save");
                self.message = Some(err.to_string());
            }
        }
    }

    /// Collects a finished background save. Returns whether the status line changed.
    async fn poll_save(&mut self) -> bool {
        if !self.saving.as_ref().is_some_and(PendingCommit::is_finished) {
            return false;
        }
        let Some(pending) = self.saving.take() else {
            return false;
        };
        self.message = Some(match pending.wait().await {
            Ok(()) => "saved".to_string(),
            Err(err) => format!("save failed: {err}"),
        });
        true
    }

    fn redraw(&mut self, renderer: &mut KittyRenderer<io::Stdout>) -> Result<()> {
        let window = terminal::window_size()?;
        let total_cols = u32::from(window.columns).max(1);
        let total_rows = u32::from(window.rows).max(1);
        let image_rows = total_rows.saturating_sub(1).max(1);
        let (width, height) = canvas_size(&window);

        let viewport = self.session.viewport();
        self.shell.retain_pages(&viewport.required_pages());
        let info = self.session.info();
        let objects = self.session.objects();
        let views: Vec<PageView<'_>> = viewport
            .placements()
            .into_iter()
            .filter_map(|placement| {
                let page_size = *info.page_sizes.get(placement.page_index)?;
                Some(PageView {
                    placement,
                    bitmap: self.shell.bitmap(placement.page_index),
                    failed: self.shell.failure(placement.page_index).is_some(),
                    page_size,
                    rotation: viewport.effective_rotation(placement.page_index),
                    objects: objects.objects_on_page(placement.page_index),
                })
            })
            .collect();
        let frame = compose_frame(width, height, &views);

        let current = viewport.current_page();
        let failure = self
            .shell
            .failure(current)
            .map(|reason| format!("page failed: {reason}"));
        let pending = self.mapper.pending_input();
        let status = format_status(
            &self.shell.document_name(),
            current,
            viewport.page_count(),
            viewport.zoom(),
            &[
                viewport.view_mode().label(),
                failure.as_deref().unwrap_or_default(),
                self.message.as_deref().unwrap_or_default(),
                pending.as_deref().unwrap_or_default(),
            ],
        );
        renderer.synchronized(|renderer| {
            renderer.present(&frame, CellArea::new(0, 0, total_cols, image_rows))?;
            draw_status_line(renderer, total_rows, &status)
        })
    }

    /// Waits for an in-flight save and closes the session, persisting the view state.
    async fn finish(self) {
        if let Some(pending) = self.saving {
            if let Err(err) = pending.wait().await {
                warn!(%err, "save in progress at exit failed");
            }
        }
        self.session.close();
    }
}

/// Pixel area available to pages: the whole window minus the status row.
fn canvas_size(window: &WindowSize) -> (u32, u32) {
    let columns = u32::from(window.columns).max(1);
    let rows = u32::from(window.rows).max(1);
    let (pixel_width, pixel_height) = if window.width > 0 && window.height > 0 {
        (u32::from(window.width), u32::from(window.height))
    } else {
        // Terminals that do not report pixels get a typical 8x16 cell.
        (columns * 8, rows * 16)
    };
    let cell_height = pixel_height / rows;
    (
        pixel_width.max(1),
        pixel_height.saturating_sub(cell_height).max(1),
    )
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    total_rows: u32,
    status: &str,
) -> Result<()> {
    let status_row = total_rows.saturating_sub(1);
    let mut writer = renderer.writer();
    crossterm::execute!(
        &mut writer,
        cursor::MoveTo(0, status_row as u16),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(&mut writer, status)?;
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfdesk.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // File only: anything written to the terminal would corrupt the image protocol.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
