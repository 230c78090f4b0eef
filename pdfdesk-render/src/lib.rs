use std::collections::HashMap;
use std::convert::TryFrom;
use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use pdfdesk_core::{
    Bitmap, CollectionSnapshot, Color, CommitError, DocumentHandle, DocumentMetadata,
    EditableObject, ImagePayload, ObjectPayload, OpenError, PageSize, PdfBackend, Rect,
    RenderError, RenderRequest, Rotation, ShapeKind, ShapePayload, TextPayload,
};
use pdfium_render::prelude::*;
use tracing::{debug, info, instrument, warn};

/// `PdfBackend` over a dynamically bound pdfium library.
///
/// Each open document keeps the bytes it was loaded from. Rendering uses a live document
/// parsed from them; commits parse a fresh copy, write the editable objects into it and
/// save that copy, so the live document never accumulates committed objects.
pub struct PdfiumBackend {
    // Declared before `pdfium` so every cached document drops first.
    documents: Mutex<HashMap<DocumentHandle, OpenDocument>>,
    next_handle: AtomicU64,
    pdfium: Arc<Pdfium>,
}

struct OpenDocument {
    document: PdfDocument<'static>,
    source: Vec<u8>,
    path: PathBuf,
}

impl PdfiumBackend {
    /// Binds pdfium from `library` when given, otherwise from the working directory and then
    /// the system library path.
    pub fn new(library: Option<&Path>) -> Result<Self> {
        let pdfium = match library.and_then(bind_pdfium_from_path) {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            documents: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            pdfium: Arc::new(pdfium),
        })
    }

    fn with_document<R>(
        &self,
        handle: DocumentHandle,
        f: impl FnOnce(&OpenDocument) -> R,
    ) -> Option<R> {
        let guard = self.documents.lock();
        guard.get(&handle).map(f)
    }
}

impl PdfBackend for PdfiumBackend {
    #[instrument(skip(self))]
    fn open(&self, path: &Path) -> Result<DocumentHandle, OpenError> {
        let source = fs::read(path).map_err(|err| open_error_from_io(err, path))?;
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(source.clone(), None)
            .map_err(open_error_from_pdfium)?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It is stored in
        // `self.documents`, which is declared before `pdfium` and therefore dropped first, and
        // `close` removes it explicitly. The bindings outlive every stored document.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };

        let handle = DocumentHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        info!(?handle, pages = document.pages().len(), "opened pdf");
        self.documents.lock().insert(
            handle,
            OpenDocument {
                document,
                source,
                path: path.to_path_buf(),
            },
        );
        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> usize {
        self.with_document(handle, |open| {
            usize::try_from(open.document.pages().len()).unwrap_or_default()
        })
        .unwrap_or_default()
    }

    fn page_size(&self, handle: DocumentHandle, page_index: usize) -> Result<PageSize, RenderError> {
        self.with_document(handle, |open| {
            let page = load_page(&open.document, page_index)?;
            Ok(PageSize::new(page.width().value, page.height().value))
        })
        .unwrap_or_else(|| Err(unknown_handle(handle)))
    }

    #[instrument(skip(self))]
    fn render_page(&self, handle: DocumentHandle, request: RenderRequest) -> Result<Bitmap, RenderError> {
        self.with_document(handle, |open| render_internal(&open.document, &request))
            .unwrap_or_else(|| Err(unknown_handle(handle)))
    }

    #[instrument(skip(self, snapshot), fields(objects = snapshot.objects.len()))]
    fn commit_objects(
        &self,
        handle: DocumentHandle,
        snapshot: &CollectionSnapshot,
        target: &Path,
    ) -> Result<(), CommitError> {
        let Some(source) = self.with_document(handle, |open| open.source.clone()) else {
            return Err(CommitError::Io(format!("unknown document handle {}", handle.0)));
        };
        let mut document = self
            .pdfium
            .load_pdf_from_byte_vec(source, None)
            .map_err(|err| CommitError::Io(format!("failed to reload document: {err}")))?;

        for (&page_index, &rotation) in &snapshot.page_rotations {
            let mut page = load_page(&document, page_index)
                .map_err(|err| CommitError::Io(err.to_string()))?;
            let base = page
                .rotation()
                .map(rotation_from_pdfium)
                .unwrap_or_default();
            page.set_rotation(rotation_to_pdfium(base.combine(rotation)));
        }

        let mut objects: Vec<&EditableObject> = snapshot.objects.iter().collect();
        objects.sort_by_key(|object| (object.page_index, object.z_order));
        for object in objects {
            write_object(&mut document, object)?;
        }

        save_atomically(&document, target)?;
        info!(path = %target.display(), "committed editable objects");
        Ok(())
    }

    fn metadata(&self, handle: DocumentHandle) -> DocumentMetadata {
        self.with_document(handle, |open| read_metadata(&open.document))
            .unwrap_or_default()
    }

    fn close(&self, handle: DocumentHandle) {
        if let Some(open) = self.documents.lock().remove(&handle) {
            debug!(path = %open.path.display(), "closed pdf");
        }
    }
}

fn unknown_handle(handle: DocumentHandle) -> RenderError {
    RenderError::Backend(format!("unknown document handle {}", handle.0))
}

fn load_page<'a>(document: &'a PdfDocument<'_>, page_index: usize) -> Result<PdfPage<'a>, RenderError> {
    let index: PdfPageIndex = page_index
        .try_into()
        .map_err(|_| RenderError::PageOutOfRange(page_index))?;
    document
        .pages()
        .get(index)
        .map_err(|_| RenderError::PageOutOfRange(page_index))
}

fn render_internal(document: &PdfDocument<'_>, request: &RenderRequest) -> Result<Bitmap, RenderError> {
    let page = load_page(document, request.page_index)?;
    let config = PdfRenderConfig::new()
        .scale_page_by_factor(request.zoom.max(0.1))
        .rotate(rotation_to_pdfium(request.rotation), true);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|err| RenderError::Decode {
            page: request.page_index,
            reason: err.to_string(),
        })?;
    let image = bitmap.as_image().to_rgba8();
    let (width, height) = image.dimensions();
    Ok(Bitmap {
        width,
        height,
        pixels: image.into_raw(),
    })
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let tag = |kind| metadata.get(kind).map(|t| t.value().to_owned());
    DocumentMetadata {
        title: tag(PdfDocumentMetadataTagType::Title),
        author: tag(PdfDocumentMetadataTagType::Author),
        subject: tag(PdfDocumentMetadataTagType::Subject),
        keywords: tag(PdfDocumentMetadataTagType::Keywords)
            .map(|raw| split_keywords(&raw))
            .unwrap_or_default(),
        creator: tag(PdfDocumentMetadataTagType::Creator),
        producer: tag(PdfDocumentMetadataTagType::Producer),
    }
}

fn write_object(document: &mut PdfDocument<'_>, object: &EditableObject) -> Result<(), CommitError> {
    let font = match &object.payload {
        ObjectPayload::Text(text) => Some(font_token(document, BuiltinFont::for_text(text))),
        _ => None,
    };
    let mut page = load_page(document, object.page_index)
        .map_err(|err| CommitError::Io(err.to_string()))?;
    let page_height = page.height().value;
    let area = PdfArea::from_top_left(object.bounds, page_height);
    let objects = page.objects_mut();

    let created = match (&object.payload, font) {
        (ObjectPayload::Text(text), Some(font)) => {
            let (x, baseline) = area.text_origin(text.size);
            objects
                .create_text_object(
                    PdfPoints::new(x),
                    PdfPoints::new(baseline),
                    &text.content,
                    font,
                    PdfPoints::new(text.size),
                )
                .and_then(|mut created| created.set_fill_color(pdf_color(text.color)))
        }
        (ObjectPayload::Image(image), _) => {
            let decoded = load_image_source(image)?;
            objects
                .create_image_object(
                    PdfPoints::new(area.left),
                    PdfPoints::new(area.bottom),
                    &decoded,
                    Some(PdfPoints::new(area.width() * image.scale)),
                    Some(PdfPoints::new(area.height() * image.scale)),
                )
                .map(|_| ())
        }
        (ObjectPayload::Shape(shape), _) => write_shape(objects, &area, shape),
        (ObjectPayload::Text(_), None) => Ok(()),
    };
    created.map_err(|err| {
        CommitError::Io(format!("failed to write object {} on page {}: {err}", object.id.0, object.page_index))
    })
}

fn write_shape(
    objects: &mut PdfPageObjects<'_>,
    area: &PdfArea,
    shape: &ShapePayload,
) -> Result<(), PdfiumError> {
    let stroke = pdf_color(shape.stroke);
    let width = PdfPoints::new(shape.stroke_width.max(0.0));
    let fill = shape.fill.map(pdf_color);
    let rect = PdfRect::new_from_values(area.bottom, area.left, area.top, area.right);
    match shape.kind {
        ShapeKind::Rectangle => objects
            .create_path_object_rect(rect, Some(stroke), Some(width), fill)
            .map(|_| ()),
        ShapeKind::Ellipse => objects
            .create_path_object_ellipse(rect, Some(stroke), Some(width), fill)
            .map(|_| ()),
        ShapeKind::Line => {
            let ((x1, y1), (x2, y2)) = area.line_endpoints(&shape.points);
            objects
                .create_path_object_line(
                    PdfPoints::new(x1),
                    PdfPoints::new(y1),
                    PdfPoints::new(x2),
                    PdfPoints::new(y2),
                    stroke,
                    width,
                )
                .map(|_| ())
        }
    }
}

fn load_image_source(image: &ImagePayload) -> Result<image::DynamicImage, CommitError> {
    image::open(&image.source.key).map_err(|err| {
        CommitError::Io(format!("failed to load image {:?}: {err}", image.source.key))
    })
}

fn save_atomically(document: &PdfDocument<'_>, target: &Path) -> Result<(), CommitError> {
    let tmp = temp_path_for(target);
    document
        .save_to_file(&tmp)
        .map_err(|err| CommitError::Io(format!("failed to write {:?}: {err}", tmp)))?;
    fs::rename(&tmp, target).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        commit_error_from_io(err, target)
    })
}

fn font_token(document: &mut PdfDocument<'_>, font: BuiltinFont) -> PdfFontToken {
    let fonts = document.fonts_mut();
    match font {
        BuiltinFont::Helvetica => fonts.helvetica(),
        BuiltinFont::HelveticaBold => fonts.helvetica_bold(),
        BuiltinFont::HelveticaOblique => fonts.helvetica_oblique(),
        BuiltinFont::HelveticaBoldOblique => fonts.helvetica_bold_oblique(),
        BuiltinFont::TimesRoman => fonts.times_roman(),
        BuiltinFont::TimesBold => fonts.times_bold(),
        BuiltinFont::TimesItalic => fonts.times_italic(),
        BuiltinFont::TimesBoldItalic => fonts.times_bold_italic(),
        BuiltinFont::Courier => fonts.courier(),
        BuiltinFont::CourierBold => fonts.courier_bold(),
        BuiltinFont::CourierOblique => fonts.courier_oblique(),
        BuiltinFont::CourierBoldOblique => fonts.courier_bold_oblique(),
    }
}

fn pdf_color(color: Color) -> PdfColor {
    PdfColor::new(color.r, color.g, color.b, color.a)
}

fn rotation_to_pdfium(rotation: Rotation) -> PdfPageRenderRotation {
    match rotation {
        Rotation::None => PdfPageRenderRotation::None,
        Rotation::Quarter => PdfPageRenderRotation::Degrees90,
        Rotation::Half => PdfPageRenderRotation::Degrees180,
        Rotation::ThreeQuarters => PdfPageRenderRotation::Degrees270,
    }
}

fn rotation_from_pdfium(rotation: PdfPageRenderRotation) -> Rotation {
    match rotation {
        PdfPageRenderRotation::None => Rotation::None,
        PdfPageRenderRotation::Degrees90 => Rotation::Quarter,
        PdfPageRenderRotation::Degrees180 => Rotation::Half,
        PdfPageRenderRotation::Degrees270 => Rotation::ThreeQuarters,
    }
}

fn open_error_from_pdfium(err: PdfiumError) -> OpenError {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)
        | PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::SecurityError) => {
            OpenError::Encrypted
        }
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError) => {
            OpenError::Corrupt("not a valid pdf file".to_owned())
        }
        other => OpenError::Corrupt(other.to_string()),
    }
}

fn open_error_from_io(err: io::Error, path: &Path) -> OpenError {
    match err.kind() {
        io::ErrorKind::NotFound => OpenError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => OpenError::PermissionDenied(path.to_path_buf()),
        _ => OpenError::Corrupt(format!("failed to read {}: {err}", path.display())),
    }
}

fn commit_error_from_io(err: io::Error, target: &Path) -> CommitError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => CommitError::PermissionDenied(target.to_path_buf()),
        _ => CommitError::Io(format!("failed to move save into place at {}: {err}", target.display())),
    }
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_owned());
    target.with_file_name(format!(".{name}.pdfdesk-tmp"))
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_owned)
        .collect()
}

/// An object's bounds in PDF user space (origin bottom-left, y up).
#[derive(Debug, Clone, Copy, PartialEq)]
struct PdfArea {
    left: f32,
    bottom: f32,
    right: f32,
    top: f32,
}

impl PdfArea {
    fn from_top_left(bounds: Rect, page_height: f32) -> Self {
        let top = page_height - bounds.y;
        Self {
            left: bounds.x,
            bottom: top - bounds.height,
            right: bounds.x + bounds.width,
            top,
        }
    }

    fn width(&self) -> f32 {
        self.right - self.left
    }

    fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// Baseline origin placing the first line's cap height at the top edge.
    fn text_origin(&self, size: f32) -> (f32, f32) {
        (self.left, (self.top - size).max(self.bottom))
    }

    /// Shape points are relative to the top-left corner, y down; without two of them the
    /// line runs along the diagonal.
    fn line_endpoints(&self, points: &[pdfdesk_core::Point]) -> ((f32, f32), (f32, f32)) {
        match points {
            [from, to, ..] => (
                (self.left + from.x, self.top - from.y),
                (self.left + to.x, self.top - to.y),
            ),
            _ => ((self.left, self.top), (self.right, self.bottom)),
        }
    }
}

/// The standard 14 faces pdfium can embed without a font file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

impl BuiltinFont {
    fn for_text(text: &TextPayload) -> Self {
        let family = text.font.to_ascii_lowercase();
        let (bold, italic) = (text.style.bold, text.style.italic);
        if family.contains("times") || (family.contains("serif") && !family.contains("sans")) {
            match (bold, italic) {
                (false, false) => Self::TimesRoman,
                (true, false) => Self::TimesBold,
                (false, true) => Self::TimesItalic,
                (true, true) => Self::TimesBoldItalic,
            }
        } else if family.contains("courier") || family.contains("mono") {
            match (bold, italic) {
                (false, false) => Self::Courier,
                (true, false) => Self::CourierBold,
                (false, true) => Self::CourierOblique,
                (true, true) => Self::CourierBoldOblique,
            }
        } else {
            match (bold, italic) {
                (false, false) => Self::Helvetica,
                (true, false) => Self::HelveticaBold,
                (false, true) => Self::HelveticaOblique,
                (true, true) => Self::HelveticaBoldOblique,
            }
        }
    }
}

fn bind_pdfium_from_path(path: &Path) -> Option<Pdfium> {
    let library = if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    };
    match Pdfium::bind_to_library(&library) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from configured path {}: {}",
                library.display(),
                err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set pdfium_library in config.toml or install it ({})",
                errors.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfdesk_core::{Point, TextStyle};
    use tempfile::tempdir;

    #[test]
    fn bounds_flip_into_pdf_space() {
        let area = PdfArea::from_top_left(Rect::new(72.0, 100.0, 200.0, 50.0), 792.0);
        assert_eq!(
            area,
            PdfArea {
                left: 72.0,
                bottom: 642.0,
                right: 272.0,
                top: 692.0,
            }
        );
        assert_eq!(area.width(), 200.0);
        assert_eq!(area.height(), 50.0);
        assert_eq!(area.text_origin(12.0), (72.0, 680.0));
        // Oversized text never drops below the box.
        assert_eq!(area.text_origin(80.0), (72.0, 642.0));
    }

    #[test]
    fn line_uses_relative_points_or_diagonal() {
        let area = PdfArea::from_top_left(Rect::new(10.0, 10.0, 100.0, 40.0), 100.0);
        assert_eq!(
            area.line_endpoints(&[Point::new(0.0, 40.0), Point::new(100.0, 0.0)]),
            ((10.0, 50.0), (110.0, 90.0))
        );
        assert_eq!(area.line_endpoints(&[]), ((10.0, 90.0), (110.0, 50.0)));
    }

    #[test]
    fn font_family_and_style_pick_a_standard_face() {
        let mut text = TextPayload::new("hello");
        text.font = "Times New Roman".to_owned();
        text.style = TextStyle {
            bold: true,
            italic: true,
            underline: false,
        };
        assert_eq!(BuiltinFont::for_text(&text), BuiltinFont::TimesBoldItalic);

        text.font = "DejaVu Sans Mono".to_owned();
        text.style.italic = false;
        assert_eq!(BuiltinFont::for_text(&text), BuiltinFont::CourierBold);

        text.font = "Sans Serif".to_owned();
        text.style.bold = false;
        assert_eq!(BuiltinFont::for_text(&text), BuiltinFont::Helvetica);
    }

    #[test]
    fn io_errors_map_to_open_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.pdf");
        let err = fs::read(&missing).unwrap_err();
        assert!(matches!(open_error_from_io(err, &missing), OpenError::NotFound(p) if p == missing));

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(
            open_error_from_io(denied, &missing),
            OpenError::PermissionDenied(_)
        ));
        assert!(matches!(
            commit_error_from_io(io::Error::from(io::ErrorKind::PermissionDenied), &missing),
            CommitError::PermissionDenied(_)
        ));
    }

    #[test]
    fn pdfium_errors_map_to_open_errors() {
        let encrypted = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(open_error_from_pdfium(encrypted), OpenError::Encrypted));
        let corrupt = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError);
        assert!(matches!(open_error_from_pdfium(corrupt), OpenError::Corrupt(_)));
    }

    #[test]
    fn rotations_round_trip_through_pdfium() {
        for rotation in [Rotation::None, Rotation::Quarter, Rotation::Half, Rotation::ThreeQuarters] {
            assert_eq!(rotation_from_pdfium(rotation_to_pdfium(rotation)), rotation);
        }
    }

    #[test]
    fn temp_file_is_a_hidden_sibling() {
        let target = Path::new("/tmp/reports/q3.pdf");
        assert_eq!(temp_path_for(target), Path::new("/tmp/reports/.q3.pdf.pdfdesk-tmp"));
        assert_eq!(split_keywords("tax, 2024;; draft "), vec!["tax", "2024", "draft"]);
    }
}
