//! Software composition of the visible pages and their editable objects into one frame.

use pdfdesk_core::{
    Bitmap, BitmapHandle, Color, EditableObject, ObjectPayload, PagePlacement, PageSize, Rect,
    Rotation,
};

const BACKGROUND: [u8; 3] = [48, 48, 48];
const PLACEHOLDER: [u8; 3] = [236, 236, 236];
const FAILED: [u8; 3] = [200, 80, 80];
const TEXT_TINT: [u8; 3] = [255, 220, 80];
const IMAGE_TINT: [u8; 3] = [90, 160, 255];
const OUTLINE: [u8; 3] = [60, 60, 60];
const SELECTION: [u8; 3] = [30, 120, 255];

/// Everything needed to paint one visible page.
pub struct PageView<'a> {
    pub placement: PagePlacement,
    pub bitmap: Option<BitmapHandle>,
    pub failed: bool,
    /// Unrotated page size in points.
    pub page_size: PageSize,
    pub rotation: Rotation,
    pub objects: &'a [EditableObject],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl PixelRect {
    fn from_f32(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x0: x.floor() as i64,
            y0: y.floor() as i64,
            x1: (x + width).ceil() as i64,
            y1: (y + height).ceil() as i64,
        }
    }

    fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }
}

/// Paints `pages` onto a `width` x `height` canvas. Pages whose bitmap has not arrived yet are
/// drawn as plain placeholders; failed pages get a tinted placeholder.
pub fn compose_frame(width: u32, height: u32, pages: &[PageView<'_>]) -> Bitmap {
    let mut canvas = Bitmap {
        width,
        height,
        pixels: vec![0; width as usize * height as usize * 4],
    };
    for pixel in canvas.pixels.chunks_exact_mut(4) {
        pixel[..3].copy_from_slice(&BACKGROUND);
        pixel[3] = 255;
    }

    for page in pages {
        let target = PixelRect::from_f32(
            page.placement.x,
            page.placement.y,
            page.placement.width,
            page.placement.height,
        );
        match (&page.bitmap, page.failed) {
            (Some(bitmap), _) => blit_scaled(&mut canvas, bitmap, target),
            (None, true) => fill_rect(&mut canvas, target, FAILED, 1.0),
            (None, false) => fill_rect(&mut canvas, target, PLACEHOLDER, 1.0),
        }
        draw_objects(&mut canvas, page);
    }
    canvas
}

fn draw_objects(canvas: &mut Bitmap, page: &PageView<'_>) {
    let rotated = page.page_size.rotated(page.rotation);
    if rotated.width <= 0.0 {
        return;
    }
    let scale = page.placement.width / rotated.width;

    // Objects arrive sorted by z-order, so later ones paint over earlier ones.
    for object in page.objects {
        let bounds = rotate_rect(object.bounds, page.page_size, page.rotation);
        let rect = PixelRect::from_f32(
            page.placement.x + bounds.x * scale,
            page.placement.y + bounds.y * scale,
            bounds.width * scale,
            bounds.height * scale,
        );
        match &object.payload {
            ObjectPayload::Text(text) => {
                fill_rect(canvas, rect, TEXT_TINT, 0.35);
                stroke_rect(canvas, rect, rgb(text.color), 1);
            }
            ObjectPayload::Image(_) => {
                fill_rect(canvas, rect, IMAGE_TINT, 0.3);
                stroke_rect(canvas, rect, OUTLINE, 1);
            }
            ObjectPayload::Shape(shape) => {
                if let Some(fill) = shape.fill {
                    fill_rect(canvas, rect, rgb(fill), f32::from(fill.a) / 255.0);
                }
                let thickness = (shape.stroke_width * scale).round().max(1.0) as i64;
                stroke_rect(canvas, rect, rgb(shape.stroke), thickness);
            }
        }
        if object.selected {
            let outer = PixelRect {
                x0: rect.x0 - 2,
                y0: rect.y0 - 2,
                x1: rect.x1 + 2,
                y1: rect.y1 + 2,
            };
            stroke_rect(canvas, outer, SELECTION, 2);
        }
    }
}

fn rgb(color: Color) -> [u8; 3] {
    [color.r, color.g, color.b]
}

/// Maps a rectangle on the unrotated page (origin top-left, y down) onto the page as shown
/// after a clockwise `rotation`.
fn rotate_rect(rect: Rect, page: PageSize, rotation: Rotation) -> Rect {
    match rotation {
        Rotation::None => rect,
        Rotation::Quarter => Rect::new(page.height - rect.y - rect.height, rect.x, rect.height, rect.width),
        Rotation::Half => Rect::new(
            page.width - rect.x - rect.width,
            page.height - rect.y - rect.height,
            rect.width,
            rect.height,
        ),
        Rotation::ThreeQuarters => Rect::new(rect.y, page.width - rect.x - rect.width, rect.height, rect.width),
    }
}

/// Nearest-neighbour scale of `source` into `target`, clipped to the canvas.
fn blit_scaled(canvas: &mut Bitmap, source: &Bitmap, target: PixelRect) {
    if target.is_empty() || source.width == 0 || source.height == 0 {
        return;
    }
    let clipped = clip(canvas, target);
    if clipped.is_empty() {
        return;
    }
    let target_width = (target.x1 - target.x0) as f64;
    let target_height = (target.y1 - target.y0) as f64;
    let canvas_stride = canvas.width as usize * 4;
    let source_stride = source.width as usize * 4;

    for y in clipped.y0..clipped.y1 {
        let v = ((y - target.y0) as f64 + 0.5) / target_height;
        let sy = ((v * f64::from(source.height)) as usize).min(source.height as usize - 1);
        for x in clipped.x0..clipped.x1 {
            let u = ((x - target.x0) as f64 + 0.5) / target_width;
            let sx = ((u * f64::from(source.width)) as usize).min(source.width as usize - 1);
            let src = sy * source_stride + sx * 4;
            let dst = y as usize * canvas_stride + x as usize * 4;
            canvas.pixels[dst..dst + 4].copy_from_slice(&source.pixels[src..src + 4]);
        }
    }
}

fn clip(canvas: &Bitmap, rect: PixelRect) -> PixelRect {
    PixelRect {
        x0: rect.x0.clamp(0, i64::from(canvas.width)),
        y0: rect.y0.clamp(0, i64::from(canvas.height)),
        x1: rect.x1.clamp(0, i64::from(canvas.width)),
        y1: rect.y1.clamp(0, i64::from(canvas.height)),
    }
}

fn fill_rect(canvas: &mut Bitmap, rect: PixelRect, color: [u8; 3], alpha: f32) {
    let rect = clip(canvas, rect);
    if rect.is_empty() {
        return;
    }
    let width = canvas.width as usize;
    for y in rect.y0..rect.y1 {
        let row_start = (y as usize) * width * 4;
        for x in rect.x0..rect.x1 {
            let idx = row_start + (x as usize) * 4;
            blend_pixel(&mut canvas.pixels[idx..idx + 4], color, alpha);
        }
    }
}

fn stroke_rect(canvas: &mut Bitmap, rect: PixelRect, color: [u8; 3], thickness: i64) {
    if rect.is_empty() {
        return;
    }
    let t = thickness.max(1);
    let edges = [
        PixelRect { y1: rect.y0 + t, ..rect },
        PixelRect { y0: rect.y1 - t, ..rect },
        PixelRect { x1: rect.x0 + t, ..rect },
        PixelRect { x0: rect.x1 - t, ..rect },
    ];
    for edge in edges {
        fill_rect(canvas, edge, color, 1.0);
    }
}

fn blend_pixel(pixel: &mut [u8], color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let inv = 1.0 - alpha;
    for (channel, value) in pixel.iter_mut().zip(color) {
        *channel = ((*channel as f32 * inv) + (value as f32 * alpha))
            .round()
            .clamp(0.0, 255.0) as u8;
    }
}
