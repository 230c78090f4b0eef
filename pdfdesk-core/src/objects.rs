//! User-placed page content: text boxes, images and vector shapes.
//!
//! Coordinates are page-space units (PDF points) with the origin at the top-left corner of
//! the unrotated page.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rejects rectangles that would be invisible or inverted.
    pub fn validate(&self) -> Result<(), ModelError> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return Err(ModelError::InvalidGeometry {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub content: String,
    pub font: String,
    pub size: f32,
    pub color: Color,
    #[serde(default)]
    pub style: TextStyle,
}

impl TextPayload {
    pub const MIN_SIZE: f32 = 8.0;
    pub const MAX_SIZE: f32 = 72.0;

    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            font: "Helvetica".to_string(),
            size: 12.0,
            color: Color::BLACK,
            style: TextStyle::default(),
        }
    }
}

/// Points at decoded pixels held outside the document model (a file on disk or a resource
/// registered with the shell); the collection never owns image bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    pub key: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub source: ImageSource,
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePayload {
    pub kind: ShapeKind,
    pub stroke: Color,
    pub stroke_width: f32,
    pub fill: Option<Color>,
    /// Geometry relative to the object's bounding rectangle origin.
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectPayload {
    Text(TextPayload),
    Image(ImagePayload),
    Shape(ShapePayload),
}

impl ObjectPayload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjectPayload::Text(_) => "text",
            ObjectPayload::Image(_) => "image",
            ObjectPayload::Shape(_) => "shape",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableObject {
    pub id: ObjectId,
    pub page_index: usize,
    pub bounds: Rect,
    /// Only meaningful relative to other objects on the same page.
    pub z_order: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
    pub payload: ObjectPayload,
}

/// An object as requested by the user, before the collection assigns its id and z-order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDraft {
    pub page_index: usize,
    pub bounds: Rect,
    pub payload: ObjectPayload,
}

impl ObjectDraft {
    pub fn text(page_index: usize, bounds: Rect, text: TextPayload) -> Self {
        Self {
            page_index,
            bounds,
            payload: ObjectPayload::Text(text),
        }
    }

    pub fn image(page_index: usize, bounds: Rect, image: ImagePayload) -> Self {
        Self {
            page_index,
            bounds,
            payload: ObjectPayload::Image(image),
        }
    }

    pub fn shape(page_index: usize, bounds: Rect, shape: ShapePayload) -> Self {
        Self {
            page_index,
            bounds,
            payload: ObjectPayload::Shape(shape),
        }
    }
}

/// A single editable attribute together with its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    TextContent(String),
    Font(String),
    FontSize(f32),
    TextColor(Color),
    TextStyle(TextStyle),
    ImageScale(f32),
    StrokeColor(Color),
    StrokeWidth(f32),
    Fill(Option<Color>),
}

impl Property {
    pub fn name(&self) -> &'static str {
        match self {
            Property::TextContent(_) => "text_content",
            Property::Font(_) => "font",
            Property::FontSize(_) => "font_size",
            Property::TextColor(_) => "text_color",
            Property::TextStyle(_) => "text_style",
            Property::ImageScale(_) => "image_scale",
            Property::StrokeColor(_) => "stroke_color",
            Property::StrokeWidth(_) => "stroke_width",
            Property::Fill(_) => "fill",
        }
    }

    /// Writes the value into `payload` and returns the value it replaced.
    pub(crate) fn apply_to(self, payload: &mut ObjectPayload) -> Result<Property, ModelError> {
        let mismatch = ModelError::PropertyMismatch {
            property: self.name(),
            kind: payload.kind_name(),
        };
        let previous = match (self, payload) {
            (Property::TextContent(value), ObjectPayload::Text(text)) => {
                Property::TextContent(std::mem::replace(&mut text.content, value))
            }
            (Property::Font(value), ObjectPayload::Text(text)) => {
                Property::Font(std::mem::replace(&mut text.font, value))
            }
            (Property::FontSize(value), ObjectPayload::Text(text)) => {
                let clamped = value.clamp(TextPayload::MIN_SIZE, TextPayload::MAX_SIZE);
                Property::FontSize(std::mem::replace(&mut text.size, clamped))
            }
            (Property::TextColor(value), ObjectPayload::Text(text)) => {
                Property::TextColor(std::mem::replace(&mut text.color, value))
            }
            (Property::TextStyle(value), ObjectPayload::Text(text)) => {
                Property::TextStyle(std::mem::replace(&mut text.style, value))
            }
            (Property::ImageScale(value), ObjectPayload::Image(image)) => {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ModelError::InvalidGeometry {
                        width: value,
                        height: value,
                    });
                }
                Property::ImageScale(std::mem::replace(&mut image.scale, value))
            }
            (Property::StrokeColor(value), ObjectPayload::Shape(shape)) => {
                Property::StrokeColor(std::mem::replace(&mut shape.stroke, value))
            }
            (Property::StrokeWidth(value), ObjectPayload::Shape(shape)) => {
                Property::StrokeWidth(std::mem::replace(&mut shape.stroke_width, value.max(0.0)))
            }
            (Property::Fill(value), ObjectPayload::Shape(shape)) => {
                Property::Fill(std::mem::replace(&mut shape.fill, value))
            }
            _ => return Err(mismatch),
        };
        Ok(previous)
    }
}
