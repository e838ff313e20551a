//! Drawable object definitions for the shared scene.

mod geometry;
mod image;
mod stroke;

pub use geometry::{Shape, ShapeKind};
pub use image::{Bitmap, Image, ImageFormat, MIN_IMAGE_SIZE, RESIZE_HANDLE_TOLERANCE};
pub use stroke::Stroke;

use kurbo::{BezPath, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a color string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color: {0:?}")]
pub struct ColorParseError(pub String);

/// Serializable color representation (RGBA8).
///
/// On the wire a color travels as a CSS hex string (`#rrggbb`, or
/// `#rrggbbaa` when not fully opaque).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(input: &str) -> Result<Self, ColorParseError> {
        let err = || ColorParseError(input.to_string());
        let hex = input.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.is_ascii() {
            return Err(err());
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| err());

        match hex.len() {
            3 => {
                let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(Self::new(expand(0)?, expand(1)?, expand(2)?, 255))
            }
            6 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => Err(err()),
        }
    }

    /// Format as a lowercase CSS hex string.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl Default for SerializableColor {
    fn default() -> Self {
        Self::black()
    }
}

impl fmt::Display for SerializableColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for SerializableColor {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for SerializableColor {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<SerializableColor> for String {
    fn from(color: SerializableColor) -> Self {
        color.to_hex()
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Stroke properties shared by strokes and shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    /// Stroke color.
    pub stroke_color: SerializableColor,
    /// Stroke width.
    pub stroke_width: f64,
}

impl ShapeStyle {
    pub fn new(stroke_color: SerializableColor, stroke_width: f64) -> Self {
        Self {
            stroke_color,
            stroke_width,
        }
    }

    /// Get the stroke color as a peniko Color.
    pub fn stroke(&self) -> Color {
        self.stroke_color.into()
    }
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: 5.0,
        }
    }
}

/// Common behavior for everything that can be put on the surface.
pub trait Drawable {
    /// Bounding box in surface coordinates.
    fn bounds(&self) -> Rect;

    /// Outline path for rendering.
    fn to_path(&self) -> BezPath;
}

/// Closed set of objects that can be drawn.
///
/// Only `Shape` and `Image` are ever committed to a scene; a `Stroke` is
/// transient ink that lives next to the committed sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawableObject {
    Stroke(Stroke),
    Shape(Shape),
    Image(Image),
}

impl DrawableObject {
    pub fn bounds(&self) -> Rect {
        match self {
            DrawableObject::Stroke(s) => s.bounds(),
            DrawableObject::Shape(s) => s.bounds(),
            DrawableObject::Image(s) => s.bounds(),
        }
    }

    pub fn to_path(&self) -> BezPath {
        match self {
            DrawableObject::Stroke(s) => s.to_path(),
            DrawableObject::Shape(s) => s.to_path(),
            DrawableObject::Image(s) => s.to_path(),
        }
    }

    pub fn as_shape(&self) -> Option<&Shape> {
        match self {
            DrawableObject::Shape(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            DrawableObject::Image(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_image_mut(&mut self) -> Option<&mut Image> {
        match self {
            DrawableObject::Image(s) => Some(s),
            _ => None,
        }
    }

    /// Short lowercase name of the variant, as used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DrawableObject::Stroke(_) => "stroke",
            DrawableObject::Shape(s) => s.kind.as_str(),
            DrawableObject::Image(_) => "image",
        }
    }
}

impl From<Shape> for DrawableObject {
    fn from(shape: Shape) -> Self {
        DrawableObject::Shape(shape)
    }
}

impl From<Image> for DrawableObject {
    fn from(image: Image) -> Self {
        DrawableObject::Image(image)
    }
}
