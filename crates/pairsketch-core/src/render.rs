//! Render adapter.
//!
//! The engine never paints pixels itself. It drives a [`RenderSurface`],
//! which a frontend implements on top of whatever backend it uses.
//! [`DisplayList`] is a recording surface used by the terminal client and
//! by tests.

use crate::scene::Scene;
use crate::shapes::{Drawable, DrawableObject, Image, SerializableColor, Shape, ShapeStyle};
use kurbo::{BezPath, Line, Point, Rect, Shape as KurboShape, Size};
use peniko::Color;

/// Grid spacing in surface units.
pub const GRID_SIZE: f64 = 20.0;

/// Grid line width.
pub const GRID_LINE_WIDTH: f64 = 1.0;

/// Side length of the selected-image handle marker.
pub const HANDLE_MARKER_SIZE: f64 = 15.0;

/// How far the handle marker reaches back into the image from its corner.
const HANDLE_MARKER_INSET: f64 = 10.0;

fn grid_color() -> Color {
    Color::from_rgba8(0xe0, 0xe0, 0xe0, 255)
}

fn handle_color() -> Color {
    Color::from_rgba8(255, 0, 0, 255)
}

/// A drawing target.
///
/// All coordinates are surface units; strokes use round caps and joins.
pub trait RenderSurface {
    /// Visible extent of the surface.
    fn size(&self) -> Size;

    /// Wipe everything and fill with `background`.
    fn clear(&mut self, background: Color);

    /// Stroke an outline.
    fn stroke_path(&mut self, path: &BezPath, color: Color, width: f64);

    /// Fill an axis-aligned rectangle.
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Blit an image's bitmap into its display rectangle.
    fn draw_image(&mut self, image: &Image);
}

/// Full re-render: white background, optional grid, then every committed
/// object in order. The selected image gets its handle marker drawn right
/// after it, so later objects still cover it.
///
/// Transient freehand ink is not redrawn.
pub fn render_scene<S: RenderSurface + ?Sized>(surface: &mut S, scene: &Scene, selected: Option<usize>) {
    surface.clear(SerializableColor::white().into());

    if scene.grid_enabled() {
        render_grid(surface);
    }

    for (index, object) in scene.snapshot().enumerate() {
        match object {
            DrawableObject::Shape(shape) => render_shape(surface, shape),
            DrawableObject::Image(image) => {
                surface.draw_image(image);
                if selected == Some(index) {
                    render_handle_marker(surface, image);
                }
            }
            DrawableObject::Stroke(stroke) => {
                surface.stroke_path(&stroke.to_path(), stroke.style.stroke(), stroke.style.stroke_width)
            }
        }
    }
}

/// Draw grid lines every [`GRID_SIZE`] units across the whole surface.
pub fn render_grid<S: RenderSurface + ?Sized>(surface: &mut S) {
    let size = surface.size();
    let color = grid_color();

    let mut x = 0.0;
    while x <= size.width {
        let line = Line::new((x, 0.0), (x, size.height));
        surface.stroke_path(&line.to_path(0.1), color, GRID_LINE_WIDTH);
        x += GRID_SIZE;
    }

    let mut y = 0.0;
    while y <= size.height {
        let line = Line::new((0.0, y), (size.width, y));
        surface.stroke_path(&line.to_path(0.1), color, GRID_LINE_WIDTH);
        y += GRID_SIZE;
    }
}

/// Stroke a single shape outline in its own style.
pub fn render_shape<S: RenderSurface + ?Sized>(surface: &mut S, shape: &Shape) {
    surface.stroke_path(&shape.to_path(), shape.style.stroke(), shape.style.stroke_width);
}

/// Incremental freehand ink: one segment from `from` to `to`.
pub fn render_segment<S: RenderSurface + ?Sized>(surface: &mut S, from: Point, to: Point, style: &ShapeStyle) {
    let line = Line::new(from, to);
    surface.stroke_path(&line.to_path(0.1), style.stroke(), style.stroke_width);
}

fn render_handle_marker<S: RenderSurface + ?Sized>(surface: &mut S, image: &Image) {
    let corner = image.handle_position();
    let origin = Point::new(corner.x - HANDLE_MARKER_INSET, corner.y - HANDLE_MARKER_INSET);
    let marker = Rect::from_origin_size(origin, (HANDLE_MARKER_SIZE, HANDLE_MARKER_SIZE));
    surface.fill_rect(marker, handle_color());
}

/// A recorded drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear {
        background: SerializableColor,
    },
    Path {
        path: BezPath,
        color: SerializableColor,
        width: f64,
    },
    FillRect {
        rect: Rect,
        color: SerializableColor,
    },
    Image {
        rect: Rect,
        pixel_size: (u32, u32),
    },
}

/// Recording surface.
///
/// `clear` discards everything recorded so far, so the list always holds
/// exactly what is visible.
#[derive(Debug, Clone)]
pub struct DisplayList {
    size: Size,
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of stroked paths currently visible.
    pub fn path_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Path { .. }))
            .count()
    }
}

impl Default for DisplayList {
    fn default() -> Self {
        Self::new(Size::new(1280.0, 800.0))
    }
}

impl RenderSurface for DisplayList {
    fn size(&self) -> Size {
        self.size
    }

    fn clear(&mut self, background: Color) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear {
            background: background.into(),
        });
    }

    fn stroke_path(&mut self, path: &BezPath, color: Color, width: f64) {
        self.commands.push(DrawCommand::Path {
            path: path.clone(),
            color: color.into(),
            width,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.commands.push(DrawCommand::FillRect {
            rect,
            color: color.into(),
        });
    }

    fn draw_image(&mut self, image: &Image) {
        self.commands.push(DrawCommand::Image {
            rect: image.as_rect(),
            pixel_size: (image.bitmap.width, image.bitmap.height),
        });
    }
}
