//! Editor context: tool selection, pen settings and the pointer gesture in
//! progress. Turns raw pointer input into engine operations.

use crate::config::Config;
use crate::engine::SyncEngine;
use crate::render::RenderSurface;
use crate::scene::HitZone;
use crate::shapes::{SerializableColor, Shape, ShapeKind, ShapeStyle};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pencil,
    Eraser,
    Line,
    Rect,
    Circle,
    Triangle,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Pencil,
        Tool::Eraser,
        Tool::Line,
        Tool::Rect,
        Tool::Circle,
        Tool::Triangle,
    ];

    /// The shape this tool commits, if it is a shape tool.
    pub fn shape_kind(self) -> Option<ShapeKind> {
        match self {
            Tool::Pencil | Tool::Eraser => None,
            Tool::Line => Some(ShapeKind::Line),
            Tool::Rect => Some(ShapeKind::Rect),
            Tool::Circle => Some(ShapeKind::Circle),
            Tool::Triangle => Some(ShapeKind::Triangle),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tool::Pencil => "pencil",
            Tool::Eraser => "eraser",
            Tool::Line => "line",
            Tool::Rect => "rect",
            Tool::Circle => "circle",
            Tool::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned for an unrecognized tool name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl FromStr for Tool {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Tool::ALL
            .into_iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }
}

/// Pointer gesture in progress. Drag and resize are mutually exclusive per
/// pointer-down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    /// Freehand or shape drawing from `start`.
    Drawing { start: Point },
    /// Moving image `index`, keeping the grab offset.
    Dragging { index: usize, offset: Vec2 },
    /// Resizing image `index` from its bottom-right corner.
    Resizing { index: usize },
}

/// Per-client editing state.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorContext {
    pub tool: Tool,
    pub color: SerializableColor,
    pub size: f64,
    gesture: Gesture,
}

impl Default for EditorContext {
    fn default() -> Self {
        Self {
            tool: Tool::default(),
            color: SerializableColor::black(),
            size: 5.0,
            gesture: Gesture::Idle,
        }
    }
}

impl EditorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            color: config.default_color,
            size: config.default_size,
            ..Self::default()
        }
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    /// Style for freehand ink. The eraser paints white at twice the size.
    pub fn stroke_style(&self) -> ShapeStyle {
        match self.tool {
            Tool::Eraser => ShapeStyle::new(SerializableColor::white(), self.size * 2.0),
            _ => ShapeStyle::new(self.color, self.size),
        }
    }

    /// Style for committed shapes.
    pub fn shape_style(&self) -> ShapeStyle {
        ShapeStyle::new(self.color, self.size)
    }

    pub fn pointer_down<S: RenderSurface>(&mut self, point: Point, engine: &mut SyncEngine<S>) {
        if let Some(hit) = engine.image_at(point) {
            self.gesture = match hit.zone {
                HitZone::ResizeHandle => Gesture::Resizing { index: hit.index },
                HitZone::Body => {
                    let origin = engine.scene().image(hit.index).map(|img| img.position).unwrap_or(point);
                    Gesture::Dragging {
                        index: hit.index,
                        offset: point - origin,
                    }
                }
            };
            engine.set_selected_image(Some(hit.index));
            return;
        }

        self.gesture = Gesture::Drawing { start: point };
        if self.tool.shape_kind().is_none() {
            engine.begin_local_stroke(point, self.stroke_style());
        }
    }

    /// Continue the gesture. A drag or resize is abandoned once its image is
    /// no longer selected, e.g. after the peer cleared the scene.
    pub fn pointer_move<S: RenderSurface>(&mut self, point: Point, modifiers: Modifiers, engine: &mut SyncEngine<S>) {
        if let Gesture::Dragging { index, .. } | Gesture::Resizing { index } = self.gesture {
            if engine.selected_image() != Some(index) {
                log::debug!("Image {} no longer selected; dropping gesture", index);
                self.gesture = Gesture::Idle;
                return;
            }
        }
        match self.gesture {
            Gesture::Idle => {}
            Gesture::Dragging { index, offset } => engine.move_image(index, point - offset),
            Gesture::Resizing { index } => {
                let Some(origin) = engine.scene().image(index).map(|img| img.position) else {
                    return;
                };
                engine.resize_image(index, point.x - origin.x, point.y - origin.y, modifiers.shift);
            }
            Gesture::Drawing { start } => match self.tool.shape_kind() {
                Some(kind) => {
                    let preview = Shape::new(kind, start, point, self.shape_style());
                    engine.render_preview(&preview);
                }
                None => engine.extend_local_stroke(point, self.stroke_style()),
            },
        }
    }

    /// Finish the gesture. A shape tool commits the shape ending at `point`.
    pub fn pointer_up<S: RenderSurface>(&mut self, point: Point, engine: &mut SyncEngine<S>) {
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => {}
            Gesture::Dragging { .. } | Gesture::Resizing { .. } => engine.set_selected_image(None),
            Gesture::Drawing { start } => match self.tool.shape_kind() {
                Some(kind) => engine.commit_shape(Shape::new(kind, start, point, self.shape_style())),
                None => engine.end_local_stroke(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Action;
    use crate::decode::InlineDecoder;
    use crate::decode::test_support::png_bytes;
    use crate::render::{DisplayList, DrawCommand};
    use crate::scene::Origin;

    fn engine() -> SyncEngine<DisplayList> {
        SyncEngine::with_decoder(DisplayList::default(), Box::new(InlineDecoder::new()))
    }

    fn engine_with_image(width: u32, height: u32) -> SyncEngine<DisplayList> {
        let mut engine = engine();
        engine.insert_image_bytes(&png_bytes(width, height)).unwrap();
        engine.poll_decodes();
        engine
    }

    #[test]
    fn test_tool_parsing() {
        assert_eq!("Rect".parse::<Tool>(), Ok(Tool::Rect));
        assert_eq!(" eraser ".parse::<Tool>(), Ok(Tool::Eraser));
        assert!("lasso".parse::<Tool>().is_err());
        assert_eq!(Tool::Circle.shape_kind(), Some(ShapeKind::Circle));
        assert_eq!(Tool::Pencil.shape_kind(), None);
    }

    #[test]
    fn test_eraser_style() {
        let mut editor = EditorContext::new();
        editor.color = SerializableColor::new(255, 0, 0, 255);
        editor.size = 4.0;
        editor.tool = Tool::Eraser;
        assert_eq!(editor.stroke_style(), ShapeStyle::new(SerializableColor::white(), 8.0));
        assert_eq!(editor.shape_style().stroke_width, 4.0);
    }

    #[test]
    fn test_shape_gesture_previews_then_commits() {
        let mut engine = engine();
        let mut editor = EditorContext::new();
        editor.tool = Tool::Circle;

        editor.pointer_down(Point::new(0.0, 0.0), &mut engine);
        editor.pointer_move(Point::new(10.0, 10.0), Modifiers::default(), &mut engine);
        assert!(engine.scene().is_empty());
        assert_eq!(engine.surface().path_count(), 1);

        editor.pointer_up(Point::new(30.0, 40.0), &mut engine);
        let shape = engine.scene().snapshot().next().and_then(|o| o.as_shape().copied()).unwrap();
        assert_eq!(shape.kind, ShapeKind::Circle);
        assert_eq!(shape.radius(), 50.0);
        assert_eq!(editor.gesture(), Gesture::Idle);
    }

    #[test]
    fn test_pencil_gesture_is_transient() {
        let mut engine = engine();
        let mut editor = EditorContext::new();

        editor.pointer_down(Point::new(0.0, 0.0), &mut engine);
        editor.pointer_move(Point::new(5.0, 0.0), Modifiers::default(), &mut engine);
        assert!(engine.scene().stroke(&Origin::Local).is_some());

        editor.pointer_up(Point::new(5.0, 0.0), &mut engine);
        assert!(engine.scene().is_empty());
        assert!(engine.scene().stroke(&Origin::Local).is_none());
    }

    #[test]
    fn test_drag_keeps_grab_offset() {
        let mut engine = engine_with_image(100, 100);
        let mut editor = EditorContext::new();

        editor.pointer_down(Point::new(60.0, 70.0), &mut engine);
        assert!(matches!(editor.gesture(), Gesture::Dragging { index: 0, .. }));
        assert_eq!(engine.selected_image(), Some(0));

        editor.pointer_move(Point::new(110.0, 120.0), Modifiers::default(), &mut engine);
        assert_eq!(engine.scene().image(0).unwrap().position, Point::new(100.0, 100.0));

        editor.pointer_up(Point::new(110.0, 120.0), &mut engine);
        assert_eq!(engine.selected_image(), None);
        assert_eq!(engine.scene().active_strokes(), 0);
    }

    #[test]
    fn test_drag_abandoned_after_remote_clear() {
        let mut engine = engine_with_image(100, 100);
        let mut editor = EditorContext::new();
        editor.pointer_down(Point::new(60.0, 70.0), &mut engine);

        engine.apply_remote(Action::ClearScene);
        engine.insert_image_bytes(&png_bytes(40, 40)).unwrap();
        engine.poll_decodes();

        editor.pointer_move(Point::new(300.0, 300.0), Modifiers::default(), &mut engine);
        assert_eq!(editor.gesture(), Gesture::Idle);
        assert_eq!(engine.scene().image(0).unwrap().position, Point::new(50.0, 50.0));
    }

    #[test]
    fn test_resize_from_handle() {
        // 200x100 at (50,50): handle at (250,150)
        let mut engine = engine_with_image(200, 100);
        let mut editor = EditorContext::new();

        editor.pointer_down(Point::new(245.0, 148.0), &mut engine);
        assert_eq!(editor.gesture(), Gesture::Resizing { index: 0 });
        assert!(matches!(
            engine.surface().commands().last(),
            Some(DrawCommand::FillRect { .. })
        ));

        editor.pointer_move(Point::new(130.0, 400.0), Modifiers::shift(), &mut engine);
        let image = engine.scene().image(0).unwrap();
        assert_eq!((image.width, image.height), (80.0, 40.0));

        editor.pointer_move(Point::new(55.0, 55.0), Modifiers::default(), &mut engine);
        let image = engine.scene().image(0).unwrap();
        assert_eq!((image.width, image.height), (20.0, 20.0));
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            default_color: SerializableColor::new(1, 2, 3, 255),
            default_size: 9.0,
            ..Config::default()
        };
        let editor = EditorContext::from_config(&config);
        assert_eq!(editor.color, SerializableColor::new(1, 2, 3, 255));
        assert_eq!(editor.size, 9.0);
        assert_eq!(editor.tool, Tool::Pencil);
    }
}
