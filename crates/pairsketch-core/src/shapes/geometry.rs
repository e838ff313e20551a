//! Geometric shapes committed from a two-point gesture.

use super::{Drawable, ShapeStyle};
use kurbo::{BezPath, Circle, Line, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flattening tolerance used when converting curves to paths.
const PATH_TOLERANCE: f64 = 0.1;

/// Kind tag of a retained shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Line,
    Rect,
    Circle,
    Triangle,
}

impl ShapeKind {
    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeKind::Line => "line",
            ShapeKind::Rect => "rect",
            ShapeKind::Circle => "circle",
            ShapeKind::Triangle => "triangle",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retained shape, fully determined by its kind and two anchor points.
///
/// * `Line`: from `start` to `end`.
/// * `Rect`: `start` and `end` are opposite corners.
/// * `Circle`: `start` is the center, `end` lies on the circumference.
/// * `Triangle`: isosceles, with vertices `start`, `end` and the mirror of
///   `end` across the vertical through `start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub start: Point,
    pub end: Point,
    pub style: ShapeStyle,
}

impl Shape {
    pub fn new(kind: ShapeKind, start: Point, end: Point, style: ShapeStyle) -> Self {
        Self {
            kind,
            start,
            end,
            style,
        }
    }

    /// Circle radius: the Euclidean distance between the two anchors.
    pub fn radius(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// The three triangle vertices, apex mirrored at `(2*x1 - x2, y2)`.
    pub fn triangle_vertices(&self) -> [Point; 3] {
        let mirrored = Point::new(2.0 * self.start.x - self.end.x, self.end.y);
        [self.start, self.end, mirrored]
    }
}

impl Drawable for Shape {
    fn bounds(&self) -> Rect {
        match self.kind {
            ShapeKind::Line | ShapeKind::Rect => Rect::from_points(self.start, self.end),
            ShapeKind::Circle => Circle::new(self.start, self.radius()).bounding_box(),
            ShapeKind::Triangle => {
                let [a, b, c] = self.triangle_vertices();
                Rect::from_points(a, b).union_pt(c)
            }
        }
    }

    fn to_path(&self) -> BezPath {
        match self.kind {
            ShapeKind::Line => Line::new(self.start, self.end).to_path(PATH_TOLERANCE),
            ShapeKind::Rect => Rect::from_points(self.start, self.end).to_path(PATH_TOLERANCE),
            ShapeKind::Circle => Circle::new(self.start, self.radius()).to_path(PATH_TOLERANCE),
            ShapeKind::Triangle => {
                let [a, b, c] = self.triangle_vertices();
                let mut path = BezPath::new();
                path.move_to(a);
                path.line_to(b);
                path.line_to(c);
                path.close_path();
                path
            }
        }
    }
}
