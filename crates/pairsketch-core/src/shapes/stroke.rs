//! Freehand ink stroke.

use super::{Drawable, ShapeStyle};
use kurbo::{BezPath, Point, Rect};

/// A freehand path built one sample at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    /// Points in the path, oldest first.
    pub points: Vec<Point>,
    /// Style properties.
    pub style: ShapeStyle,
}

impl Stroke {
    /// Start a stroke at `start`.
    pub fn new(start: Point, style: ShapeStyle) -> Self {
        Self {
            points: vec![start],
            style,
        }
    }

    /// Add a point to the path.
    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    /// The most recent point, i.e. where the next segment starts.
    pub fn last_point(&self) -> Option<Point> {
        self.points.last().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Drawable for Stroke {
    fn bounds(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::ZERO;
        };
        self.points
            .iter()
            .skip(1)
            .fold(Rect::from_points(*first, *first), |rect, p| rect.union_pt(*p))
    }

    fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut points = self.points.iter();
        if let Some(first) = points.next() {
            path.move_to(*first);
            for point in points {
                path.line_to(*point);
            }
        }
        path
    }
}
