//! Scene store: the ordered collection of committed objects plus transient ink.

use crate::shapes::{DrawableObject, Image, Shape, ShapeStyle};
use kurbo::Point;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Scene store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("no stroke in progress for origin {0}")]
    UnknownStroke(Origin),
}

/// Logical source of an incremental stroke.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// This endpoint.
    Local,
    /// A remote peer, by its transport identifier.
    Remote(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => f.write_str("local"),
            Origin::Remote(id) => write!(f, "remote:{id}"),
        }
    }
}

/// Which part of an image a point landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitZone {
    /// Near the bottom-right corner.
    ResizeHandle,
    /// Anywhere else inside the bounding box.
    Body,
}

/// Result of [`Scene::select_image_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHit {
    /// Index of the image in the committed sequence.
    pub index: usize,
    pub zone: HitZone,
}

/// Pen position of a stroke in progress.
///
/// Ink is never retained, so only the last sample is kept; a stroke of any
/// length costs the same.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeCursor {
    pub style: ShapeStyle,
    last: Point,
    samples: usize,
}

impl StrokeCursor {
    fn new(start: Point, style: ShapeStyle) -> Self {
        Self {
            style,
            last: start,
            samples: 1,
        }
    }

    /// Where the next segment starts.
    pub fn last_point(&self) -> Point {
        self.last
    }

    /// Samples seen since the stroke began.
    pub fn samples(&self) -> usize {
        self.samples
    }
}

/// Lazy, restartable iterator over the committed objects in z-order.
#[derive(Debug, Clone)]
pub struct Snapshot<'a> {
    inner: std::slice::Iter<'a, DrawableObject>,
}

impl<'a> Iterator for Snapshot<'a> {
    type Item = &'a DrawableObject;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Snapshot<'_> {}

/// The shared scene.
///
/// Committed objects are append-only; the only removal is [`Scene::clear`].
/// Transient strokes are tracked per origin and never enter the committed
/// sequence.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Committed objects, back to front.
    objects: Vec<DrawableObject>,
    /// In-progress stroke per origin.
    strokes: HashMap<Origin, StrokeCursor>,
    /// Grid overlay preference. Local only.
    grid: bool,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shape to the committed sequence.
    pub fn append_shape(&mut self, shape: Shape) {
        self.objects.push(DrawableObject::Shape(shape));
    }

    /// Append an image to the committed sequence.
    pub fn append_image(&mut self, image: Image) {
        self.objects.push(DrawableObject::Image(image));
    }

    /// Start (or restart) the transient stroke for `origin`.
    pub fn begin_stroke(&mut self, origin: Origin, point: Point, style: ShapeStyle) {
        self.strokes.insert(origin, StrokeCursor::new(point, style));
    }

    /// Extend the transient stroke for `origin`, returning the previous point.
    pub fn extend_stroke(&mut self, origin: &Origin, point: Point) -> Result<Point, SceneError> {
        let stroke = self
            .strokes
            .get_mut(origin)
            .ok_or_else(|| SceneError::UnknownStroke(origin.clone()))?;
        let previous = std::mem::replace(&mut stroke.last, point);
        stroke.samples += 1;
        Ok(previous)
    }

    /// Finish the transient stroke for `origin`. The ink is not retained.
    pub fn end_stroke(&mut self, origin: &Origin) -> Option<StrokeCursor> {
        self.strokes.remove(origin)
    }

    /// Drop every transient stroke coming from a remote origin.
    pub fn end_remote_strokes(&mut self) {
        self.strokes.retain(|origin, _| *origin == Origin::Local);
    }

    /// The in-progress stroke for `origin`, if any.
    pub fn stroke(&self, origin: &Origin) -> Option<&StrokeCursor> {
        self.strokes.get(origin)
    }

    /// Number of strokes currently in progress.
    pub fn active_strokes(&self) -> usize {
        self.strokes.len()
    }

    /// Drop all committed objects and all transient strokes.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.strokes.clear();
    }

    /// Committed objects in order. Transient strokes are not included.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            inner: self.objects.iter(),
        }
    }

    /// Find the topmost image under `point`.
    ///
    /// Images are scanned from the most recently inserted down; for each one
    /// the resize handle is checked before the body, so the handle zone wins
    /// even where it pokes outside the bounding box.
    pub fn select_image_at(&self, point: Point) -> Option<ImageHit> {
        self.objects.iter().enumerate().rev().find_map(|(index, object)| {
            let image = object.as_image()?;
            if image.hits_handle(point) {
                Some(ImageHit {
                    index,
                    zone: HitZone::ResizeHandle,
                })
            } else if image.contains(point) {
                Some(ImageHit {
                    index,
                    zone: HitZone::Body,
                })
            } else {
                None
            }
        })
    }

    /// Get an image by its index in the committed sequence.
    pub fn image(&self, index: usize) -> Option<&Image> {
        self.objects.get(index).and_then(DrawableObject::as_image)
    }

    /// Get a mutable image by its index in the committed sequence.
    pub fn image_mut(&mut self, index: usize) -> Option<&mut Image> {
        self.objects.get_mut(index).and_then(DrawableObject::as_image_mut)
    }

    /// Number of committed objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether there are no committed objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn grid_enabled(&self) -> bool {
        self.grid
    }

    pub fn set_grid(&mut self, enabled: bool) {
        self.grid = enabled;
    }

    /// Flip the grid overlay, returning the new value.
    pub fn toggle_grid(&mut self) -> bool {
        self.grid = !self.grid;
        self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Bitmap, ShapeKind};

    fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Shape {
        Shape::new(
            ShapeKind::Rect,
            Point::new(x1, y1),
            Point::new(x2, y2),
            ShapeStyle::default(),
        )
    }

    fn image_at(x: f64, y: f64, width: f64, height: f64) -> Image {
        Image::new(
            "data:image/png;base64,AA==".to_string(),
            Bitmap::new(2, 1, vec![0; 8]),
            Point::new(x, y),
            width,
            height,
        )
    }

    #[test]
    fn test_append_preserves_order() {
        let mut scene = Scene::new();
        scene.append_shape(rect(0.0, 0.0, 10.0, 10.0));
        scene.append_image(image_at(0.0, 0.0, 10.0, 10.0));
        scene.append_shape(rect(5.0, 5.0, 10.0, 10.0));

        let kinds: Vec<_> = scene.snapshot().map(DrawableObject::kind_name).collect();
        assert_eq!(kinds, vec!["rect", "image", "rect"]);
    }

    #[test]
    fn test_duplicate_commits_are_kept() {
        let mut scene = Scene::new();
        let shape = rect(1.0, 2.0, 3.0, 4.0);
        scene.append_shape(shape);
        scene.append_shape(shape);

        let objects: Vec<_> = scene.snapshot().collect();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0], objects[1]);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut scene = Scene::new();
        scene.append_shape(rect(0.0, 0.0, 1.0, 1.0));
        scene.append_image(image_at(0.0, 0.0, 10.0, 10.0));
        scene.begin_stroke(Origin::Local, Point::ZERO, ShapeStyle::default());

        scene.clear();

        assert_eq!(scene.snapshot().count(), 0);
        assert_eq!(scene.active_strokes(), 0);
    }

    #[test]
    fn test_snapshot_is_restartable() {
        let mut scene = Scene::new();
        scene.append_shape(rect(0.0, 0.0, 1.0, 1.0));
        scene.append_shape(rect(2.0, 2.0, 3.0, 3.0));

        let snapshot = scene.snapshot();
        let first: Vec<_> = snapshot.clone().collect();
        let second: Vec<_> = snapshot.collect();
        assert_eq!(first, second);
        assert_eq!(scene.snapshot().len(), 2);
    }

    #[test]
    fn test_strokes_are_transient_and_per_origin() {
        let mut scene = Scene::new();
        let remote = Origin::Remote("peer-b".to_string());

        scene.begin_stroke(Origin::Local, Point::new(0.0, 0.0), ShapeStyle::default());
        scene.begin_stroke(remote.clone(), Point::new(100.0, 100.0), ShapeStyle::default());

        let previous = scene.extend_stroke(&Origin::Local, Point::new(5.0, 5.0)).unwrap();
        assert_eq!(previous, Point::new(0.0, 0.0));
        let previous = scene.extend_stroke(&remote, Point::new(90.0, 90.0)).unwrap();
        assert_eq!(previous, Point::new(100.0, 100.0));

        assert!(scene.is_empty());
        assert_eq!(scene.active_strokes(), 2);

        scene.end_remote_strokes();
        assert!(scene.stroke(&remote).is_none());
        assert!(scene.stroke(&Origin::Local).is_some());
    }

    #[test]
    fn test_long_stroke_keeps_only_the_cursor() {
        let mut scene = Scene::new();
        let remote = Origin::Remote("peer-b".to_string());
        scene.begin_stroke(remote.clone(), Point::ZERO, ShapeStyle::default());
        for i in 1..=10_000 {
            scene.extend_stroke(&remote, Point::new(i as f64, 0.0)).unwrap();
        }

        let stroke = scene.stroke(&remote).unwrap();
        assert_eq!(stroke.samples(), 10_001);
        assert_eq!(stroke.last_point(), Point::new(10_000.0, 0.0));
    }

    #[test]
    fn test_extend_unknown_stroke_fails() {
        let mut scene = Scene::new();
        let origin = Origin::Remote("ghost".to_string());
        let result = scene.extend_stroke(&origin, Point::new(1.0, 1.0));
        assert_eq!(result, Err(SceneError::UnknownStroke(origin)));
        assert_eq!(scene.active_strokes(), 0);
    }

    #[test]
    fn test_select_image_prefers_topmost() {
        let mut scene = Scene::new();
        scene.append_image(image_at(0.0, 0.0, 100.0, 100.0));
        scene.append_shape(rect(0.0, 0.0, 200.0, 200.0));
        scene.append_image(image_at(50.0, 50.0, 100.0, 100.0));

        let hit = scene.select_image_at(Point::new(60.0, 60.0)).unwrap();
        assert_eq!(hit, ImageHit { index: 2, zone: HitZone::Body });

        let hit = scene.select_image_at(Point::new(10.0, 10.0)).unwrap();
        assert_eq!(hit, ImageHit { index: 0, zone: HitZone::Body });

        assert!(scene.select_image_at(Point::new(300.0, 300.0)).is_none());
    }

    #[test]
    fn test_select_image_detects_resize_handle() {
        let mut scene = Scene::new();
        scene.append_image(image_at(10.0, 10.0, 100.0, 50.0));

        let hit = scene.select_image_at(Point::new(108.0, 58.0)).unwrap();
        assert_eq!(hit.zone, HitZone::ResizeHandle);

        // Just outside the box but within tolerance of the corner
        let hit = scene.select_image_at(Point::new(115.0, 65.0)).unwrap();
        assert_eq!(hit.zone, HitZone::ResizeHandle);
    }

    #[test]
    fn test_grid_toggle() {
        let mut scene = Scene::new();
        assert!(!scene.grid_enabled());
        assert!(scene.toggle_grid());
        assert!(!scene.toggle_grid());
    }
}
