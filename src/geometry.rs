//! Geometry primitives shared by shapes, painters and the stage.
//!
//! All coordinates are in image space unless stated otherwise. Screen space
//! coordinates only appear at the edge of the stage, where [`ViewTransform`]
//! maps them back into the image.

use serde::{Deserialize, Serialize};

// ============================================================================
// Points and rectangles
// ============================================================================

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point.
    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Translate by an offset.
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned rectangle. Width and height are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left corner X coordinate
    pub x: f32,
    /// Top-left corner Y coordinate
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

    /// Create a rectangle from two opposite corners in any order.
    pub fn from_corners(p1: Point, p2: Point) -> Self {
        let x = p1.x.min(p2.x);
        let y = p1.y.min(p2.y);
        let width = (p1.x - p2.x).abs();
        let height = (p1.y - p2.y).abs();
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing every point, or `None` for an empty set.
    pub fn bounding(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;

        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// The four corners, clockwise from the top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.x + self.width, self.y),
            Point::new(self.x + self.width, self.y + self.height),
            Point::new(self.x, self.y + self.height),
        ]
    }

    /// Check if a point is inside the rectangle (edges included).
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

// ============================================================================
// Image bounds and view transform
// ============================================================================

/// The valid coordinate range of the background image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageBounds {
    pub width: f32,
    pub height: f32,
}

impl ImageBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Whether a point lies inside `[0, width] x [0, height]`.
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x <= self.width && point.y <= self.height
    }

    /// Whether a rectangle lies entirely inside the image.
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        rect.x >= 0.0
            && rect.y >= 0.0
            && rect.x + rect.width <= self.width
            && rect.y + rect.height <= self.height
    }
}

impl Default for ImageBounds {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

/// Uniform scale plus translation applied by the stage when rendering.
///
/// `screen = image * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub offset: Point,
}

impl ViewTransform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: Point::default(),
        }
    }

    /// Map a screen position into image space.
    pub fn to_image(&self, screen: Point) -> Point {
        if self.scale == 0.0 {
            return Point::default();
        }
        Point::new(
            (screen.x - self.offset.x) / self.scale,
            (screen.y - self.offset.y) / self.scale,
        )
    }

    /// Map an image position into screen space.
    pub fn to_screen(&self, image: Point) -> Point {
        Point::new(
            image.x * self.scale + self.offset.x,
            image.y * self.scale + self.offset.y,
        )
    }

    /// Scale by `factor` keeping the screen point `anchor` fixed.
    pub fn zoom_around(&mut self, anchor: Point, factor: f32) {
        self.offset = Point::new(
            self.offset.x + (anchor.x - self.offset.x) * (1.0 - factor),
            self.offset.y + (anchor.y - self.offset.y) * (1.0 - factor),
        );
        self.scale *= factor;
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.offset = self.offset.offset(dx, dy);
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let p1 = Point::new(0.0, 0.0);
        let p2 = Point::new(3.0, 4.0);
        assert!((p1.distance_to(&p2) - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_rect_from_corners_normalizes() {
        let rect = Rect::from_corners(Point::new(10.0, 20.0), Point::new(50.0, 80.0));
        assert_eq!(rect, Rect::new(10.0, 20.0, 40.0, 60.0));

        let reversed = Rect::from_corners(Point::new(50.0, 80.0), Point::new(10.0, 20.0));
        assert_eq!(rect, reversed);

        let mixed = Rect::from_corners(Point::new(50.0, 20.0), Point::new(10.0, 80.0));
        assert_eq!(rect, mixed);
    }

    #[test]
    fn test_rect_corners_clockwise() {
        let corners = Rect::new(10.0, 10.0, 40.0, 30.0).corners();
        assert_eq!(corners[0], Point::new(10.0, 10.0));
        assert_eq!(corners[1], Point::new(50.0, 10.0));
        assert_eq!(corners[2], Point::new(50.0, 40.0));
        assert_eq!(corners[3], Point::new(10.0, 40.0));
    }

    #[test]
    fn test_bounding_rect() {
        let points = [
            Point::new(5.0, 9.0),
            Point::new(-1.0, 3.0),
            Point::new(7.0, 4.0),
        ];
        assert_eq!(Rect::bounding(&points), Some(Rect::new(-1.0, 3.0, 8.0, 6.0)));
        assert_eq!(Rect::bounding(&[]), None);
    }

    #[test]
    fn test_image_bounds() {
        let bounds = ImageBounds::new(100.0, 50.0);
        assert!(bounds.contains(&Point::new(100.0, 50.0)));
        assert!(!bounds.contains(&Point::new(-0.5, 10.0)));
        assert!(bounds.contains_rect(&Rect::new(0.0, 0.0, 100.0, 50.0)));
        assert!(!bounds.contains_rect(&Rect::new(1.0, 0.0, 100.0, 50.0)));
    }

    #[test]
    fn test_view_transform_roundtrip_and_zoom() {
        let mut view = ViewTransform::identity();
        view.zoom_around(Point::new(100.0, 100.0), 0.5);
        // The anchor stays where it was on screen
        let anchor_image = view.to_image(Point::new(100.0, 100.0));
        assert!((anchor_image.x - 100.0).abs() < 0.001);
        assert!((anchor_image.y - 100.0).abs() < 0.001);

        view.pan(10.0, -5.0);
        let p = Point::new(42.0, 17.0);
        let back = view.to_image(view.to_screen(p));
        assert!((back.x - p.x).abs() < 0.001);
        assert!((back.y - p.y).abs() < 0.001);
    }
}
