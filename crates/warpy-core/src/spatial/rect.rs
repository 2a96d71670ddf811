//! Axis-aligned rectangles in physical space.

use super::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle given by its minimum and maximum corners.
///
/// Corners are normalised on construction, so `min <= max` holds per axis.
/// A rectangle with zero width or height is valid but degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point2,
    pub max: Point2,
}

impl Rect {
    /// Create a rectangle from two opposite corners in any order.
    pub fn new(a: Point2, b: Point2) -> Self {
        Self {
            min: Point2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Create a rectangle from corner coordinates.
    pub fn from_bounds(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new(Point2::new(x0, y0), Point2::new(x1, y1))
    }

    /// Create a rectangle centred on `center` with the given half extents.
    pub fn from_center(center: Point2, half_width: f64, half_height: f64) -> Self {
        let half = Vector2::new(half_width.abs(), half_height.abs());
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Smallest rectangle containing all points, `None` for an empty input.
    pub fn bounding<'a>(points: impl IntoIterator<Item = &'a Point2>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut rect = Self {
            min: first,
            max: first,
        };
        for p in iter {
            rect.min.x = rect.min.x.min(p.x);
            rect.min.y = rect.min.y.min(p.y);
            rect.max.x = rect.max.x.max(p.x);
            rect.max.y = rect.max.y.max(p.y);
        }
        Some(rect)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point2 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Corners in counter-clockwise order starting at `min`.
    pub fn corners(&self) -> [Point2; 4] {
        [
            self.min,
            Point2::new(self.max.x, self.min.y),
            self.max,
            Point2::new(self.min.x, self.max.y),
        ]
    }

    /// True when the rectangle has no usable area or non-finite bounds.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.min.coords.iter().chain(self.max.coords.iter()).all(|c| c.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: &Point2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Overlap of two rectangles. Disjoint inputs give a zero-area rectangle
    /// located at the gap.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let min = Point2::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y));
        let max = Point2::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y));
        Rect {
            min,
            max: Point2::new(max.x.max(min.x), max.y.max(min.y)),
        }
    }

    /// Smallest rectangle enclosing both inputs.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: Point2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_normalises_corners() {
        let r = Rect::from_bounds(10.0, 5.0, 0.0, -5.0);
        assert_eq!(r.min, Point2::new(0.0, -5.0));
        assert_eq!(r.max, Point2::new(10.0, 5.0));
        assert_eq!(r.width(), 10.0);
        assert_eq!(r.height(), 10.0);
        assert_eq!(r.center(), Point2::new(5.0, 0.0));
    }

    #[test]
    fn test_rect_intersection_and_union() {
        let a = Rect::from_bounds(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_bounds(5.0, 5.0, 20.0, 20.0);
        assert_eq!(a.intersection(&b), Rect::from_bounds(5.0, 5.0, 10.0, 10.0));
        assert_eq!(a.union(&b), Rect::from_bounds(0.0, 0.0, 20.0, 20.0));
    }

    #[test]
    fn test_disjoint_intersection_is_degenerate() {
        let a = Rect::from_bounds(0.0, 0.0, 1.0, 1.0);
        let b = Rect::from_bounds(5.0, 5.0, 6.0, 6.0);
        let i = a.intersection(&b);
        assert!(i.is_degenerate());
        assert_eq!(i.area(), 0.0);
    }

    #[test]
    fn test_point_rect_is_degenerate() {
        let p = Point2::new(3.0, 4.0);
        assert!(Rect::new(p, p).is_degenerate());
        assert!(Rect::from_bounds(0.0, 0.0, f64::NAN, 1.0).is_degenerate());
    }

    #[test]
    fn test_bounding() {
        let pts = [Point2::new(1.0, 5.0), Point2::new(-2.0, 3.0), Point2::new(4.0, -1.0)];
        let r = Rect::bounding(pts.iter()).unwrap();
        assert_eq!(r, Rect::from_bounds(-2.0, -1.0, 4.0, 5.0));
        assert!(Rect::bounding(std::iter::empty()).is_none());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let r = Rect::from_center(Point2::new(0.0, 0.0), 1.0, 2.0);
        assert!(r.contains(&Point2::new(1.0, -2.0)));
        assert!(!r.contains(&Point2::new(1.0001, 0.0)));
    }
}
