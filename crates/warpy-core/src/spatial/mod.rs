//! Spatial types for physical coordinates.
//!
//! Points and vectors are plain nalgebra types in `f64`. Physical units follow
//! the fixed image (millimetres for slide scans).

pub mod rect;

use nalgebra::{Point as NaPoint, SVector};

pub use rect::Rect;

pub type Point<const D: usize> = NaPoint<f64, D>;
pub type Vector<const D: usize> = SVector<f64, D>;

// Common aliases
pub type Point2 = Point<2>;
pub type Point3 = Point<3>;
pub type Vector2 = Vector<2>;
pub type Vector3 = Vector<3>;

/// True when every coordinate of the point is finite.
pub fn is_finite_point<const D: usize>(p: &Point<D>) -> bool {
    p.coords.iter().all(|c| c.is_finite())
}
