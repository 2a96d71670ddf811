//! Transform trait for spatial coordinate transformations.

use crate::spatial::Point;

/// Invertible point mapping between two physical spaces.
///
/// Implemented by every transform the registration produces. `apply` maps a
/// point forward; `apply_inverse` maps it back. Inverses may be exact (affine)
/// or iterative (thin-plate spline), so round trips hold within a tolerance.
///
/// # Type Parameters
/// * `D` - The spatial dimensionality (2 or 3)
pub trait InvertibleTransform<const D: usize> {
    /// Map a point forward.
    fn apply(&self, p: &Point<D>) -> Point<D>;

    /// Map a point backward.
    fn apply_inverse(&self, p: &Point<D>) -> Point<D>;

    /// Apply forward to a batch of points.
    fn apply_all(&self, points: &[Point<D>]) -> Vec<Point<D>> {
        points.iter().map(|p| self.apply(p)).collect()
    }
}
