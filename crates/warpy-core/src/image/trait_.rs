//! Image access contract consumed by registration.

use crate::spatial::{Point2, Rect};
use crate::transform::{AffineTransform2D, InvertibleTransform};

/// A multi-resolution 2D image placed in physical space.
///
/// # Coordinate Systems
/// * **Index Space**: pixel centres sit on integer coordinates
/// * **Physical Space**: continuous coordinates in millimetres
///
/// Level 0 is the finest resolution; higher levels are coarser.
pub trait SlideImage: Send + Sync {
    /// Number of resolution levels.
    fn num_levels(&self) -> usize;

    /// Number of timepoints.
    fn num_timepoints(&self) -> usize {
        1
    }

    /// `[width, height]` in pixels at `level`.
    fn dimensions(&self, level: usize) -> [usize; 2];

    /// Pixel value, `None` outside the image or for an unknown level/timepoint.
    fn pixel(&self, level: usize, timepoint: usize, x: usize, y: usize) -> Option<f32>;

    /// Mapping from pixel indices at `level` to physical xy coordinates.
    fn pixel_to_physical(&self, level: usize) -> AffineTransform2D;

    /// Physical z position of the slide plane.
    fn z_origin(&self) -> f64 {
        0.0
    }

    /// Mapping from physical xy coordinates to pixel indices at `level`.
    fn physical_to_pixel(&self, level: usize) -> Option<AffineTransform2D> {
        self.pixel_to_physical(level).try_inverse().ok()
    }

    /// Physical size of one pixel at `level` (geometric mean of both axes).
    fn pixel_size(&self, level: usize) -> f64 {
        let m = *self.pixel_to_physical(level).matrix();
        (m.column(0).norm() * m.column(1).norm()).sqrt()
    }

    /// Physical area covered by the level-0 pixels.
    fn extent(&self) -> Rect {
        let [w, h] = self.dimensions(0);
        let to_physical = self.pixel_to_physical(0);
        let corners = Rect::from_bounds(-0.5, -0.5, w as f64 - 0.5, h as f64 - 0.5).corners();
        let mapped: Vec<Point2> = corners.iter().map(|c| to_physical.apply(c)).collect();
        Rect::bounding(mapped.iter())
            .unwrap_or_else(|| Rect::new(Point2::origin(), Point2::origin()))
    }

    /// Coarsest level whose pixels are no larger than `pixel_size`.
    fn level_for_pixel_size(&self, pixel_size: f64) -> usize {
        (0..self.num_levels())
            .rev()
            .find(|&level| self.pixel_size(level) <= pixel_size * (1.0 + 1e-9))
            .unwrap_or(0)
    }
}
