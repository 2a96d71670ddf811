//! Block registration contract.
//!
//! A block registrator aligns a small field of view of the moving slide with
//! the same field of view of the fixed slide. The numerical method behind it
//! is opaque to the multi-scale engine.

use serde::{Deserialize, Serialize};
use warpy_core::image::SlideImage;
use warpy_core::transform::AffineTransform2D;
use warpy_core::{Point2, Rect};

/// Axis-aligned field of view in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub center: Point2,
    pub half_width: f64,
    pub half_height: f64,
}

impl Block {
    pub fn new(center: Point2, half_width: f64, half_height: f64) -> Self {
        Self {
            center,
            half_width,
            half_height,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_center(self.center, self.half_width, self.half_height)
    }

    /// The same field of view moved to `center`.
    pub fn recentered(&self, center: Point2) -> Block {
        Block { center, ..*self }
    }
}

/// Everything a registrator needs to align one block.
#[derive(Clone, Copy)]
pub struct BlockRequest<'a> {
    pub fixed: &'a dyn SlideImage,
    pub moving: &'a dyn SlideImage,
    /// Field of view in the fixed frame.
    pub block: Block,
    /// Predicted position of `block.center` in the moving frame.
    pub moving_center: Point2,
    /// Physical size of the pixels the block should be sampled at.
    pub pixel_size: f64,
    pub max_iterations: usize,
    pub timepoint: usize,
    /// Emit diagnostics for this block. Never set during parallel runs.
    pub show_details: bool,
}

impl BlockRequest<'_> {
    /// The moving-frame field of view.
    pub fn moving_block(&self) -> Block {
        self.block.recentered(self.moving_center)
    }
}

/// Registers a single block.
///
/// The returned affine maps moving-block-local coordinates (relative to
/// `moving_center`) to fixed-block-local coordinates (relative to
/// `block.center`), in physical units. The identity means the seed was
/// already correct. `None` reports a failed registration; the caller then
/// assumes no additional displacement for this block.
pub trait BlockRegistrator: Send + Sync {
    fn register_block(&self, request: &BlockRequest<'_>) -> Option<AffineTransform2D>;
}

impl<F> BlockRegistrator for F
where
    F: Fn(&BlockRequest<'_>) -> Option<AffineTransform2D> + Send + Sync,
{
    fn register_block(&self, request: &BlockRequest<'_>) -> Option<AffineTransform2D> {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_rect() {
        let block = Block::new(Point2::new(10.0, 20.0), 5.0, 2.5);
        assert_eq!(block.rect(), Rect::from_bounds(5.0, 17.5, 15.0, 22.5));
        let moved = block.recentered(Point2::new(0.0, 0.0));
        assert_eq!(moved.half_width, 5.0);
        assert_eq!(moved.center, Point2::new(0.0, 0.0));
    }
}
