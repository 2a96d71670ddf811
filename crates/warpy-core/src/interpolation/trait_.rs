//! Interpolator trait for sampling values at continuous coordinates.

use crate::image::SlideImage;
use crate::spatial::Point2;
use crate::transform::InvertibleTransform;

/// Samples an image between pixel centres.
pub trait Interpolator: Send + Sync {
    /// Sample at a continuous pixel index of `level`. Returns `None` outside
    /// the image.
    fn sample(
        &self,
        image: &dyn SlideImage,
        level: usize,
        timepoint: usize,
        index: &Point2,
    ) -> Option<f32>;

    /// Sample at a physical point.
    fn sample_physical(
        &self,
        image: &dyn SlideImage,
        level: usize,
        timepoint: usize,
        point: &Point2,
    ) -> Option<f32> {
        let to_pixel = image.physical_to_pixel(level)?;
        self.sample(image, level, timepoint, &to_pixel.apply(point))
    }
}
