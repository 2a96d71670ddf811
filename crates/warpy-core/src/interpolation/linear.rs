//! Bilinear interpolation.

use super::trait_::Interpolator;
use crate::image::SlideImage;
use crate::spatial::Point2;

/// Bilinear interpolator.
///
/// Indices within half a pixel of the border are clamped onto the edge
/// pixels, matching the extent reported by [`SlideImage::extent`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl Interpolator for LinearInterpolator {
    fn sample(
        &self,
        image: &dyn SlideImage,
        level: usize,
        timepoint: usize,
        index: &Point2,
    ) -> Option<f32> {
        let [w, h] = image.dimensions(level);
        if w == 0 || h == 0 || !index.x.is_finite() || !index.y.is_finite() {
            return None;
        }
        let (max_x, max_y) = ((w - 1) as f64, (h - 1) as f64);
        if index.x < -0.5 || index.y < -0.5 || index.x > max_x + 0.5 || index.y > max_y + 0.5 {
            return None;
        }
        let x = index.x.clamp(0.0, max_x);
        let y = index.y.clamp(0.0, max_y);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(w - 1);
        let y1 = (y0 + 1).min(h - 1);
        let fx = (x - x0 as f64) as f32;
        let fy = (y - y0 as f64) as f32;

        let v00 = image.pixel(level, timepoint, x0, y0)?;
        let v10 = image.pixel(level, timepoint, x1, y0)?;
        let v01 = image.pixel(level, timepoint, x0, y1)?;
        let v11 = image.pixel(level, timepoint, x1, y1)?;

        let top = v00 + (v10 - v00) * fx;
        let bottom = v01 + (v11 - v01) * fx;
        Some(top + (bottom - top) * fy)
    }
}
