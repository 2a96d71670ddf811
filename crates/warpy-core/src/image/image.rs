//! In-memory single-level image.

use super::trait_::SlideImage;
use crate::spatial::{Point2, Vector2};
use crate::transform::AffineTransform2D;

/// Grayscale image with origin and spacing.
///
/// `origin` is the physical position of the centre of pixel (0, 0). Data is
/// row-major, `width * height` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Image2D {
    width: usize,
    height: usize,
    data: Vec<f32>,
    origin: Point2,
    spacing: Vector2,
    z: f64,
}

impl Image2D {
    /// Create a new image.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        origin: Point2,
        spacing: Vector2,
    ) -> Self {
        assert!(data.len() == width * height, "Pixel buffer length must match dimensions");
        Self {
            width,
            height,
            data,
            origin,
            spacing,
            z: 0.0,
        }
    }

    /// Build an image by evaluating `f(x, y)` at every pixel index.
    pub fn from_fn<F>(width: usize, height: usize, origin: Point2, spacing: Vector2, f: F) -> Self
    where
        F: Fn(usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(width, height, data, origin, spacing)
    }

    /// Place the image at physical height `z`.
    pub fn with_z(mut self, z: f64) -> Self {
        self.z = z;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn origin(&self) -> &Point2 {
        &self.origin
    }

    pub fn spacing(&self) -> &Vector2 {
        &self.spacing
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }

    /// Halve the resolution by averaging 2×2 pixel blocks.
    ///
    /// The origin moves to the centre of the first block so that pixel
    /// centres keep their physical meaning. Odd trailing rows/columns are
    /// averaged over the pixels that exist.
    pub fn downsample(&self) -> Image2D {
        let w = self.width.div_ceil(2).max(1);
        let h = self.height.div_ceil(2).max(1);
        let data = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| {
                let mut sum = 0.0f32;
                let mut count = 0.0f32;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    if let Some(v) = self.get(2 * x + dx, 2 * y + dy) {
                        sum += v;
                        count += 1.0;
                    }
                }
                if count > 0.0 {
                    sum / count
                } else {
                    0.0
                }
            })
            .collect();

        let spacing = self.spacing * 2.0;
        let origin = self.origin + self.spacing * 0.5;
        Image2D {
            width: w,
            height: h,
            data,
            origin,
            spacing,
            z: self.z,
        }
    }
}

impl SlideImage for Image2D {
    fn num_levels(&self) -> usize {
        1
    }

    fn dimensions(&self, _level: usize) -> [usize; 2] {
        [self.width, self.height]
    }

    fn pixel(&self, level: usize, timepoint: usize, x: usize, y: usize) -> Option<f32> {
        if level != 0 || timepoint != 0 {
            return None;
        }
        self.get(x, y)
    }

    fn pixel_to_physical(&self, _level: usize) -> AffineTransform2D {
        AffineTransform2D::scale_translate(
            self.spacing.x,
            self.spacing.y,
            self.origin.x,
            self.origin.y,
        )
    }

    fn z_origin(&self) -> f64 {
        self.z
    }
}
