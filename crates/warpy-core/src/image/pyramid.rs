//! Multi-resolution image pyramid.

use super::image::Image2D;
use super::trait_::SlideImage;
use crate::transform::AffineTransform2D;

/// Sequence of images at halving resolutions, finest first.
///
/// Block registration samples the coarsest level that still resolves the
/// requested pixel size, so large slides are never read at full resolution
/// for coarse scales.
#[derive(Debug, Clone)]
pub struct MultiResolutionImage {
    levels: Vec<Image2D>,
}

impl MultiResolutionImage {
    /// Build up to `max_levels` levels from `base` by repeated 2×2 averaging.
    /// Downsampling stops once a level is a single pixel wide or high.
    pub fn new(base: Image2D, max_levels: usize) -> Self {
        let mut levels = vec![base];
        while levels.len() < max_levels.max(1) {
            let last = &levels[levels.len() - 1];
            if last.width() < 2 || last.height() < 2 {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Self { levels }
    }

    /// Use precomputed levels, finest first.
    ///
    /// # Panics
    /// Panics if `levels` is empty.
    pub fn from_levels(levels: Vec<Image2D>) -> Self {
        assert!(!levels.is_empty(), "Pyramid needs at least one level");
        Self { levels }
    }

    /// Get image at specific level.
    pub fn get_level(&self, level: usize) -> Option<&Image2D> {
        self.levels.get(level)
    }
}

impl SlideImage for MultiResolutionImage {
    fn num_levels(&self) -> usize {
        self.levels.len()
    }

    fn dimensions(&self, level: usize) -> [usize; 2] {
        self.levels
            .get(level)
            .map(|img| [img.width(), img.height()])
            .unwrap_or([0, 0])
    }

    fn pixel(&self, level: usize, timepoint: usize, x: usize, y: usize) -> Option<f32> {
        self.levels.get(level)?.pixel(0, timepoint, x, y)
    }

    fn pixel_to_physical(&self, level: usize) -> AffineTransform2D {
        let img = self.levels.get(level).unwrap_or(&self.levels[0]);
        img.pixel_to_physical(0)
    }

    fn z_origin(&self) -> f64 {
        self.levels[0].z_origin()
    }
}
