//! Block registration by maximising zero-normalised cross correlation.
//!
//! Both blocks are resampled on the same regular grid at the requested pixel
//! size, from the coarsest pyramid level that resolves it. The moving grid is
//! then displaced (and optionally sheared and scaled) by a derivative-free
//! compass search until the correlation stops improving.
//!
//! ZNCC = Σ(F - mean(F))(M - mean(M)) / sqrt(Σ(F - mean(F))² Σ(M - mean(M))²)

use crate::block::{BlockRegistrator, BlockRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use warpy_core::image::SlideImage;
use warpy_core::interpolation::{Interpolator, LinearInterpolator};
use warpy_core::transform::{AffineTransform2D, InvertibleTransform};
use warpy_core::{Point2, Vector2};

const MAX_SAMPLES_PER_AXIS: usize = 512;
const MIN_SAMPLES_PER_AXIS: usize = 4;

/// Why a block could not be registered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockFailure {
    #[error("block has too little overlap with the image")]
    OutsideImage,

    #[error("fixed block has no texture (variance {0:.3e})")]
    InsufficientContent(f64),

    #[error("best correlation {0:.3} below threshold")]
    LowCorrelation(f64),

    #[error("invalid block request: {0}")]
    InvalidRequest(String),
}

/// Settings for [`CorrelationBlockRegistrator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// First compass step, in sample pixels.
    pub initial_step_pixels: f64,
    /// The search stops once the step falls below this, in sample pixels.
    pub min_step_pixels: f64,
    /// Results below this correlation are rejected.
    pub min_correlation: f64,
    /// Fixed blocks with a lower intensity variance are rejected.
    pub min_variance: f64,
    /// Fraction of samples that must fall inside both images.
    pub min_overlap: f64,
    /// Largest shift searched, as a fraction of the block half extent.
    pub max_shift_fraction: f64,
    /// Also estimate the linear part instead of a pure translation.
    pub affine: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            initial_step_pixels: 4.0,
            min_step_pixels: 0.05,
            min_correlation: 0.2,
            min_variance: 1e-8,
            min_overlap: 0.5,
            max_shift_fraction: 0.5,
            affine: false,
        }
    }
}

impl CorrelationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_affine(mut self, affine: bool) -> Self {
        self.affine = affine;
        self
    }

    pub fn with_min_correlation(mut self, min_correlation: f64) -> Self {
        self.min_correlation = min_correlation;
        self
    }

    pub fn with_max_shift_fraction(mut self, fraction: f64) -> Self {
        self.max_shift_fraction = fraction;
        self
    }
}

/// Result of a successful block registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMatch {
    /// Maps moving-block-local to fixed-block-local coordinates.
    pub transform: AffineTransform2D,
    pub correlation: f64,
    pub iterations: usize,
}

/// Block registrator based on ZNCC and compass search.
#[derive(Debug, Clone, Default)]
pub struct CorrelationBlockRegistrator {
    config: CorrelationConfig,
    interpolator: LinearInterpolator,
}

/// Search parameters: shift `(dx, dy)` and linear perturbation `(a, b, c, d)`
/// so that a fixed-local offset `o` matches the moving-local point
/// `(I + [[a, b], [c, d]]) o + shift`.
type Params = [f64; 6];

impl CorrelationBlockRegistrator {
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            config,
            interpolator: LinearInterpolator::new(),
        }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Register one block, reporting why it failed.
    pub fn try_register(&self, request: &BlockRequest<'_>) -> Result<BlockMatch, BlockFailure> {
        let block = request.block;
        let ps = request.pixel_size;
        if !(ps > 0.0 && ps.is_finite()) || !(block.half_width > 0.0 && block.half_height > 0.0) {
            return Err(BlockFailure::InvalidRequest(format!(
                "pixel size {} and half extent {}x{}",
                ps, block.half_width, block.half_height
            )));
        }

        let nx = samples_along(2.0 * block.half_width, ps);
        let ny = samples_along(2.0 * block.half_height, ps);
        let offsets: Vec<Vector2> = (0..ny)
            .flat_map(|j| (0..nx).map(move |i| (i, j)))
            .map(|(i, j)| {
                Vector2::new(
                    -block.half_width + (i as f64 + 0.5) * 2.0 * block.half_width / nx as f64,
                    -block.half_height + (j as f64 + 0.5) * 2.0 * block.half_height / ny as f64,
                )
            })
            .collect();

        let fixed = Sampler::new(request.fixed, ps, request.timepoint, &self.interpolator)
            .ok_or(BlockFailure::OutsideImage)?;
        let moving = Sampler::new(request.moving, ps, request.timepoint, &self.interpolator)
            .ok_or(BlockFailure::OutsideImage)?;

        let fixed_values: Vec<Option<f32>> = offsets
            .iter()
            .map(|o| fixed.sample(&(block.center + o)))
            .collect();
        let inside = fixed_values.iter().filter(|v| v.is_some()).count();
        if (inside as f64) < self.config.min_overlap * offsets.len() as f64 {
            return Err(BlockFailure::OutsideImage);
        }
        let variance = variance(fixed_values.iter().flatten().map(|&v| v as f64));
        if variance < self.config.min_variance {
            return Err(BlockFailure::InsufficientContent(variance));
        }

        let score = |params: &Params| -> Option<f64> {
            let (values_f, values_m): (Vec<f64>, Vec<f64>) = offsets
                .iter()
                .zip(&fixed_values)
                .filter_map(|(o, f)| {
                    let m = moving.sample(&(request.moving_center + displaced(params, o)))?;
                    Some(((*f)? as f64, m as f64))
                })
                .unzip();
            if (values_f.len() as f64) < self.config.min_overlap * offsets.len() as f64 {
                return None;
            }
            zncc(&values_f, &values_m)
        };

        // Linear entries are scaled so one step moves the block edge by one step.
        let units: Params = [
            ps,
            ps,
            ps / block.half_width,
            ps / block.half_height,
            ps / block.half_width,
            ps / block.half_height,
        ];
        let active = if self.config.affine { 6 } else { 2 };
        let max_shift = Vector2::new(
            self.config.max_shift_fraction * block.half_width,
            self.config.max_shift_fraction * block.half_height,
        );
        let in_bounds = |p: &Params| {
            p[0].abs() <= max_shift.x
                && p[1].abs() <= max_shift.y
                && p[2..].iter().all(|v| v.abs() <= 0.5)
        };

        let mut params: Params = [0.0; 6];
        let mut best = score(&params).ok_or(BlockFailure::OutsideImage)?;
        let mut step = self.config.initial_step_pixels;
        let mut iterations = 0;

        while step >= self.config.min_step_pixels && iterations < request.max_iterations {
            iterations += 1;
            let mut improved = false;
            for k in 0..active {
                for sign in [1.0, -1.0] {
                    let mut candidate = params;
                    candidate[k] += sign * step * units[k];
                    if !in_bounds(&candidate) {
                        continue;
                    }
                    if let Some(s) = score(&candidate) {
                        if s > best + 1e-12 {
                            best = s;
                            params = candidate;
                            improved = true;
                        }
                    }
                }
            }
            if !improved {
                step *= 0.5;
            }
        }

        if request.show_details {
            tracing::debug!(
                "Block at ({:.3}, {:.3}): shift ({:.4}, {:.4}), ZNCC {:.4}, {} iterations",
                block.center.x,
                block.center.y,
                params[0],
                params[1],
                best,
                iterations
            );
        }

        if best < self.config.min_correlation {
            return Err(BlockFailure::LowCorrelation(best));
        }

        let forward = AffineTransform2D::new(
            nalgebra::Matrix2::new(1.0 + params[2], params[3], params[4], 1.0 + params[5]),
            Vector2::new(params[0], params[1]),
        );
        let transform = forward
            .try_inverse()
            .map_err(|e| BlockFailure::InvalidRequest(e.to_string()))?;

        Ok(BlockMatch {
            transform,
            correlation: best,
            iterations,
        })
    }
}

impl BlockRegistrator for CorrelationBlockRegistrator {
    fn register_block(&self, request: &BlockRequest<'_>) -> Option<AffineTransform2D> {
        match self.try_register(request) {
            Ok(found) => Some(found.transform),
            Err(failure) => {
                if request.show_details {
                    tracing::debug!(
                        "Block at ({:.3}, {:.3}) failed: {}",
                        request.block.center.x,
                        request.block.center.y,
                        failure
                    );
                }
                None
            }
        }
    }
}

/// Physical-point sampler bound to one pyramid level.
struct Sampler<'a> {
    image: &'a dyn SlideImage,
    level: usize,
    timepoint: usize,
    to_pixel: AffineTransform2D,
    interpolator: &'a LinearInterpolator,
}

impl<'a> Sampler<'a> {
    fn new(
        image: &'a dyn SlideImage,
        pixel_size: f64,
        timepoint: usize,
        interpolator: &'a LinearInterpolator,
    ) -> Option<Self> {
        let level = image.level_for_pixel_size(pixel_size);
        let to_pixel = image.physical_to_pixel(level)?;
        Some(Self {
            image,
            level,
            timepoint,
            to_pixel,
            interpolator,
        })
    }

    fn sample(&self, point: &Point2) -> Option<f32> {
        self.interpolator
            .sample(self.image, self.level, self.timepoint, &self.to_pixel.apply(point))
    }
}

fn samples_along(length: f64, pixel_size: f64) -> usize {
    ((length / pixel_size).ceil() as usize).clamp(MIN_SAMPLES_PER_AXIS, MAX_SAMPLES_PER_AXIS)
}

fn displaced(params: &Params, offset: &Vector2) -> Vector2 {
    Vector2::new(
        offset.x + params[2] * offset.x + params[3] * offset.y + params[0],
        offset.y + params[4] * offset.x + params[5] * offset.y + params[1],
    )
}

fn variance(values: impl Iterator<Item = f64>) -> f64 {
    let (mut n, mut sum, mut sum_sq) = (0usize, 0.0, 0.0);
    for v in values {
        n += 1;
        sum += v;
        sum_sq += v * v;
    }
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

fn zncc(fixed: &[f64], moving: &[f64]) -> Option<f64> {
    let n = fixed.len() as f64;
    if n < 2.0 {
        return None;
    }
    let mean_f = fixed.iter().sum::<f64>() / n;
    let mean_m = moving.iter().sum::<f64>() / n;
    let (mut cross, mut var_f, mut var_m) = (0.0, 0.0, 0.0);
    for (f, m) in fixed.iter().zip(moving) {
        let (df, dm) = (f - mean_f, m - mean_m);
        cross += df * dm;
        var_f += df * df;
        var_m += dm * dm;
    }
    let denom = (var_f * var_m).sqrt();
    (denom > 1e-12).then(|| cross / denom)
}
