//! Configuration for registration runs.
//!
//! All configs deserialize with defaults for missing fields, so a JSON file
//! only needs the values it overrides.

use crate::error::{RegistrationError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use warpy_core::transform::{IterativeInverse, MIN_LANDMARKS};

/// How the registration region is derived from the two image extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionPolicy {
    /// Only where both slides have content.
    #[default]
    Intersection,
    /// Everywhere either slide has content.
    Union,
}

/// Settings for the multi-scale spline registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiscaleConfig {
    /// Number of scales to register (at least 2).
    pub n_scales: usize,
    /// Iteration budget handed to each block registration.
    pub max_iterations: usize,
    /// Blocks are sampled with about this many pixels along their longer side.
    pub pixels_per_block: usize,
    /// Register the blocks of a scale on the thread pool.
    pub parallel: bool,
    /// Ask the block registrator for diagnostics. Forces serial execution.
    pub show_details: bool,
    pub region_policy: RegionPolicy,
    /// Centre the moving slide on the fixed slide before scale 0.
    pub center_moving: bool,
    /// Register in a common z plane and restore the offset in the result.
    pub remove_z_offset: bool,
    pub timepoint: usize,
    pub min_landmarks_per_scale: usize,
    pub max_landmarks_per_scale: usize,
    /// Iteration cap of the block planner.
    pub max_plan_iterations: usize,
    /// Thin-plate spline regularisation; 0 interpolates exactly.
    pub regularization: f64,
    pub inverse: IterativeInverse,
}

impl Default for MultiscaleConfig {
    fn default() -> Self {
        Self {
            n_scales: 3,
            max_iterations: 100,
            pixels_per_block: 64,
            parallel: true,
            show_details: false,
            region_policy: RegionPolicy::Intersection,
            center_moving: false,
            remove_z_offset: true,
            timepoint: 0,
            min_landmarks_per_scale: MIN_LANDMARKS,
            max_landmarks_per_scale: 4096,
            max_plan_iterations: 64,
            regularization: 0.0,
            inverse: IterativeInverse::default(),
        }
    }
}

impl MultiscaleConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scales(mut self, n_scales: usize) -> Self {
        self.n_scales = n_scales;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_pixels_per_block(mut self, pixels: usize) -> Self {
        self.pixels_per_block = pixels;
        self
    }

    /// Disable parallel block registration.
    pub fn serial(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_show_details(mut self, show_details: bool) -> Self {
        self.show_details = show_details;
        self
    }

    pub fn with_region_policy(mut self, policy: RegionPolicy) -> Self {
        self.region_policy = policy;
        self
    }

    pub fn with_centering(mut self, center_moving: bool) -> Self {
        self.center_moving = center_moving;
        self
    }

    pub fn with_timepoint(mut self, timepoint: usize) -> Self {
        self.timepoint = timepoint;
        self
    }

    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }

    /// Whether blocks actually run on the thread pool.
    pub fn runs_parallel(&self) -> bool {
        self.parallel && !self.show_details
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

/// Settings for the whole-slide pipeline (affine, then splines).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WholeSlideConfig {
    /// Register the full overlap with one affine block before the splines.
    pub initial_affine: bool,
    /// Pixels along the longer side of the affine block.
    pub affine_pixels: usize,
    pub affine_iterations: usize,
    /// Run the multi-scale spline stage.
    pub spline: bool,
    pub multiscale: MultiscaleConfig,
}

impl Default for WholeSlideConfig {
    fn default() -> Self {
        Self {
            initial_affine: true,
            affine_pixels: 256,
            affine_iterations: 200,
            spline: true,
            multiscale: MultiscaleConfig::default(),
        }
    }
}

impl WholeSlideConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_affine(mut self, enabled: bool) -> Self {
        self.initial_affine = enabled;
        self
    }

    pub fn with_spline(mut self, enabled: bool) -> Self {
        self.spline = enabled;
        self
    }

    pub fn with_multiscale(mut self, multiscale: MultiscaleConfig) -> Self {
        self.multiscale = multiscale;
        self
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        RegistrationError::invalid_configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        RegistrationError::invalid_configuration(format!("cannot parse {}: {}", path.display(), e))
    })
}
