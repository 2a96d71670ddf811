//! Fitting of dense transforms to landmark correspondences.

use crate::config::MultiscaleConfig;
use crate::points::PointSet;
use warpy_core::transform::{IterativeInverse, ThinPlateSpline, Transform2D};
use warpy_core::TransformError;

/// Fits a dense transform mapping every source of a [`PointSet`] to its
/// target.
pub trait SplineFitter: Send + Sync {
    fn fit(&self, points: &PointSet) -> Result<Transform2D, TransformError>;
}

/// Thin-plate spline fitter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThinPlateSplineFitter {
    /// Smoothing weight; 0 interpolates the landmarks exactly.
    pub regularization: f64,
    /// Solver used when the fitted spline is inverted.
    pub inverse: IterativeInverse,
}

impl ThinPlateSplineFitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MultiscaleConfig) -> Self {
        Self {
            regularization: config.regularization,
            inverse: config.inverse,
        }
    }

    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }
}

impl SplineFitter for ThinPlateSplineFitter {
    fn fit(&self, points: &PointSet) -> Result<Transform2D, TransformError> {
        let spline = ThinPlateSpline::fit(points.sources(), points.targets(), self.regularization)?;
        Ok(Transform2D::spline(spline, self.inverse))
    }
}
