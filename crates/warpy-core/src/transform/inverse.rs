//! Iterative inversion of smooth 2D transforms.
//!
//! Thin-plate splines have no closed-form inverse. The inverse of a point is
//! found with damped Newton iterations on the analytic Jacobian.

use crate::spatial::Point2;
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

/// Settings for the Newton inverse solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterativeInverse {
    /// Stop once the forward residual drops below this distance.
    pub tolerance: f64,
    /// Maximum number of Newton steps.
    pub max_iterations: usize,
}

impl Default for IterativeInverse {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 200,
        }
    }
}

/// Outcome of one inverse solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseEstimate {
    pub point: Point2,
    pub residual: f64,
    pub iterations: usize,
    pub converged: bool,
}

const MAX_BACKTRACKS: usize = 12;

impl IterativeInverse {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Find `x` such that `forward(x) == target`, starting from `initial`.
    ///
    /// The best estimate seen is returned even when the solver does not
    /// converge; `converged` tells the two cases apart.
    pub fn solve<F, J>(
        &self,
        target: &Point2,
        initial: Point2,
        forward: F,
        jacobian: J,
    ) -> InverseEstimate
    where
        F: Fn(&Point2) -> Point2,
        J: Fn(&Point2) -> Matrix2<f64>,
    {
        let mut x = initial;
        let mut err = forward(&x) - target;
        let mut residual = err.norm();

        for iteration in 0..self.max_iterations {
            if residual <= self.tolerance {
                return InverseEstimate {
                    point: x,
                    residual,
                    iterations: iteration,
                    converged: true,
                };
            }

            let step = match jacobian(&x).try_inverse() {
                Some(inv) => inv * err,
                None => break,
            };
            if !step.iter().all(|v| v.is_finite()) {
                break;
            }

            // Backtrack until the residual decreases.
            let mut scale = 1.0;
            let mut improved = false;
            for _ in 0..MAX_BACKTRACKS {
                let candidate = x - step * scale;
                let candidate_err = forward(&candidate) - target;
                let candidate_residual = candidate_err.norm();
                if candidate_residual < residual {
                    x = candidate;
                    err = candidate_err;
                    residual = candidate_residual;
                    improved = true;
                    break;
                }
                scale *= 0.5;
            }
            if !improved {
                break;
            }
        }

        InverseEstimate {
            point: x,
            residual,
            iterations: self.max_iterations,
            converged: residual <= self.tolerance,
        }
    }
}
