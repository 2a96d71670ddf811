//! Thin-plate spline transform in the plane.
//!
//! f(p) = a + A q + Σ w_i U(|q - q_i|),  q = (p - c) / s
//!
//! with kernel U(r) = r² ln r. Coordinates are normalised by the landmark
//! centroid `c` and half extent `s` before fitting to keep the linear system
//! well conditioned for slide-sized coordinates.

use super::affine::AffineTransform2D;
use super::inverse::{InverseEstimate, IterativeInverse};
use super::trait_::InvertibleTransform;
use crate::error::{Result, TransformError};
use crate::spatial::{is_finite_point, Point2, Rect, Vector2};
use nalgebra::{DMatrix, Matrix2};
use serde::{Deserialize, Serialize};

/// Minimum number of landmark pairs accepted by [`ThinPlateSpline::fit`].
pub const MIN_LANDMARKS: usize = 4;

const COINCIDENT_TOLERANCE: f64 = 1e-12;
const COLLINEAR_TOLERANCE: f64 = 1e-10;

/// Interpolating thin-plate spline fitted through landmark pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinPlateSpline {
    /// Normalised source landmarks.
    knots: Vec<Point2>,
    /// Kernel weights, one per knot.
    weights: Vec<Vector2>,
    /// Affine part in the normalised domain.
    affine: AffineTransform2D,
    center: Point2,
    scale: f64,
}

fn kernel(d: &Vector2) -> f64 {
    let r2 = d.norm_squared();
    if r2 == 0.0 {
        0.0
    } else {
        0.5 * r2 * r2.ln()
    }
}

fn kernel_gradient(d: &Vector2) -> Vector2 {
    let r2 = d.norm_squared();
    if r2 == 0.0 {
        Vector2::zeros()
    } else {
        d * (r2.ln() + 1.0)
    }
}

impl ThinPlateSpline {
    /// Fit a spline mapping each `sources[i]` exactly onto `targets[i]`.
    ///
    /// `regularization` relaxes interpolation into smoothing when positive.
    ///
    /// # Errors
    /// * `InsufficientLandmarks` with fewer than [`MIN_LANDMARKS`] pairs
    /// * `LandmarkMismatch` when the two lists differ in length
    /// * `DegenerateLandmarks` for non-finite, coincident or collinear sources
    /// * `SingularSystem` when the interpolation system cannot be solved
    pub fn fit(sources: &[Point2], targets: &[Point2], regularization: f64) -> Result<Self> {
        if sources.len() != targets.len() {
            return Err(TransformError::LandmarkMismatch {
                source_count: sources.len(),
                target_count: targets.len(),
            });
        }
        let n = sources.len();
        if n < MIN_LANDMARKS {
            return Err(TransformError::InsufficientLandmarks {
                found: n,
                required: MIN_LANDMARKS,
            });
        }
        if !sources.iter().chain(targets.iter()).all(|p| is_finite_point(p)) {
            return Err(TransformError::degenerate("non-finite landmark coordinates"));
        }

        let bounds = Rect::bounding(sources.iter())
            .ok_or_else(|| TransformError::degenerate("empty landmark set"))?;
        let center = bounds.center();
        let scale = 0.5 * bounds.width().max(bounds.height());
        if !(scale > 0.0) {
            return Err(TransformError::degenerate("all source landmarks coincide"));
        }
        let knots: Vec<Point2> = sources
            .iter()
            .map(|p| Point2::from((p - center) / scale))
            .collect();

        check_coincident(&knots)?;
        check_collinear(&knots)?;

        let size = n + 3;
        let mut system = DMatrix::<f64>::zeros(size, size);
        let mut rhs = DMatrix::<f64>::zeros(size, 2);
        for i in 0..n {
            for j in (i + 1)..n {
                let u = kernel(&(knots[i] - knots[j]));
                system[(i, j)] = u;
                system[(j, i)] = u;
            }
            system[(i, i)] = regularization;
            system[(i, n)] = 1.0;
            system[(i, n + 1)] = knots[i].x;
            system[(i, n + 2)] = knots[i].y;
            system[(n, i)] = 1.0;
            system[(n + 1, i)] = knots[i].x;
            system[(n + 2, i)] = knots[i].y;
            rhs[(i, 0)] = targets[i].x;
            rhs[(i, 1)] = targets[i].y;
        }

        let solution = system
            .lu()
            .solve(&rhs)
            .filter(|s| s.iter().all(|v| v.is_finite()))
            .ok_or_else(|| {
                TransformError::singular(format!("thin-plate spline with {} landmarks", n))
            })?;

        let weights = (0..n)
            .map(|i| Vector2::new(solution[(i, 0)], solution[(i, 1)]))
            .collect();
        let affine = AffineTransform2D::new(
            Matrix2::new(
                solution[(n + 1, 0)],
                solution[(n + 2, 0)],
                solution[(n + 1, 1)],
                solution[(n + 2, 1)],
            ),
            Vector2::new(solution[(n, 0)], solution[(n, 1)]),
        );

        Ok(Self {
            knots,
            weights,
            affine,
            center,
            scale,
        })
    }

    /// Number of landmarks the spline interpolates.
    pub fn len(&self) -> usize {
        self.knots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    /// Source landmarks in physical coordinates.
    pub fn sources(&self) -> Vec<Point2> {
        self.knots
            .iter()
            .map(|q| self.center + q.coords * self.scale)
            .collect()
    }

    fn normalise(&self, p: &Point2) -> Point2 {
        Point2::from((p - self.center) / self.scale)
    }

    /// The affine component expressed in physical coordinates.
    pub fn affine_part(&self) -> AffineTransform2D {
        let normalise = AffineTransform2D::new(
            Matrix2::identity() / self.scale,
            -self.center.coords / self.scale,
        );
        normalise.then(&self.affine)
    }

    /// Evaluate the spline at a physical point.
    pub fn evaluate(&self, p: &Point2) -> Point2 {
        let q = self.normalise(p);
        let mut out = self.affine.apply(&q);
        for (knot, w) in self.knots.iter().zip(&self.weights) {
            out += w * kernel(&(q - knot));
        }
        out
    }

    /// Jacobian of the spline with respect to physical coordinates.
    pub fn jacobian(&self, p: &Point2) -> Matrix2<f64> {
        let q = self.normalise(p);
        let mut jac = *self.affine.matrix();
        for (knot, w) in self.knots.iter().zip(&self.weights) {
            jac += w * kernel_gradient(&(q - knot)).transpose();
        }
        jac / self.scale
    }

    /// Invert the spline at `p` with the given solver settings.
    pub fn inverse_estimate(&self, p: &Point2, solver: &IterativeInverse) -> InverseEstimate {
        let initial = self.affine_part().apply_inverse(p);
        let initial = if is_finite_point(&initial) { initial } else { *p };
        solver.solve(p, initial, |x| self.evaluate(x), |x| self.jacobian(x))
    }
}

fn check_coincident(knots: &[Point2]) -> Result<()> {
    let mut order: Vec<usize> = (0..knots.len()).collect();
    order.sort_by(|&a, &b| knots[a].x.total_cmp(&knots[b].x));
    for (pos, &i) in order.iter().enumerate() {
        for &j in &order[pos + 1..] {
            if knots[j].x - knots[i].x > COINCIDENT_TOLERANCE {
                break;
            }
            if (knots[j].y - knots[i].y).abs() <= COINCIDENT_TOLERANCE {
                return Err(TransformError::degenerate(format!(
                    "landmarks {} and {} coincide",
                    i, j
                )));
            }
        }
    }
    Ok(())
}

fn check_collinear(knots: &[Point2]) -> Result<()> {
    let n = knots.len() as f64;
    let mean = knots.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in knots {
        let d = p.coords - mean;
        sxx += d.x * d.x;
        syy += d.y * d.y;
        sxy += d.x * d.y;
    }
    let det = sxx * syy - sxy * sxy;
    let trace = sxx + syy;
    if det <= COLLINEAR_TOLERANCE * trace * trace {
        return Err(TransformError::degenerate("source landmarks are collinear"));
    }
    Ok(())
}

impl InvertibleTransform<2> for ThinPlateSpline {
    fn apply(&self, p: &Point2) -> Point2 {
        self.evaluate(p)
    }

    fn apply_inverse(&self, p: &Point2) -> Point2 {
        self.inverse_estimate(p, &IterativeInverse::default()).point
    }
}
