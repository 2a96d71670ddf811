//! Tagged union over the planar transforms produced by registration.

use super::affine::AffineTransform2D;
use super::inverse::IterativeInverse;
use super::thin_plate::ThinPlateSpline;
use super::trait_::InvertibleTransform;
use crate::spatial::Point2;
use serde::{Deserialize, Serialize};

/// Planar transform: affine, thin-plate spline, or a chain of both.
///
/// A spline may be held in its inverted direction; its inverse is then the
/// direct evaluation and its forward map the iterative solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Transform2D {
    Affine(AffineTransform2D),
    ThinPlateSpline {
        spline: ThinPlateSpline,
        #[serde(default)]
        inverted: bool,
        #[serde(default)]
        inverse: IterativeInverse,
    },
    /// Applied first to last.
    Composite(Vec<Transform2D>),
}

impl Transform2D {
    pub fn identity() -> Self {
        Transform2D::Affine(AffineTransform2D::identity())
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Transform2D::Affine(AffineTransform2D::translation(dx, dy))
    }

    /// Wrap a fitted spline in its forward direction.
    pub fn spline(spline: ThinPlateSpline, inverse: IterativeInverse) -> Self {
        Transform2D::ThinPlateSpline {
            spline,
            inverted: false,
            inverse,
        }
    }

    /// The inverse transform. Affine inverses are exact when the linear part
    /// is regular; a singular affine maps every point to NaN.
    pub fn inverse(&self) -> Transform2D {
        match self {
            Transform2D::Affine(a) => match a.try_inverse() {
                Ok(inv) => Transform2D::Affine(inv),
                Err(_) => Transform2D::Affine(AffineTransform2D::new(
                    nalgebra::Matrix2::from_element(f64::NAN),
                    nalgebra::Vector2::from_element(f64::NAN),
                )),
            },
            Transform2D::ThinPlateSpline {
                spline,
                inverted,
                inverse,
            } => Transform2D::ThinPlateSpline {
                spline: spline.clone(),
                inverted: !inverted,
                inverse: *inverse,
            },
            Transform2D::Composite(chain) => {
                Transform2D::Composite(chain.iter().rev().map(|t| t.inverse()).collect())
            }
        }
    }

    /// Chain `self` followed by `next`, flattening nested composites.
    pub fn then(self, next: Transform2D) -> Transform2D {
        let mut chain = match self {
            Transform2D::Composite(chain) => chain,
            other => vec![other],
        };
        match next {
            Transform2D::Composite(rest) => chain.extend(rest),
            other => chain.push(other),
        }
        Transform2D::Composite(chain)
    }

    /// Number of spline landmarks across the whole transform.
    pub fn landmark_count(&self) -> usize {
        match self {
            Transform2D::Affine(_) => 0,
            Transform2D::ThinPlateSpline { spline, .. } => spline.len(),
            Transform2D::Composite(chain) => chain.iter().map(|t| t.landmark_count()).sum(),
        }
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<AffineTransform2D> for Transform2D {
    fn from(affine: AffineTransform2D) -> Self {
        Transform2D::Affine(affine)
    }
}

fn solve_spline(spline: &ThinPlateSpline, p: &Point2, solver: &IterativeInverse) -> Point2 {
    let est = spline.inverse_estimate(p, solver);
    if !est.converged {
        tracing::warn!(
            "Spline inverse did not converge at ({:.4}, {:.4}): residual {:.3e}",
            p.x,
            p.y,
            est.residual
        );
    }
    est.point
}

impl InvertibleTransform<2> for Transform2D {
    fn apply(&self, p: &Point2) -> Point2 {
        match self {
            Transform2D::Affine(a) => a.apply(p),
            Transform2D::ThinPlateSpline {
                spline,
                inverted: false,
                ..
            } => spline.evaluate(p),
            Transform2D::ThinPlateSpline {
                spline,
                inverted: true,
                inverse,
            } => solve_spline(spline, p, inverse),
            Transform2D::Composite(chain) => chain.iter().fold(*p, |q, t| t.apply(&q)),
        }
    }

    fn apply_inverse(&self, p: &Point2) -> Point2 {
        match self {
            Transform2D::Affine(a) => a.apply_inverse(p),
            Transform2D::ThinPlateSpline {
                spline,
                inverted: false,
                inverse,
            } => solve_spline(spline, p, inverse),
            Transform2D::ThinPlateSpline {
                spline,
                inverted: true,
                ..
            } => spline.evaluate(p),
            Transform2D::Composite(chain) => {
                chain.iter().rev().fold(*p, |q, t| t.apply_inverse(&q))
            }
        }
    }
}
