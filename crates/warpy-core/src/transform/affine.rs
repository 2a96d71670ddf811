//! Affine transform in the plane.
//!
//! T(x) = A x + t

use super::trait_::InvertibleTransform;
use crate::error::{Result, TransformError};
use crate::spatial::{Point2, Vector2};
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

/// 2D affine transform (linear part + translation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform2D {
    matrix: Matrix2<f64>,
    translation: Vector2,
}

impl AffineTransform2D {
    /// Create a new affine transform from its linear part and translation.
    pub fn new(matrix: Matrix2<f64>, translation: Vector2) -> Self {
        Self {
            matrix,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix2::identity(), Vector2::zeros())
    }

    /// Pure translation by `(dx, dy)`.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::new(Matrix2::identity(), Vector2::new(dx, dy))
    }

    /// Axis-aligned scaling followed by a translation, as used by
    /// pixel-to-physical mappings.
    pub fn scale_translate(sx: f64, sy: f64, dx: f64, dy: f64) -> Self {
        Self::new(Matrix2::new(sx, 0.0, 0.0, sy), Vector2::new(dx, dy))
    }

    /// Get the linear part.
    pub fn matrix(&self) -> &Matrix2<f64> {
        &self.matrix
    }

    /// Get the translation vector.
    pub fn translation_vector(&self) -> &Vector2 {
        &self.translation
    }

    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().chain(self.translation.iter()).all(|v| v.is_finite())
    }

    /// Exact inverse, failing when the linear part is singular.
    pub fn try_inverse(&self) -> Result<Self> {
        let inv = self
            .matrix
            .try_inverse()
            .filter(|m| m.iter().all(|v| v.is_finite()))
            .ok_or_else(|| {
                TransformError::non_invertible(format!(
                    "affine determinant {:.3e}",
                    self.determinant()
                ))
            })?;
        Ok(Self::new(inv, -(inv * self.translation)))
    }

    /// Composition applying `self` first, then `next`.
    pub fn then(&self, next: &AffineTransform2D) -> Self {
        Self::new(
            next.matrix * self.matrix,
            next.matrix * self.translation + next.translation,
        )
    }

    /// Apply only the linear part to a vector.
    pub fn apply_vector(&self, v: &Vector2) -> Vector2 {
        self.matrix * v
    }
}

impl Default for AffineTransform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl InvertibleTransform<2> for AffineTransform2D {
    fn apply(&self, p: &Point2) -> Point2 {
        Point2::from(self.matrix * p.coords + self.translation)
    }

    fn apply_inverse(&self, p: &Point2) -> Point2 {
        match self.try_inverse() {
            Ok(inv) => inv.apply(p),
            Err(_) => Point2::new(f64::NAN, f64::NAN),
        }
    }
}
