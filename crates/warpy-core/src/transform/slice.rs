//! Planar transform embedded in 3D.
//!
//! Slide registration is two-dimensional, but viewers and exporters consume
//! 3D transforms. The xy plane goes through the planar transform; z only
//! receives a constant shift between the two slide planes.

use super::trait_::InvertibleTransform;
use super::transform2d::Transform2D;
use crate::spatial::{Point2, Point3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceTransform {
    /// Planar part.
    pub xy: Transform2D,
    /// Constant offset added to z by the forward map.
    #[serde(default)]
    pub z_shift: f64,
}

impl SliceTransform {
    pub fn new(xy: Transform2D, z_shift: f64) -> Self {
        Self { xy, z_shift }
    }

    pub fn identity() -> Self {
        Self::new(Transform2D::identity(), 0.0)
    }

    pub fn inverse(&self) -> SliceTransform {
        Self::new(self.xy.inverse(), -self.z_shift)
    }
}

impl Default for SliceTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl InvertibleTransform<3> for SliceTransform {
    fn apply(&self, p: &Point3) -> Point3 {
        let q = self.xy.apply(&Point2::new(p.x, p.y));
        Point3::new(q.x, q.y, p.z + self.z_shift)
    }

    fn apply_inverse(&self, p: &Point3) -> Point3 {
        let q = self.xy.apply_inverse(&Point2::new(p.x, p.y));
        Point3::new(q.x, q.y, p.z - self.z_shift)
    }
}
