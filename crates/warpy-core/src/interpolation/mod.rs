//! Interpolation of slide pixels at continuous coordinates.

pub mod linear;
pub mod trait_;

pub use linear::LinearInterpolator;
pub use trait_::Interpolator;
