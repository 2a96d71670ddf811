//! Transform types and operations.
//!
//! Every transform maps physical coordinates and offers both directions
//! through [`InvertibleTransform`].

pub mod affine;
pub mod inverse;
pub mod slice;
pub mod thin_plate;
pub mod trait_;
pub mod transform2d;

pub use affine::AffineTransform2D;
pub use inverse::{InverseEstimate, IterativeInverse};
pub use slice::SliceTransform;
pub use thin_plate::{ThinPlateSpline, MIN_LANDMARKS};
pub use trait_::InvertibleTransform;
pub use transform2d::Transform2D;
