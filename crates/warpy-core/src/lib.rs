pub mod error;
pub mod image;
pub mod interpolation;
pub mod spatial;
pub mod transform;

pub use error::{Result, TransformError};
pub use image::{Image2D, MultiResolutionImage, SlideImage};
pub use spatial::{Point2, Point3, Rect, Vector2, Vector3};
pub use transform::{
    AffineTransform2D, InvertibleTransform, IterativeInverse, SliceTransform, ThinPlateSpline,
    Transform2D,
};
