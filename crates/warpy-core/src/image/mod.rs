//! Slide images with physical metadata.
//!
//! Registration only needs pixel access per resolution level and the mapping
//! from pixel indices to physical coordinates. [`SlideImage`] captures that
//! contract; [`Image2D`] and [`MultiResolutionImage`] are in-memory
//! implementations.

pub mod image;
pub mod pyramid;
pub mod trait_;

pub use image::Image2D;
pub use pyramid::MultiResolutionImage;
pub use trait_::SlideImage;
