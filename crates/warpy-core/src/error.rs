//! Error types for transform construction.

use thiserror::Error;

/// Errors raised while building or fitting transforms.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Too few landmark pairs for the requested fit.
    #[error("Insufficient landmarks: {found} supplied, at least {required} required")]
    InsufficientLandmarks { found: usize, required: usize },

    /// Source and target landmark lists differ in length.
    #[error("Landmark count mismatch: {source_count} source vs {target_count} target points")]
    LandmarkMismatch {
        source_count: usize,
        target_count: usize,
    },

    /// Landmarks are collinear, coincident or non-finite.
    #[error("Degenerate landmarks: {0}")]
    DegenerateLandmarks(String),

    /// The interpolation system could not be solved.
    #[error("Singular system while fitting {0}")]
    SingularSystem(String),

    /// The transform has no inverse.
    #[error("Transform is not invertible: {0}")]
    NonInvertible(String),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

impl TransformError {
    /// Create a degenerate landmark error.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateLandmarks(msg.into())
    }

    /// Create a singular system error.
    pub fn singular(msg: impl Into<String>) -> Self {
        Self::SingularSystem(msg.into())
    }

    /// Create a non-invertible error.
    pub fn non_invertible(msg: impl Into<String>) -> Self {
        Self::NonInvertible(msg.into())
    }
}
