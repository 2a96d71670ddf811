//! Error types for registration runs.
//!
//! Only planning failures, insufficient landmarks, invalid configuration and
//! spline fit failures surface to the caller. Failed blocks are absorbed, and
//! cancellation is reported through [`crate::RunStatus`].

use thiserror::Error;
use warpy_core::TransformError;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// No usable scale could be planned (degenerate region, unreachable
    /// scale count). Raised before any block is registered.
    #[error("Registration planning error: {0}")]
    Planning(String),

    /// A scale produced too few correspondences to fit a spline.
    #[error("Insufficient landmarks at scale {scale}: {found} found, {required} required")]
    InsufficientLandmarks {
        scale: usize,
        found: usize,
        required: usize,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Transform fitting failed.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a planning error.
    pub fn planning(msg: impl Into<String>) -> Self {
        Self::Planning(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistrationError::planning("empty region");
        assert_eq!(err.to_string(), "Registration planning error: empty region");
    }

    #[test]
    fn test_insufficient_landmarks_display() {
        let err = RegistrationError::InsufficientLandmarks {
            scale: 2,
            found: 1,
            required: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("scale 2"));
        assert!(msg.contains("1 usable"));
    }

    #[test]
    fn test_from_transform_error() {
        let err: RegistrationError = TransformError::degenerate("collinear").into();
        assert!(matches!(err, RegistrationError::Transform(_)));
    }
}
