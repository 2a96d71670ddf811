//! Registration at caller-chosen landmarks.
//!
//! Instead of a planned grid, blocks are registered around a given set of
//! fixed-frame points at a single block size, and one spline is fitted over
//! the result. Useful to refine an existing transform where the tissue has
//! content.

use crate::block::BlockRegistrator;
use crate::config::MultiscaleConfig;
use crate::error::{RegistrationError, Result};
use crate::multiscale::{register_landmarks, z_shift, RegistrationInput};
use crate::points::PointSet;
use crate::progress::TaskSink;
use crate::spline::{SplineFitter, ThinPlateSplineFitter};
use crate::validation::{validate_config, validate_timepoint};
use warpy_core::transform::MIN_LANDMARKS;
use warpy_core::{Point2, SliceTransform, Transform2D};

/// Result of [`register_sparse_landmarks`].
#[derive(Debug, Clone)]
pub struct SparseOutcome {
    /// Maps moving-slide coordinates to fixed-slide coordinates.
    pub transform: SliceTransform,
    pub correspondences: PointSet,
    /// Landmarks whose block failed; they kept the seeded position.
    pub failed: Vec<Point2>,
}

/// Register blocks of `half_width` x `half_height` around `landmarks` and fit
/// a thin-plate spline over the correspondences.
///
/// Landmarks are seeded through `input.initial` when present. Progress is
/// reported to `task` once per landmark; cancellation is not checked, since
/// the whole call is a single scale.
pub fn register_sparse_landmarks<R: BlockRegistrator + ?Sized>(
    registrator: &R,
    config: &MultiscaleConfig,
    input: &RegistrationInput<'_>,
    landmarks: &[Point2],
    half_width: f64,
    half_height: f64,
    task: &dyn TaskSink,
) -> Result<SparseOutcome> {
    validate_config(config)?;
    validate_timepoint(input.fixed, input.moving, config.timepoint)?;
    if !(half_width > 0.0 && half_height > 0.0) {
        return Err(RegistrationError::invalid_configuration(format!(
            "Block half extent must be positive, got {} x {}",
            half_width, half_height
        )));
    }
    if landmarks.len() < MIN_LANDMARKS {
        return Err(RegistrationError::InsufficientLandmarks {
            scale: 0,
            found: landmarks.len(),
            required: MIN_LANDMARKS,
        });
    }

    let seed = input
        .initial
        .as_ref()
        .map(Transform2D::inverse)
        .unwrap_or_default();

    task.start("Sparse landmark registration", landmarks.len());
    let batch = register_landmarks(
        registrator,
        config,
        input,
        landmarks,
        half_width,
        half_height,
        &seed,
        task,
    );

    let fitted = ThinPlateSplineFitter::from_config(config).fit(&batch.points)?;
    tracing::info!(
        "Sparse registration: {} correspondences, {} failed",
        batch.points.len(),
        batch.failed.len()
    );

    Ok(SparseOutcome {
        transform: SliceTransform::new(fitted.inverse(), z_shift(config, input)),
        correspondences: batch.points,
        failed: batch.failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockRequest;
    use crate::progress::TaskHandle;
    use warpy_core::transform::{AffineTransform2D, InvertibleTransform};
    use warpy_core::{Image2D, Vector2};

    fn slide() -> Image2D {
        Image2D::from_fn(64, 64, Point2::origin(), Vector2::new(0.5, 0.5), |x, y| {
            ((x ^ y) % 9) as f32
        })
    }

    fn landmarks() -> Vec<Point2> {
        vec![
            Point2::new(4.0, 4.0),
            Point2::new(26.0, 5.0),
            Point2::new(6.0, 27.0),
            Point2::new(25.0, 24.0),
            Point2::new(15.0, 16.0),
        ]
    }

    #[test]
    fn test_sparse_translation() {
        let image = slide();
        let registrator = |_: &BlockRequest<'_>| Some(AffineTransform2D::translation(0.5, -1.0));
        let task = TaskHandle::new();
        let outcome = register_sparse_landmarks(
            &registrator,
            &MultiscaleConfig::default().serial(),
            &RegistrationInput::new(&image, &image),
            &landmarks(),
            2.0,
            2.0,
            &task,
        )
        .unwrap();

        assert_eq!(task.progress(), 5);
        assert_eq!(outcome.correspondences.len(), 5);
        assert!(outcome.failed.is_empty());
        // Moving = fixed + (-0.5, 1), so the result maps back by (0.5, -1).
        let q = outcome.transform.xy.apply(&Point2::new(10.0, 10.0));
        assert!((q - Point2::new(10.5, 9.0)).norm() < 1e-6);
    }

    #[test]
    fn test_too_few_landmarks() {
        let image = slide();
        let registrator = |_: &BlockRequest<'_>| Some(AffineTransform2D::identity());
        let result = register_sparse_landmarks(
            &registrator,
            &MultiscaleConfig::default(),
            &RegistrationInput::new(&image, &image),
            &landmarks()[..3],
            2.0,
            2.0,
            &TaskHandle::new(),
        );
        assert!(matches!(
            result,
            Err(RegistrationError::InsufficientLandmarks { found: 3, .. })
        ));
    }
}
