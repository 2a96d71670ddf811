//! Whole-slide registration: a global affine followed by multi-scale splines.

use crate::block::{Block, BlockRegistrator, BlockRequest};
use crate::config::WholeSlideConfig;
use crate::error::{RegistrationError, Result};
use crate::multiscale::{
    z_shift, MultiscaleRegistration, RegistrationInput, RegistrationOutcome, RunStatus,
};
use crate::progress::{ConsoleTaskSink, TaskOutcome, TaskSink};
use crate::spline::{SplineFitter, ThinPlateSplineFitter};
use crate::validation::{validate_timepoint, validate_whole_slide_config};
use std::sync::Arc;
use warpy_core::transform::{AffineTransform2D, InvertibleTransform};
use warpy_core::{SliceTransform, Transform2D};

/// Two-stage registration pipeline.
///
/// The affine stage registers the whole overlap as a single coarse block.
/// Its result seeds the spline stage, which replaces any `initial` transform
/// of the input.
pub struct WholeSlideRegistration<R, F = ThinPlateSplineFitter> {
    multiscale: MultiscaleRegistration<R, F>,
    config: WholeSlideConfig,
}

impl<R: BlockRegistrator> WholeSlideRegistration<R> {
    pub fn new(registrator: R, config: WholeSlideConfig) -> Self {
        Self {
            multiscale: MultiscaleRegistration::new(registrator, config.multiscale.clone()),
            config,
        }
    }
}

impl<R: BlockRegistrator, F: SplineFitter> WholeSlideRegistration<R, F> {
    pub fn with_fitter<G: SplineFitter>(self, fitter: G) -> WholeSlideRegistration<R, G> {
        WholeSlideRegistration {
            multiscale: self.multiscale.with_fitter(fitter),
            config: self.config,
        }
    }

    pub fn config(&self) -> &WholeSlideConfig {
        &self.config
    }

    pub fn multiscale(&self) -> &MultiscaleRegistration<R, F> {
        &self.multiscale
    }

    /// Register the overlap with one affine block.
    ///
    /// Returns the moving → fixed affine. When the block fails, the result
    /// only aligns the overlap centres.
    pub fn register_affine(&self, input: &RegistrationInput<'_>) -> Result<AffineTransform2D> {
        let seed = self.multiscale.seed_transform(input);
        let region = self.multiscale.region(input, &seed);
        if region.is_degenerate() {
            return Err(RegistrationError::planning(format!(
                "slides do not overlap ({:.4} x {:.4} region)",
                region.width(),
                region.height()
            )));
        }

        let center = region.center();
        let moving_center = seed.apply(&center);
        let block = Block::new(center, 0.5 * region.width(), 0.5 * region.height());
        let pixel_size = (region.width().max(region.height()) / self.config.affine_pixels as f64)
            .max(input.fixed.pixel_size(0));
        let request = BlockRequest {
            fixed: input.fixed,
            moving: input.moving,
            block,
            moving_center,
            pixel_size,
            max_iterations: self.config.affine_iterations,
            timepoint: self.config.multiscale.timepoint,
            show_details: self.config.multiscale.show_details,
        };

        let to_fixed_center = AffineTransform2D::translation(-center.x, -center.y);
        let from_moving_center = AffineTransform2D::translation(moving_center.x, moving_center.y);
        let local = match self.multiscale.registrator().register_block(&request) {
            Some(found) if found.is_finite() => match found.try_inverse() {
                Ok(inverse) => inverse,
                Err(e) => {
                    tracing::warn!("Affine stage returned a singular transform: {}", e);
                    AffineTransform2D::identity()
                }
            },
            _ => {
                tracing::warn!("Affine stage failed, aligning overlap centres only");
                AffineTransform2D::identity()
            }
        };

        // fixed -> fixed-local -> moving-local -> moving
        let fixed_to_moving = to_fixed_center.then(&local).then(&from_moving_center);
        tracing::info!(
            "Affine stage: determinant {:.4}, centre ({:.4}, {:.4}) -> ({:.4}, {:.4})",
            fixed_to_moving.determinant(),
            center.x,
            center.y,
            moving_center.x,
            moving_center.y
        );
        Ok(fixed_to_moving.try_inverse()?)
    }

    /// Run the enabled stages. Task ownership follows
    /// [`MultiscaleRegistration::register`].
    pub fn register(
        &self,
        input: &RegistrationInput<'_>,
        task: Option<Arc<dyn TaskSink>>,
    ) -> Result<RegistrationOutcome> {
        let (task, owned): (Arc<dyn TaskSink>, bool) = match task {
            Some(task) => (task, false),
            None => (Arc::new(ConsoleTaskSink::default()) as Arc<dyn TaskSink>, true),
        };

        let result = self.run(input, task.as_ref());

        if owned {
            task.finish(match &result {
                Ok(outcome) if outcome.is_cancelled() => TaskOutcome::Cancelled,
                Ok(_) => TaskOutcome::Completed,
                Err(_) => TaskOutcome::Failed,
            });
        }
        result
    }

    fn run(
        &self,
        input: &RegistrationInput<'_>,
        task: &dyn TaskSink,
    ) -> Result<RegistrationOutcome> {
        validate_whole_slide_config(&self.config)?;
        validate_timepoint(input.fixed, input.moving, self.config.multiscale.timepoint)?;

        if !self.config.initial_affine {
            return self.multiscale.run(input, task);
        }

        task.start("Affine registration", 1);
        let affine = self.register_affine(input)?;
        task.report_progress(1);

        let z = z_shift(&self.config.multiscale, input);
        if !self.config.spline || task.is_cancelled() {
            let status = if self.config.spline {
                tracing::info!("Registration cancelled after the affine stage");
                RunStatus::Cancelled {
                    completed_scales: 0,
                }
            } else {
                RunStatus::Completed
            };
            return Ok(RegistrationOutcome {
                transform: SliceTransform::new(Transform2D::Affine(affine), z),
                status,
                scales: Vec::new(),
            });
        }

        let seeded = input.clone().with_initial(Transform2D::Affine(affine));
        self.multiscale.run(&seeded, task)
    }
}
