//! Multi-scale landmark registration.
//!
//! The overlap of the two slides is tiled at successively finer scales. At
//! each scale every landmark is seeded into the moving slide through the
//! current cumulative transform, its block is registered, and a thin-plate
//! spline fitted over that scale's correspondences replaces the cumulative
//! transform. The result maps moving-slide coordinates onto the fixed slide.

use crate::block::{BlockRegistrator, BlockRequest};
use crate::config::{MultiscaleConfig, RegionPolicy};
use crate::error::{RegistrationError, Result};
use crate::planner::{BlockPlanner, ScalePlan};
use crate::points::{LandmarkPair, PointSet};
use crate::progress::{ConsoleTaskSink, TaskOutcome, TaskSink};
use crate::spline::{SplineFitter, ThinPlateSplineFitter};
use crate::validation::{validate_config, validate_timepoint};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use warpy_core::image::SlideImage;
use warpy_core::spatial::is_finite_point;
use warpy_core::transform::{AffineTransform2D, InvertibleTransform, MIN_LANDMARKS};
use warpy_core::{Point2, Rect, SliceTransform, Transform2D};

/// Images and optional constraints of one registration run.
#[derive(Clone)]
pub struct RegistrationInput<'a> {
    pub fixed: &'a dyn SlideImage,
    pub moving: &'a dyn SlideImage,
    /// Region of interest in the fixed frame. The registered area is further
    /// restricted to it.
    pub region: Option<Rect>,
    /// Prior moving → fixed transform, such as the result of an earlier run.
    /// Takes precedence over centring.
    pub initial: Option<Transform2D>,
}

impl<'a> RegistrationInput<'a> {
    pub fn new(fixed: &'a dyn SlideImage, moving: &'a dyn SlideImage) -> Self {
        Self {
            fixed,
            moving,
            region: None,
            initial: None,
        }
    }

    pub fn with_region(mut self, region: Rect) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_initial(mut self, initial: Transform2D) -> Self {
        self.initial = Some(initial);
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Stopped at a scale boundary; `completed_scales` scales were applied.
    Cancelled { completed_scales: usize },
}

impl RunStatus {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunStatus::Cancelled { .. })
    }
}

/// Summary of one completed scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleReport {
    pub scale: usize,
    pub block_half_width: f64,
    pub block_half_height: f64,
    pub landmarks: usize,
    /// Blocks whose registration failed, including those seeded outside the
    /// moving slide; their landmarks kept zero displacement.
    pub failed_blocks: usize,
    pub correspondences: PointSet,
}

/// Result of a registration run.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    /// Maps moving-slide coordinates to fixed-slide coordinates.
    pub transform: SliceTransform,
    pub status: RunStatus,
    pub scales: Vec<ScaleReport>,
}

impl RegistrationOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }

    pub fn completed_scales(&self) -> usize {
        self.scales.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Planning,
    Registering(usize),
    Finalizing,
    Done,
    Cancelled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Planning => write!(f, "planning"),
            RunState::Registering(scale) => write!(f, "registering scale {}", scale),
            RunState::Finalizing => write!(f, "finalizing"),
            RunState::Done => write!(f, "done"),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

fn transition(from: &mut RunState, to: RunState) {
    tracing::debug!("Registration state: {} -> {}", from, to);
    *from = to;
}

/// Correspondences produced by one batch of block registrations.
#[derive(Debug, Clone, Default)]
pub(crate) struct LandmarkBatch {
    pub points: PointSet,
    pub failed: Vec<Point2>,
}

enum BlockResult {
    Registered(LandmarkPair),
    Failed(LandmarkPair),
}

/// Sampling resolution of a block: `pixels_per_block` along its longer side,
/// never finer than the fixed slide's full resolution.
pub(crate) fn block_pixel_size(
    config: &MultiscaleConfig,
    fixed: &dyn SlideImage,
    half_width: f64,
    half_height: f64,
) -> f64 {
    let size = 2.0 * half_width.max(half_height) / config.pixels_per_block as f64;
    size.max(fixed.pixel_size(0))
}

/// Displacement of the block origin encoded by a registrator result, or
/// `None` when the result is unusable.
fn block_displacement(affine: &AffineTransform2D) -> Option<warpy_core::Vector2> {
    if !affine.is_finite() {
        return None;
    }
    let inverse = affine.try_inverse().ok()?;
    let shift = inverse.apply(&Point2::origin()).coords;
    (shift.x.is_finite() && shift.y.is_finite()).then_some(shift)
}

/// Register the blocks around `landmarks`, seeding each through `seed`
/// (fixed → moving).
///
/// Every landmark yields one correspondence, so the batch is index-aligned
/// with `landmarks`. Progress is reported once per landmark.
#[allow(clippy::too_many_arguments)]
pub(crate) fn register_landmarks<R: BlockRegistrator + ?Sized>(
    registrator: &R,
    config: &MultiscaleConfig,
    input: &RegistrationInput<'_>,
    landmarks: &[Point2],
    half_width: f64,
    half_height: f64,
    seed: &Transform2D,
    task: &dyn TaskSink,
) -> LandmarkBatch {
    let pixel_size = block_pixel_size(config, input.fixed, half_width, half_height);
    let (fixed, moving) = (input.fixed, input.moving);

    let register_one = |landmark: &Point2| -> BlockResult {
        let predicted = seed.apply(landmark);
        let request = BlockRequest {
            fixed,
            moving,
            block: crate::block::Block::new(*landmark, half_width, half_height),
            moving_center: predicted,
            pixel_size,
            max_iterations: config.max_iterations,
            timepoint: config.timepoint,
            show_details: config.show_details,
        };
        let result = registrator.register_block(&request);
        task.report_progress(1);
        match result.as_ref().and_then(block_displacement) {
            Some(shift) => {
                BlockResult::Registered(LandmarkPair::new(*landmark, predicted + shift))
            }
            None => BlockResult::Failed(LandmarkPair::new(*landmark, predicted)),
        }
    };

    let results: Vec<BlockResult> = if config.runs_parallel() {
        landmarks.par_iter().map(&register_one).collect()
    } else {
        landmarks.iter().map(&register_one).collect()
    };

    let mut batch = LandmarkBatch {
        points: PointSet::with_capacity(results.len()),
        ..LandmarkBatch::default()
    };
    for result in results {
        match result {
            BlockResult::Registered(pair) => batch.points.push(pair),
            BlockResult::Failed(pair) => {
                tracing::debug!(
                    "Block at ({:.4}, {:.4}) failed, keeping zero displacement",
                    pair.fixed.x,
                    pair.fixed.y
                );
                batch.failed.push(pair.fixed);
                batch.points.push(pair);
            }
        }
    }
    batch
}

/// Coarse-to-fine spline registration driven by a block registrator.
pub struct MultiscaleRegistration<R, F = ThinPlateSplineFitter> {
    registrator: R,
    fitter: F,
    config: MultiscaleConfig,
}

impl<R: BlockRegistrator> MultiscaleRegistration<R> {
    /// Create a registration using the thin-plate spline fitter configured
    /// by `config`.
    pub fn new(registrator: R, config: MultiscaleConfig) -> Self {
        let fitter = ThinPlateSplineFitter::from_config(&config);
        Self {
            registrator,
            fitter,
            config,
        }
    }
}

impl<R: BlockRegistrator, F: SplineFitter> MultiscaleRegistration<R, F> {
    /// Replace the spline fitter.
    pub fn with_fitter<G: SplineFitter>(self, fitter: G) -> MultiscaleRegistration<R, G> {
        MultiscaleRegistration {
            registrator: self.registrator,
            fitter,
            config: self.config,
        }
    }

    pub fn config(&self) -> &MultiscaleConfig {
        &self.config
    }

    pub fn registrator(&self) -> &R {
        &self.registrator
    }

    /// Initial fixed → moving transform that seeds scale 0.
    pub fn seed_transform(&self, input: &RegistrationInput<'_>) -> Transform2D {
        if let Some(initial) = &input.initial {
            if self.config.center_moving {
                tracing::debug!("Initial transform given, centring ignored");
            }
            return initial.inverse();
        }
        if self.config.center_moving {
            let offset = input.moving.extent().center() - input.fixed.extent().center();
            return Transform2D::translation(offset.x, offset.y);
        }
        Transform2D::identity()
    }

    /// Region of the fixed frame that will be registered.
    pub fn region(&self, input: &RegistrationInput<'_>, seed: &Transform2D) -> Rect {
        let fixed_extent = input.fixed.extent();
        let mapped: Vec<Point2> = input
            .moving
            .extent()
            .corners()
            .iter()
            .map(|c| seed.apply_inverse(c))
            .collect();
        let overlap = match Rect::bounding(mapped.iter()) {
            Some(moving_extent) if mapped.iter().all(|p| is_finite_point(p)) => {
                match self.config.region_policy {
                    RegionPolicy::Intersection => fixed_extent.intersection(&moving_extent),
                    RegionPolicy::Union => fixed_extent.union(&moving_extent),
                }
            }
            _ => fixed_extent,
        };
        match &input.region {
            Some(roi) => overlap.intersection(roi),
            None => overlap,
        }
    }

    /// Scale plan for `input`, as `register` would compute it.
    pub fn plan(&self, input: &RegistrationInput<'_>) -> Result<Vec<ScalePlan>> {
        let seed = self.seed_transform(input);
        let region = self.region(input, &seed);
        self.plan_region(&region)
    }

    fn plan_region(&self, region: &Rect) -> Result<Vec<ScalePlan>> {
        let plans = BlockPlanner::from_config(&self.config).plan(region, self.config.n_scales);
        if plans.is_empty() {
            return Err(RegistrationError::planning(format!(
                "no scale with at least {} landmarks fits in a {:.4} x {:.4} region",
                self.config.min_landmarks_per_scale,
                region.width(),
                region.height()
            )));
        }
        if plans.len() < self.config.n_scales {
            return Err(RegistrationError::planning(format!(
                "only {} of {} requested scales fit in a {:.4} x {:.4} region",
                plans.len(),
                self.config.n_scales,
                region.width(),
                region.height()
            )));
        }
        Ok(plans)
    }

    /// Run the registration.
    ///
    /// When `task` is `None` a console sink is created and finished by this
    /// call. An injected task is only reported to, never finished.
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

    pub(crate) fn run(
        &self,
        input: &RegistrationInput<'_>,
        task: &dyn TaskSink,
    ) -> Result<RegistrationOutcome> {
        let mut state = RunState::Idle;
        validate_config(&self.config)?;
        validate_timepoint(input.fixed, input.moving, self.config.timepoint)?;

        transition(&mut state, RunState::Planning);
        let seed = self.seed_transform(input);
        let region = self.region(input, &seed);
        let plans = self.plan_region(&region)?;

        let total: usize = plans.iter().map(ScalePlan::len).sum();
        tracing::info!(
            "Registering {} scales ({} blocks) over [{:.4}, {:.4}] x [{:.4}, {:.4}]",
            plans.len(),
            total,
            region.min.x,
            region.max.x,
            region.min.y,
            region.max.y
        );
        task.start("Multiscale registration", total);

        let start = Instant::now();
        let mut cumulative = seed;
        let mut reports: Vec<ScaleReport> = Vec::with_capacity(plans.len());

        for plan in &plans {
            if task.is_cancelled() {
                transition(&mut state, RunState::Cancelled);
                tracing::info!(
                    "Registration cancelled after {} of {} scales",
                    reports.len(),
                    plans.len()
                );
                let status = RunStatus::Cancelled {
                    completed_scales: reports.len(),
                };
                return Ok(self.outcome(input, &cumulative, status, reports));
            }
            transition(&mut state, RunState::Registering(plan.scale));

            let batch = register_landmarks(
                &self.registrator,
                &self.config,
                input,
                &plan.landmarks,
                plan.block_half_width,
                plan.block_half_height,
                &cumulative,
                task,
            );

            if !batch.failed.is_empty() {
                tracing::warn!(
                    "Scale {}: {} of {} blocks failed",
                    plan.scale,
                    batch.failed.len(),
                    plan.len()
                );
            }
            if batch.points.len() < MIN_LANDMARKS {
                return Err(RegistrationError::InsufficientLandmarks {
                    scale: plan.scale,
                    found: batch.points.len(),
                    required: MIN_LANDMARKS,
                });
            }

            cumulative = self.fitter.fit(&batch.points)?;

            tracing::info!(
                "Scale {}/{}: {} landmarks, block {:.4} x {:.4}, max shift {:.4} | {:.2}s",
                plan.scale + 1,
                plans.len(),
                batch.points.len(),
                2.0 * plan.block_half_width,
                2.0 * plan.block_half_height,
                batch.points.max_displacement(),
                start.elapsed().as_secs_f64()
            );

            reports.push(ScaleReport {
                scale: plan.scale,
                block_half_width: plan.block_half_width,
                block_half_height: plan.block_half_height,
                landmarks: plan.len(),
                failed_blocks: batch.failed.len(),
                correspondences: batch.points,
            });
        }

        transition(&mut state, RunState::Finalizing);
        let outcome = self.outcome(input, &cumulative, RunStatus::Completed, reports);
        transition(&mut state, RunState::Done);
        Ok(outcome)
    }

    fn outcome(
        &self,
        input: &RegistrationInput<'_>,
        cumulative: &Transform2D,
        status: RunStatus,
        scales: Vec<ScaleReport>,
    ) -> RegistrationOutcome {
        RegistrationOutcome {
            transform: SliceTransform::new(cumulative.inverse(), z_shift(&self.config, input)),
            status,
            scales,
        }
    }
}

/// z translation restoring the fixed slide's plane.
pub(crate) fn z_shift(config: &MultiscaleConfig, input: &RegistrationInput<'_>) -> f64 {
    if config.remove_z_offset {
        input.fixed.z_origin() - input.moving.z_origin()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::TaskHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warpy_core::{Image2D, Vector2};

    fn slide(size: usize) -> Image2D {
        Image2D::from_fn(size, size, Point2::origin(), Vector2::new(1.0, 1.0), |x, y| {
            ((x * 7 + y * 13) % 17) as f32
        })
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RunState::Registering(2).to_string(), "registering scale 2");
        assert_eq!(RunState::Idle.to_string(), "idle");
    }

    #[test]
    fn test_block_displacement() {
        let shift = block_displacement(&AffineTransform2D::translation(-2.0, 1.0)).unwrap();
        assert_eq!(shift, Vector2::new(2.0, -1.0));
        let singular = AffineTransform2D::new(nalgebra::Matrix2::zeros(), Vector2::zeros());
        assert!(block_displacement(&singular).is_none());
    }

    #[test]
    fn test_identity_registrator_gives_identity() {
        let image = slide(101);
        let registration = MultiscaleRegistration::new(
            |_: &BlockRequest<'_>| Some(AffineTransform2D::identity()),
            MultiscaleConfig::default().with_scales(2).serial(),
        );
        let outcome = registration
            .register(&RegistrationInput::new(&image, &image), None)
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.completed_scales(), 2);
        let p = Point2::new(33.0, 71.0);
        assert!((outcome.transform.xy.apply(&p) - p).norm() < 1e-8);
    }

    #[test]
    fn test_landmarks_outside_moving_slide_are_registered() {
        let fixed = slide(101);
        let moving = Image2D::from_fn(60, 101, Point2::origin(), Vector2::new(1.0, 1.0), |x, y| {
            (x + y) as f32
        });
        let calls = AtomicUsize::new(0);
        let registration = MultiscaleRegistration::new(
            |_: &BlockRequest<'_>| {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(AffineTransform2D::identity())
            },
            MultiscaleConfig::default()
                .with_scales(2)
                .with_region_policy(RegionPolicy::Union)
                .serial(),
        );
        let task = Arc::new(TaskHandle::new());
        let outcome = registration
            .register(&RegistrationInput::new(&fixed, &moving), Some(task.clone()))
            .unwrap();

        let landmarks: usize = outcome.scales.iter().map(|s| s.landmarks).sum();
        assert_eq!(calls.load(Ordering::SeqCst), landmarks);
        assert_eq!(task.progress(), landmarks);
        assert_eq!(task.progress(), task.total());
        for report in &outcome.scales {
            assert_eq!(report.correspondences.len(), report.landmarks);
        }
    }

    #[test]
    fn test_roi_restricts_region() {
        let image = slide(101);
        let registration = MultiscaleRegistration::new(
            |_: &BlockRequest<'_>| Some(AffineTransform2D::identity()),
            MultiscaleConfig::default(),
        );
        let roi = Rect::from_bounds(10.0, 10.0, 30.0, 50.0);
        let input = RegistrationInput::new(&image, &image).with_region(roi);
        for plan in registration.plan(&input).unwrap() {
            assert!(plan.landmarks.iter().all(|p| roi.contains(p)));
        }
    }
}
