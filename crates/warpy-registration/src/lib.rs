//! Multi-scale, landmark-based non-rigid registration of large 2D slides.
//!
//! The overlap of a fixed and a moving slide is tiled into blocks at
//! successively finer scales. Each block is registered independently by a
//! [`BlockRegistrator`]; the resulting correspondences are interpolated with
//! a thin-plate spline that seeds the next scale.

pub mod block;
pub mod config;
pub mod correlation;
pub mod error;
pub mod multiscale;
pub mod planner;
pub mod points;
pub mod progress;
pub mod sparse;
pub mod spline;
pub mod validation;
pub mod whole_slide;

pub use block::{Block, BlockRegistrator, BlockRequest};
pub use config::{MultiscaleConfig, RegionPolicy, WholeSlideConfig};
pub use correlation::{BlockFailure, BlockMatch, CorrelationBlockRegistrator, CorrelationConfig};
pub use error::{RegistrationError, Result};
pub use multiscale::{
    MultiscaleRegistration, RegistrationInput, RegistrationOutcome, RunStatus, ScaleReport,
};
pub use planner::{BlockPlanner, ScalePlan};
pub use points::{LandmarkPair, PointSet};
pub use progress::{ConsoleTaskSink, TaskHandle, TaskOutcome, TaskSink};
pub use sparse::{register_sparse_landmarks, SparseOutcome};
pub use spline::{SplineFitter, ThinPlateSplineFitter};
pub use whole_slide::WholeSlideRegistration;
