//! Validation of registration inputs.

use crate::config::{MultiscaleConfig, WholeSlideConfig};
use crate::error::{RegistrationError, Result};
use warpy_core::image::SlideImage;
use warpy_core::transform::MIN_LANDMARKS;

/// Validate the requested scale count.
pub fn validate_scale_count(n_scales: usize) -> Result<()> {
    if n_scales < 2 {
        return Err(RegistrationError::invalid_configuration(format!(
            "At least 2 scales are required, got {}",
            n_scales
        )));
    }
    if n_scales > 16 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Scale count too large: {}",
            n_scales
        )));
    }
    Ok(())
}

/// Validate iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Iterations must be positive",
        ));
    }

    if iterations > 1_000_000 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Iterations too large: {}",
            iterations
        )));
    }

    Ok(())
}

/// Validate the per-block sampling resolution.
pub fn validate_block_pixels(pixels: usize) -> Result<()> {
    if pixels < 8 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Blocks need at least 8 pixels per side, got {}",
            pixels
        )));
    }
    Ok(())
}

/// Validate a multi-scale config.
pub fn validate_config(config: &MultiscaleConfig) -> Result<()> {
    validate_scale_count(config.n_scales)?;
    validate_iterations(config.max_iterations)?;
    validate_block_pixels(config.pixels_per_block)?;

    if config.min_landmarks_per_scale < MIN_LANDMARKS {
        return Err(RegistrationError::invalid_configuration(format!(
            "min_landmarks_per_scale must be at least {}, got {}",
            MIN_LANDMARKS, config.min_landmarks_per_scale
        )));
    }
    if config.max_landmarks_per_scale < config.min_landmarks_per_scale {
        return Err(RegistrationError::invalid_configuration(format!(
            "max_landmarks_per_scale ({}) is below min_landmarks_per_scale ({})",
            config.max_landmarks_per_scale, config.min_landmarks_per_scale
        )));
    }
    if config.max_plan_iterations == 0 {
        return Err(RegistrationError::invalid_configuration(
            "max_plan_iterations must be positive",
        ));
    }
    if !(config.regularization >= 0.0 && config.regularization.is_finite()) {
        return Err(RegistrationError::invalid_configuration(format!(
            "Regularization must be finite and non-negative, got {}",
            config.regularization
        )));
    }
    if !(config.inverse.tolerance > 0.0) || config.inverse.max_iterations == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Inverse solver needs a positive tolerance and iteration count",
        ));
    }
    Ok(())
}

/// Validate a whole-slide config.
pub fn validate_whole_slide_config(config: &WholeSlideConfig) -> Result<()> {
    if config.initial_affine {
        validate_iterations(config.affine_iterations)?;
        validate_block_pixels(config.affine_pixels)?;
    }
    if config.spline {
        validate_config(&config.multiscale)?;
    }
    if !config.initial_affine && !config.spline {
        return Err(RegistrationError::invalid_configuration(
            "Both affine and spline stages are disabled",
        ));
    }
    Ok(())
}

/// Validate that the requested timepoint exists in both images.
pub fn validate_timepoint(
    fixed: &dyn SlideImage,
    moving: &dyn SlideImage,
    timepoint: usize,
) -> Result<()> {
    for (name, image) in [("fixed", fixed), ("moving", moving)] {
        if timepoint >= image.num_timepoints() {
            return Err(RegistrationError::invalid_configuration(format!(
                "Timepoint {} out of range for {} image ({} timepoints)",
                timepoint,
                name,
                image.num_timepoints()
            )));
        }
    }
    Ok(())
}
