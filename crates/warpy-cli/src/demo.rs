//! Synthetic registration run with a known ground-truth warp.

use crate::progress::ProgressBarSink;
use anyhow::{Context, Result};
use std::f64::consts::TAU;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use warpy_core::transform::InvertibleTransform;
use warpy_core::{Image2D, MultiResolutionImage, Point2, Vector2};
use warpy_registration::{
    CorrelationBlockRegistrator, CorrelationConfig, RegistrationInput, RegistrationOutcome,
    RunStatus, TaskOutcome, TaskSink, WholeSlideConfig, WholeSlideRegistration,
};

const PYRAMID_LEVELS: usize = 5;
const MIN_SIZE: usize = 64;

pub struct DemoOptions {
    pub size: usize,
    pub amplitude: f64,
    pub time_limit: Option<Duration>,
}

/// Moving → fixed ground truth: a translation plus a sinusoidal wobble.
struct KnownWarp {
    shift: Vector2,
    amplitude: f64,
    period: f64,
}

impl KnownWarp {
    fn new(size: usize, amplitude: f64) -> Self {
        Self {
            shift: Vector2::new(6.0, -4.0),
            amplitude,
            period: size as f64 / 2.0,
        }
    }

    fn moving_to_fixed(&self, q: &Point2) -> Point2 {
        Point2::new(
            q.x + self.shift.x + self.amplitude * (TAU * q.y / self.period).sin(),
            q.y + self.shift.y + self.amplitude * (TAU * q.x / self.period).cos(),
        )
    }
}

/// Gaussian blobs scattered along a low-discrepancy sequence.
struct BlobField {
    blobs: Vec<(Point2, f64)>,
}

impl BlobField {
    fn new(size: usize) -> Self {
        let count = (size * size / 200).max(16);
        let extent = size as f64;
        let blobs = (0..count)
            .map(|i| {
                let i = i as f64;
                let center = Point2::new(
                    extent * (0.5 + i * 0.618_034).fract(),
                    extent * (0.5 + i * 0.754_878).fract(),
                );
                let sigma = 2.5 + 2.5 * (i * 0.569_840).fract();
                (center, sigma)
            })
            .collect();
        Self { blobs }
    }

    fn value(&self, p: &Point2) -> f32 {
        self.blobs
            .iter()
            .map(|(c, sigma)| {
                let d2 = (p - c).norm_squared();
                if d2 > 25.0 * sigma * sigma {
                    0.0
                } else {
                    (-d2 / (2.0 * sigma * sigma)).exp()
                }
            })
            .sum::<f64>() as f32
    }
}

fn render(size: usize, f: impl Fn(&Point2) -> f32) -> MultiResolutionImage {
    let base = Image2D::from_fn(size, size, Point2::origin(), Vector2::new(1.0, 1.0), |x, y| {
        f(&Point2::new(x as f64, y as f64))
    });
    MultiResolutionImage::new(base, PYRAMID_LEVELS)
}

struct Residuals {
    mean: f64,
    max: f64,
}

/// Distance between `mapped(q)` and the ground truth over an interior grid
/// of the moving slide.
fn residuals(size: usize, warp: &KnownWarp, mapped: impl Fn(&Point2) -> Point2) -> Residuals {
    let margin = size as f64 / 8.0;
    let step = (size as f64 - 2.0 * margin) / 15.0;
    let errors: Vec<f64> = (0..16)
        .flat_map(|j| (0..16).map(move |i| (i, j)))
        .map(|(i, j)| {
            let q = Point2::new(margin + i as f64 * step, margin + j as f64 * step);
            (mapped(&q) - warp.moving_to_fixed(&q)).norm()
        })
        .collect();
    Residuals {
        mean: errors.iter().sum::<f64>() / errors.len() as f64,
        max: errors.iter().cloned().fold(0.0, f64::max),
    }
}

pub fn run(options: &DemoOptions, config: WholeSlideConfig, output: &Path) -> Result<()> {
    if options.size < MIN_SIZE {
        anyhow::bail!("Slide size must be at least {} pixels, got {}", MIN_SIZE, options.size);
    }

    let warp = KnownWarp::new(options.size, options.amplitude);
    let field = BlobField::new(options.size);
    info!(
        "Rendering {}x{} synthetic pair ({} blobs)",
        options.size,
        options.size,
        field.blobs.len()
    );
    let fixed = render(options.size, |p| field.value(p));
    let moving = render(options.size, |q| field.value(&warp.moving_to_fixed(q)));

    let registration = WholeSlideRegistration::new(
        CorrelationBlockRegistrator::new(CorrelationConfig::default()),
        config,
    );
    let sink = Arc::new(ProgressBarSink::new(options.time_limit));
    let result = registration.register(
        &RegistrationInput::new(&fixed, &moving),
        Some(sink.clone() as Arc<dyn TaskSink>),
    );
    sink.finish(match &result {
        Ok(outcome) if outcome.is_cancelled() => TaskOutcome::Cancelled,
        Ok(_) => TaskOutcome::Completed,
        Err(_) => TaskOutcome::Failed,
    });
    let outcome = result.context("Registration failed")?;

    print_report(options.size, &warp, &outcome);

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &outcome.transform)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Transform written to {}", output.display());
    Ok(())
}

fn print_report(size: usize, warp: &KnownWarp, outcome: &RegistrationOutcome) {
    match outcome.status {
        RunStatus::Completed => println!("Status: completed"),
        RunStatus::Cancelled { completed_scales } => {
            println!("Status: stopped after {} scales", completed_scales)
        }
    }
    println!();
    println!("  scale   blocks   failed   block size");
    for report in &outcome.scales {
        println!(
            "  {:<7} {:<8} {:<8} {:.1} x {:.1}",
            report.scale,
            report.landmarks,
            report.failed_blocks,
            2.0 * report.block_half_width,
            2.0 * report.block_half_height
        );
    }

    let before = residuals(size, warp, |q| *q);
    let after = residuals(size, warp, |q| outcome.transform.xy.apply(q));
    println!();
    println!("Residual (px): mean {:.3}, max {:.3}", after.mean, after.max);
    println!("Unregistered:  mean {:.3}, max {:.3}", before.mean, before.max);
}
