use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use warpy_core::transform::InvertibleTransform;
use warpy_core::{Point3, Rect, SliceTransform};
use warpy_registration::{BlockPlanner, MultiscaleConfig, WholeSlideConfig};

mod demo;
mod progress;

#[derive(Parser)]
#[command(name = "warpy")]
#[command(about = "Multi-scale non-rigid registration of large 2D slides")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the block plan for a region
    Plan {
        /// Region as x0,y0,x1,y1 in physical units
        #[arg(value_parser = parse_rect, allow_hyphen_values = true)]
        region: Rect,

        /// Number of scales to plan
        #[arg(short, long, default_value_t = 3)]
        scales: usize,

        /// Multi-scale config (JSON); its scale count is overridden by --scales
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Register a synthetic slide pair with a known warp
    Demo {
        /// Slide size in pixels
        #[arg(long, default_value_t = 384)]
        size: usize,

        /// Number of spline scales
        #[arg(short, long, default_value_t = 3)]
        scales: usize,

        /// Amplitude of the non-rigid part of the warp, in pixels
        #[arg(long, default_value_t = 4.0)]
        amplitude: f64,

        /// Whole-slide config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Register blocks on a single thread
        #[arg(long)]
        serial: bool,

        /// Stop at the next scale boundary after this many seconds
        #[arg(long)]
        time_limit: Option<f64>,

        /// Where to write the resulting transform
        #[arg(short, long, default_value = "warpy_transform.json")]
        output: PathBuf,
    },

    /// Map points through a saved transform
    Apply {
        /// Transform JSON written by `demo`
        transform: PathBuf,

        /// Points as x,y or x,y,z
        #[arg(required = true, allow_hyphen_values = true)]
        points: Vec<String>,

        /// Apply the inverse (fixed to moving)
        #[arg(short, long)]
        inverse: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            region,
            scales,
            config,
        } => {
            print_plan(&region, scales, config.as_deref())?;
        }
        Commands::Demo {
            size,
            scales,
            amplitude,
            config,
            serial,
            time_limit,
            output,
        } => {
            let mut config = match config {
                Some(path) => WholeSlideConfig::from_json_file(&path)?,
                None => WholeSlideConfig::default(),
            };
            config.multiscale.n_scales = scales;
            if serial {
                config.multiscale.parallel = false;
            }
            let options = demo::DemoOptions {
                size,
                amplitude,
                time_limit: time_limit
                    .map(Duration::try_from_secs_f64)
                    .transpose()
                    .context("Invalid --time-limit")?,
            };
            demo::run(&options, config, &output)?;
        }
        Commands::Apply {
            transform,
            points,
            inverse,
        } => {
            apply_transform(&transform, &points, inverse)?;
        }
    }

    Ok(())
}

fn parse_rect(s: &str) -> std::result::Result<Rect, String> {
    let values = parse_numbers(s)?;
    match values.as_slice() {
        [x0, y0, x1, y1] => Ok(Rect::from_bounds(*x0, *y0, *x1, *y1)),
        _ => Err(format!("expected x0,y0,x1,y1, got '{}'", s)),
    }
}

fn parse_numbers(s: &str) -> std::result::Result<Vec<f64>, String> {
    s.split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number '{}': {}", v, e))
        })
        .collect()
}

fn print_plan(region: &Rect, scales: usize, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => MultiscaleConfig::from_json_file(path)?,
        None => MultiscaleConfig::default(),
    };
    let plans = BlockPlanner::from_config(&config).plan(region, scales);
    if plans.is_empty() {
        anyhow::bail!(
            "No scale can be planned over a {} x {} region",
            region.width(),
            region.height()
        );
    }

    println!("Region: {:.4} x {:.4}", region.width(), region.height());
    println!();
    println!("  scale   grid      landmarks   block size");
    for plan in &plans {
        println!(
            "  {:<7} {:<9} {:<11} {:.4} x {:.4}",
            plan.scale,
            format!("{}x{}", plan.columns, plan.rows),
            plan.len(),
            2.0 * plan.block_half_width,
            2.0 * plan.block_half_height
        );
    }
    if plans.len() < scales {
        println!();
        println!("Only {} of {} scales fit the landmark limits.", plans.len(), scales);
    }
    Ok(())
}

fn apply_transform(path: &Path, points: &[String], inverse: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transform {}", path.display()))?;
    let transform: SliceTransform = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse transform {}", path.display()))?;
    info!(
        "Loaded transform with {} spline landmarks",
        transform.xy.landmark_count()
    );

    for raw in points {
        let values = parse_numbers(raw).map_err(anyhow::Error::msg)?;
        let p = match values.as_slice() {
            [x, y] => Point3::new(*x, *y, 0.0),
            [x, y, z] => Point3::new(*x, *y, *z),
            _ => anyhow::bail!("Expected x,y or x,y,z, got '{}'", raw),
        };
        let q = if inverse {
            transform.apply_inverse(&p)
        } else {
            transform.apply(&p)
        };
        println!("{:.6},{:.6},{:.6} -> {:.6},{:.6},{:.6}", p.x, p.y, p.z, q.x, q.y, q.z);
    }
    Ok(())
}
