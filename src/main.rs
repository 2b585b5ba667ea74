//! ipmgen - Inverse perspective mapping matrix generator
//!
//! Computes the homography from four calibrated camera-frame corners to a
//! bird's-eye output rectangle, inverts it, and writes the inverse as a C
//! header for an embedded target that cannot run the calibration itself.

mod calibration;
mod config;
mod error;
mod output;
mod transform;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::output::CalibrationArtifact;

/// ipmgen - generate an IPM lookup matrix header from calibration points
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "ipm.toml")]
    config: PathBuf,

    /// Header file to write (overrides the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the header to stdout instead of writing a file
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging. Logs go to stderr so --stdout stays clean.
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!("ipmgen v{}", env!("CARGO_PKG_VERSION"));

    // Load or create configuration; a --stdout dry run never writes one
    let config = if args.stdout {
        config::Config::load_or_default(&args.config)?
    } else {
        config::Config::load_or_create(&args.config)?
    };
    config.validate().context("Invalid configuration")?;

    let dims = config.dimensions;
    info!("Source size: {}x{}", dims.src_width, dims.src_height);
    info!("Output size: {}x{}", dims.out_width, dims.out_height);

    let correspondence = config.calibration.correspondence(&dims);
    let inverse = transform::solve(&correspondence)
        .context("Calibration points do not define a usable perspective mapping; re-calibrate")?;

    for row in inverse.rows() {
        info!("H^-1 row: [{:.8}, {:.8}, {:.8}]", row[0], row[1], row[2]);
    }

    let coverage = transform::coverage(&inverse, &dims);
    if coverage.is_complete() {
        info!("Lookup coverage: all {} output pixels map into the source frame", coverage.total);
    } else {
        warn!(
            "Lookup coverage: {}/{} output pixels ({:.1}%) map into the source frame; the rest get marker {}",
            coverage.valid,
            coverage.total,
            coverage.ratio() * 100.0,
            output::INVALID_MARKER
        );
    }

    let artifact = CalibrationArtifact::new(inverse, dims);

    if args.stdout {
        output::emit_to(&artifact, std::io::stdout().lock())
            .context("Failed to write header to stdout")?;
        return Ok(());
    }

    let destination = args.output.unwrap_or(config.output.path);
    output::emit(&artifact, &destination)?;
    info!("Success! Generated {}", destination.display());

    Ok(())
}
