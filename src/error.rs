//! Error types for calibration and artifact emission

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The calibration points cannot produce a unique, invertible homography.
///
/// There is no recovery for the current input: the operator has to pick new
/// calibration points.
#[derive(Debug, Error)]
pub enum DegenerateGeometry {
    #[error("{quad} quad: {first} and {second} corners coincide")]
    DuplicatePoint {
        quad: &'static str,
        first: &'static str,
        second: &'static str,
    },

    #[error("{quad} quad: corners around {corner} are collinear")]
    Collinear {
        quad: &'static str,
        corner: &'static str,
    },

    #[error(
        "{quad} quad: corners are not a convex top-left, top-right, bottom-right, bottom-left sequence (bad turn at {corner})"
    )]
    InconsistentWinding {
        quad: &'static str,
        corner: &'static str,
    },

    #[error("linear system for the homography is singular")]
    SingularSystem,

    #[error("homography is singular (|det| = {det:e})")]
    SingularMatrix { det: f64 },
}

/// The header artifact could not be written.
#[derive(Debug, Error)]
#[error("failed to write {}: {source}", .path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
