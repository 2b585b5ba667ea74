//! Calibration point correspondence and quad validation

use crate::config::{Calibration, Dimensions, Point, Quad};
use crate::error::DegenerateGeometry;

/// Minimum separation for two corners to count as distinct, in pixels
const DUPLICATE_EPSILON: f64 = 1e-9;

/// Relative tolerance on the turn at a corner (sine of the corner angle)
const COLLINEAR_EPSILON: f64 = 1e-9;

const CORNER_LABELS: [&str; 4] = ["top-left", "top-right", "bottom-right", "bottom-left"];

/// Human readable name of a corner index
pub fn corner_label(i: usize) -> &'static str {
    CORNER_LABELS.get(i).copied().unwrap_or("unknown")
}

/// Positional 1:1 mapping between a camera quad and the output rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub src: Quad,
    pub dst: Quad,
}

impl Correspondence {
    pub fn new(src: Quad, dst: Quad) -> Self {
        Self { src, dst }
    }

    /// Validate both quads
    pub fn validate(&self) -> Result<(), DegenerateGeometry> {
        validate_quad("source", &self.src)?;
        validate_quad("destination", &self.dst)
    }
}

impl Calibration {
    /// Build the correspondence from the calibrated corners to the full
    /// output frame
    pub fn correspondence(&self, dims: &Dimensions) -> Correspondence {
        Correspondence::new(self.corners, dest_corners(dims.out_width, dims.out_height))
    }
}

/// Destination corners: the pixel centers at the edges of the output frame
pub fn dest_corners(width: u32, height: u32) -> Quad {
    let right = width.saturating_sub(1) as f64;
    let bottom = height.saturating_sub(1) as f64;
    [
        Point::new(0.0, 0.0),      // Top-left
        Point::new(right, 0.0),    // Top-right
        Point::new(right, bottom), // Bottom-right
        Point::new(0.0, bottom),   // Bottom-left
    ]
}

/// Reject quads that cannot anchor a projective mapping onto the output
/// rectangle.
///
/// The turn at each corner is the cross product of its incoming and outgoing
/// edges. The four corner triples are the four 3-point subsets of the quad,
/// so a near-zero turn anywhere means three collinear points. On screen
/// (y down) the output rectangle turns positive at every corner; any other
/// sign pattern is a reversed or self-intersecting ordering.
pub fn validate_quad(quad: &'static str, points: &Quad) -> Result<(), DegenerateGeometry> {
    for i in 0..4 {
        for j in (i + 1)..4 {
            if points[i].distance_sq(&points[j]) <= DUPLICATE_EPSILON * DUPLICATE_EPSILON {
                return Err(DegenerateGeometry::DuplicatePoint {
                    quad,
                    first: corner_label(i),
                    second: corner_label(j),
                });
            }
        }
    }

    let turns: [f64; 4] = std::array::from_fn(|i| turn_at(points, i));

    for (i, turn) in turns.iter().enumerate() {
        let prev = &points[(i + 3) % 4];
        let next = &points[(i + 1) % 4];
        let scale = points[i].distance_sq(prev).sqrt() * points[i].distance_sq(next).sqrt();
        if turn.abs() <= COLLINEAR_EPSILON * scale {
            return Err(DegenerateGeometry::Collinear {
                quad,
                corner: corner_label(i),
            });
        }
    }

    if let Some(i) = turns.iter().position(|t| *t < 0.0) {
        return Err(DegenerateGeometry::InconsistentWinding {
            quad,
            corner: corner_label(i),
        });
    }

    Ok(())
}

/// Cross product of the edges entering and leaving corner `i`
fn turn_at(points: &Quad, i: usize) -> f64 {
    let prev = points[(i + 3) % 4];
    let cur = points[i];
    let next = points[(i + 1) % 4];
    let (ax, ay) = (cur.x - prev.x, cur.y - prev.y);
    let (bx, by) = (next.x - cur.x, next.y - cur.y);
    ax * by - ay * bx
}
