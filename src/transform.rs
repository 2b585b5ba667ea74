//! Perspective transformation for inverse perspective mapping
//!
//! This module computes the homography that maps the camera's view of a
//! ground-plane rectangle onto the bird's-eye output frame, and inverts it so
//! the target can look up a source pixel for every output pixel.

use crate::calibration::{corner_label, Correspondence};
use crate::config::{Dimensions, Point};
use crate::error::DegenerateGeometry;
use tracing::debug;

/// Pivot magnitude below which the linear system is treated as singular
const PIVOT_EPSILON: f64 = 1e-10;

/// Determinant magnitude below which a homography is treated as singular
const DETERMINANT_EPSILON: f64 = 1e-9;

/// Homogeneous scale below which a point maps to infinity
const W_EPSILON: f64 = 1e-10;

/// Forward perspective transformation matrix (3x3 homography, row-major)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    pub data: [[f64; 3]; 3],
}

/// Inverse of a [`Homography`]: maps output pixels back to source pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseHomography {
    pub data: [[f64; 3]; 3],
}

impl Homography {
    /// Compute the homography from 4 source points to 4 destination points
    /// using the Direct Linear Transform (DLT) with `h33` fixed to 1
    pub fn from_correspondence(corr: &Correspondence) -> Result<Self, DegenerateGeometry> {
        // For each point correspondence (x,y) -> (x',y') we have two equations:
        // x*h1 + y*h2 + h3 - x'*x*h7 - x'*y*h8 = x'
        // x*h4 + y*h5 + h6 - y'*x*h7 - y'*y*h8 = y'
        let mut a = [[0.0f64; 8]; 8];
        let mut b = [0.0f64; 8];

        for (i, (src, dst)) in corr.src.iter().zip(corr.dst.iter()).enumerate() {
            let (x, y) = (src.x, src.y);
            let (xp, yp) = (dst.x, dst.y);

            let row1 = i * 2;
            let row2 = i * 2 + 1;

            a[row1] = [x, y, 1.0, 0.0, 0.0, 0.0, -xp * x, -xp * y];
            b[row1] = xp;

            a[row2] = [0.0, 0.0, 0.0, x, y, 1.0, -yp * x, -yp * y];
            b[row2] = yp;
        }

        let h = solve_linear_system(&mut a, &mut b).ok_or(DegenerateGeometry::SingularSystem)?;

        Ok(Self {
            data: [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], 1.0]],
        })
    }

    /// Transform a point from source to destination coordinates
    #[inline]
    pub fn project(&self, p: Point) -> Option<Point> {
        apply_homography(&self.data, p)
    }

    pub fn determinant(&self) -> f64 {
        determinant(&self.data)
    }

    /// Invert via the adjugate, failing when the matrix is singular
    pub fn inverse(&self) -> Result<InverseHomography, DegenerateGeometry> {
        invert(&self.data).map(|data| InverseHomography { data })
    }
}

impl InverseHomography {
    /// Transform a point from destination to source coordinates
    #[inline]
    pub fn project(&self, p: Point) -> Option<Point> {
        apply_homography(&self.data, p)
    }

    pub fn determinant(&self) -> f64 {
        determinant(&self.data)
    }

    /// Recover the forward homography
    pub fn inverse(&self) -> Result<Homography, DegenerateGeometry> {
        invert(&self.data).map(|data| Homography { data })
    }

    pub fn rows(&self) -> &[[f64; 3]; 3] {
        &self.data
    }
}

/// Solve a calibration: validate the quads, fit the forward homography and
/// return its inverse
pub fn solve(corr: &Correspondence) -> Result<InverseHomography, DegenerateGeometry> {
    corr.validate()?;

    let forward = Homography::from_correspondence(corr)?;
    debug!("Forward homography H = {:?}", forward.data);
    debug!("det(H) = {:e}", forward.determinant());

    for (i, (src, dst)) in corr.src.iter().zip(corr.dst.iter()).enumerate() {
        if let Some(p) = forward.project(*src) {
            debug!(
                "{} ({}, {}) -> ({:.4}, {:.4}), residual {:.2e} px",
                corner_label(i),
                src.x,
                src.y,
                p.x,
                p.y,
                p.distance_sq(dst).sqrt()
            );
        }
    }

    let inverse = forward.inverse()?;
    debug!("det(H^-1) = {:e}", inverse.determinant());
    debug!(
        "Round-trip residual max|inv(H^-1) - H| = {:.2e}",
        round_trip_residual(&forward, &inverse)?
    );
    Ok(inverse)
}

/// Largest entry-wise difference between `H` and the inverse of `H^-1`
pub fn round_trip_residual(
    forward: &Homography,
    inverse: &InverseHomography,
) -> Result<f64, DegenerateGeometry> {
    let back = inverse.inverse()?;
    let mut max = 0.0f64;
    for r in 0..3 {
        for c in 0..3 {
            max = max.max((back.data[r][c] - forward.data[r][c]).abs());
        }
    }
    Ok(max)
}

/// How many output pixels the target will be able to fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub valid: usize,
    pub total: usize,
}

impl Coverage {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.valid as f64 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.valid == self.total
    }
}

/// Map every output pixel back through the inverse matrix and count those
/// that land inside the source frame. Pixels that fall outside are the ones
/// the target marks with the invalid sentinel.
pub fn coverage(inverse: &InverseHomography, dims: &Dimensions) -> Coverage {
    let total = dims.out_width as usize * dims.out_height as usize;
    let mut valid = 0;

    for v in 0..dims.out_height {
        for u in 0..dims.out_width {
            let hit = inverse
                .project(Point::new(u as f64, v as f64))
                .is_some_and(|p| dims.contains_source(&p));
            if hit {
                valid += 1;
            }
        }
    }

    Coverage { valid, total }
}

/// Solve an 8x8 linear system using Gaussian elimination with partial pivoting
fn solve_linear_system(a: &mut [[f64; 8]; 8], b: &mut [f64; 8]) -> Option<[f64; 8]> {
    let n = 8;

    // Forward elimination with partial pivoting
    for col in 0..n {
        // Find pivot
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                max_row = row;
            }
        }

        if max_val < PIVOT_EPSILON {
            return None;
        }

        // Swap rows
        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        // Eliminate column
        let pivot = a[col][col];
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    Some(x)
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// 3x3 inverse as adj(M) / det(M)
fn invert(m: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3], DegenerateGeometry> {
    let det = determinant(m);
    if !det.is_finite() || det.abs() <= DETERMINANT_EPSILON {
        return Err(DegenerateGeometry::SingularMatrix { det });
    }

    let inv_det = 1.0 / det;
    let mut inv = [[0.0f64; 3]; 3];

    inv[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
    inv[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
    inv[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
    inv[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
    inv[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
    inv[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
    inv[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
    inv[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
    inv[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;

    Ok(inv)
}

/// Apply a homography matrix to a point
#[inline]
fn apply_homography(h: &[[f64; 3]; 3], p: Point) -> Option<Point> {
    let w = h[2][0] * p.x + h[2][1] * p.y + h[2][2];
    if w.abs() < W_EPSILON {
        return None;
    }
    let xp = (h[0][0] * p.x + h[0][1] * p.y + h[0][2]) / w;
    let yp = (h[1][0] * p.x + h[1][1] * p.y + h[1][2]) / w;
    Some(Point::new(xp, yp))
}
