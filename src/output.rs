// C header output for the embedded target
//
// The target builds its remapping lookup table at startup from the
// dimension macros and the pre-inverted matrix in this header. It does no
// inversion of its own, so the matrix written here must already be H^-1.
//
// Writes go through a temporary file in the destination directory that is
// renamed over the destination once fully written, so a failed run never
// leaves a truncated header behind.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;
use tracing::{debug, info};

use crate::config::Dimensions;
use crate::error::WriteError;
use crate::transform::InverseHomography;

/// Value the target stores in lookup entries with no source pixel
pub const INVALID_MARKER: u8 = 255;

/// Digits after the decimal point for each matrix entry
const MATRIX_DECIMALS: usize = 8;

/// Everything the target needs from one calibration run
#[derive(Debug, Clone, Copy)]
pub struct CalibrationArtifact {
    pub matrix: InverseHomography,
    pub dimensions: Dimensions,
}

impl CalibrationArtifact {
    pub fn new(matrix: InverseHomography, dimensions: Dimensions) -> Self {
        Self { matrix, dimensions }
    }
}

/// Render the header text. The output depends only on the artifact.
pub fn render(artifact: &CalibrationArtifact) -> String {
    let dims = &artifact.dimensions;
    let mut out = String::new();

    out.push_str("// Auto-generated IPM inverse matrix M = H^-1\n");
    out.push_str("// Used by the target at startup to build its RAM lookup table\n\n");
    out.push_str("#include <stdint.h>\n\n");

    out.push_str("// Image dimensions\n");
    // Writing into a String cannot fail
    let _ = writeln!(out, "#define IPM_OUT_HEIGHT {}", dims.out_height);
    let _ = writeln!(out, "#define IPM_OUT_WIDTH  {}", dims.out_width);
    let _ = writeln!(out, "#define IPM_SRC_HEIGHT {}", dims.src_height);
    let _ = writeln!(out, "#define IPM_SRC_WIDTH  {}", dims.src_width);
    let _ = writeln!(out, "#define IPM_INVALID_MARKER_UINT8 {}\n", INVALID_MARKER);

    out.push_str("// Inverse homography M = H^-1, row-major\n");
    out.push_str("const float ipm_matrix[3][3] = {\n");
    for row in artifact.matrix.rows() {
        let _ = writeln!(
            out,
            "  {{ {}, {}, {} }},",
            float_literal(row[0]),
            float_literal(row[1]),
            float_literal(row[2])
        );
    }
    out.push_str("};\n");

    out
}

/// Format a value as a C single-precision literal with a fixed number of
/// decimals. Values that round to zero are written unsigned.
fn float_literal(value: f64) -> String {
    let half_ulp = 0.5 * 10f64.powi(-(MATRIX_DECIMALS as i32));
    let value = if value.abs() < half_ulp { 0.0 } else { value };
    format!("{:.*}f", MATRIX_DECIMALS, value)
}

/// Write the artifact to `destination`, replacing any existing file
pub fn emit(artifact: &CalibrationArtifact, destination: &Path) -> Result<(), WriteError> {
    let content = render(artifact);
    write_atomic(destination, content.as_bytes()).map_err(|source| WriteError {
        path: destination.to_path_buf(),
        source,
    })?;
    info!("Wrote {} bytes to {:?}", content.len(), destination);
    Ok(())
}

/// Write the artifact to any writer (used for `--stdout`)
pub fn emit_to<W: Write>(artifact: &CalibrationArtifact, mut writer: W) -> io::Result<()> {
    writer.write_all(render(artifact).as_bytes())?;
    writer.flush()
}

fn write_atomic(destination: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = Builder::new();
    builder.prefix(".ipm_matrix").suffix(".tmp");
    // Plain 0644 for a new header (umask still applies at create)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }

    let mut tmp = builder.tempfile_in(dir)?;
    debug!("Staging header in {:?}", tmp.path());

    // An existing header keeps its mode across the rename
    if let Ok(existing) = fs::metadata(destination) {
        tmp.as_file().set_permissions(existing.permissions())?;
    }

    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}
