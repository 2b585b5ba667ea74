//! Configuration management for ipmgen

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Slack on source frame bounds checks, in pixels
const BOUNDS_EPSILON: f64 = 1e-6;

/// A 2D point in image pixel coordinates (origin top-left, y down)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared distance to another point
    pub fn distance_sq(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Four corners in top-left, top-right, bottom-right, bottom-left order
pub type Quad = [Point; 4];

/// Calibration points picked from the raw camera frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibration {
    /// The four corners of a real-world rectangle as seen by the camera.
    /// Order: top-left, top-right, bottom-right, bottom-left
    pub corners: Quad,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            // Placeholder trapezoid for a 188x120 sensor looking down a track
            corners: [
                Point::new(25.0, 10.0),  // Top-left (far)
                Point::new(162.0, 10.0), // Top-right (far)
                Point::new(187.0, 99.0), // Bottom-right (near)
                Point::new(0.0, 99.0),   // Bottom-left (near)
            ],
        }
    }
}

/// Source frame and bird's-eye output dimensions, shared with the target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    pub src_width: u32,
    pub src_height: u32,
    pub out_width: u32,
    pub out_height: u32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            src_width: 188,
            src_height: 120,
            out_width: 188,
            out_height: 120,
        }
    }
}

impl Dimensions {
    /// Every axis needs at least two pixels, otherwise the output rectangle
    /// collapses to a line
    pub fn validate(&self) -> Result<()> {
        let axes = [
            ("src_width", self.src_width),
            ("src_height", self.src_height),
            ("out_width", self.out_width),
            ("out_height", self.out_height),
        ];
        for (name, value) in axes {
            if value < 2 {
                bail!("dimensions.{} must be at least 2, got {}", name, value);
            }
        }
        Ok(())
    }

    /// Whether a point lies inside the source frame, allowing for f64
    /// rounding on the edges
    pub fn contains_source(&self, p: &Point) -> bool {
        p.x >= -BOUNDS_EPSILON
            && p.y >= -BOUNDS_EPSILON
            && p.x <= self.src_width.saturating_sub(1) as f64 + BOUNDS_EPSILON
            && p.y <= self.src_height.saturating_sub(1) as f64 + BOUNDS_EPSILON
    }
}

/// Artifact output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Header file to (over)write
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ipm_matrix.h"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub dimensions: Dimensions,

    #[serde(default)]
    pub calibration: Calibration,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::warn!(
                "Created default configuration at {:?}; its calibration points are placeholders, replace them with your own",
                path
            );
            Ok(config)
        }
    }

    /// Load configuration from a file, or fall back to in-memory defaults
    /// without touching the filesystem
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(
                "No configuration at {:?}; using built-in placeholder calibration points",
                path
            );
            Ok(Config::default())
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Check dimensions and warn about corners outside the source frame
    pub fn validate(&self) -> Result<()> {
        self.dimensions.validate()?;

        for (i, corner) in self.calibration.corners.iter().enumerate() {
            if !self.dimensions.contains_source(corner) {
                tracing::warn!(
                    "Calibration corner {} ({}, {}) lies outside the {}x{} source frame",
                    crate::calibration::corner_label(i),
                    corner.x,
                    corner.y,
                    self.dimensions.src_width,
                    self.dimensions.src_height
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dimensions.src_width, 188);
        assert_eq!(config.dimensions.out_height, 120);
        assert_eq!(config.calibration.corners[0], Point::new(25.0, 10.0));
        assert_eq!(config.output.path, PathBuf::from("ipm_matrix.h"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let content = r#"
            [dimensions]
            src_width = 320
            src_height = 240
            out_width = 160
            out_height = 100
        "#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.dimensions.out_width, 160);
        // Missing sections fall back to defaults
        assert_eq!(config.calibration.corners[3], Point::new(0.0, 99.0));
        assert_eq!(config.output.path, PathBuf::from("ipm_matrix.h"));
    }

    #[test]
    fn test_parse_inline_corners() {
        let content = r#"
            [calibration]
            corners = [
              { x = 1.0, y = 2.0 },
              { x = 3.0, y = 4.0 },
              { x = 5.0, y = 6.0 },
              { x = 7.0, y = 8.0 },
            ]
        "#;
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.calibration.corners[2], Point::new(5.0, 6.0));
    }

    #[test]
    fn test_wrong_corner_count_rejected() {
        let content = r#"
            [calibration]
            corners = [{ x = 1.0, y = 2.0 }, { x = 3.0, y = 4.0 }, { x = 5.0, y = 6.0 }]
        "#;
        assert!(toml::from_str::<Config>(content).is_err());
    }

    #[test]
    fn test_small_dimensions_rejected() {
        let mut config = Config::default();
        config.dimensions.out_height = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("out_height"));
    }

    #[test]
    fn test_load_or_create_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ipm.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(loaded.dimensions, created.dimensions);
        assert_eq!(loaded.calibration.corners, created.calibration.corners);
        assert_eq!(loaded.output.path, created.output.path);
    }

    #[test]
    fn test_contains_source() {
        let dims = Dimensions::default();
        assert!(dims.contains_source(&Point::new(187.0, 119.0)));
        assert!(!dims.contains_source(&Point::new(188.0, 0.0)));
        assert!(!dims.contains_source(&Point::new(0.0, -0.5)));
    }

    #[test]
    fn test_contains_source_rounding_slack() {
        let dims = Dimensions::default();
        assert!(dims.contains_source(&Point::new(187.0 + 1e-9, 119.0)));
        assert!(dims.contains_source(&Point::new(-1e-9, 0.0)));
        assert!(!dims.contains_source(&Point::new(187.001, 0.0)));
    }

    #[test]
    fn test_load_or_default_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipm.toml");

        let config = Config::load_or_default(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(config.dimensions, Dimensions::default());
        assert_eq!(config.calibration.corners, Calibration::default().corners);
    }

    #[test]
    fn test_load_or_default_reads_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipm.toml");
        let mut config = Config::default();
        config.dimensions.out_height = 100;
        config.save(&path).unwrap();

        let loaded = Config::load_or_default(&path).unwrap();
        assert_eq!(loaded.dimensions.out_height, 100);
    }
}
