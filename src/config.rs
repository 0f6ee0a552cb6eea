//! Configuration file handling for stereocam.
//!
//! Loads configuration from `~/.config/stereocam/config.toml` or a custom
//! path; CLI flags override file values.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::DEFAULT_GRAB_TIMEOUT_MS;

/// Configuration file structure for stereocam.
#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub exposure: ExposureConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Video device node
    pub path: String,
    /// Label stamped on published frames
    pub frame_id: String,
    /// Per-sensor capture width
    pub width: u32,
    /// Per-sensor capture height
    pub height: u32,
    /// Deinterleave pattern: pixel, pixel-right, row, row-right
    pub interleave: String,
    /// Bound on the blocking wait for a frame
    pub grab_timeout_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: "/dev/video0".to_string(),
            frame_id: "stereo_camera".to_string(),
            width: 752,
            height: 480,
            interleave: "pixel".to_string(),
            grab_timeout_ms: DEFAULT_GRAB_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExposureConfig {
    /// Initial exposure value
    pub initial: i64,
    /// Initial gain level (1-7)
    pub gain_level: u8,
    /// Run the adaptive exposure loop
    pub auto: bool,
    /// Proportional gain coefficient
    pub loop_gain: f64,
    /// Target mean brightness (0-255)
    pub target: f64,
    /// Evaluate on every Nth frame
    pub interval: u64,
    /// Emit feedback snapshots on the reporting channel
    pub feedback: bool,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            initial: 1000,
            gain_level: 1,
            auto: true,
            loop_gain: 1.0,
            target: 128.0,
            interval: 5,
            feedback: false,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Lower bound of the calibrated gray range (upper bound mirrors it)
    pub min_gray: usize,
    /// Settle frames per walkthrough measurement
    pub walkthrough_settle: u32,
    /// Settle frames per gap-fill measurement
    pub gap_fill_settle: u32,
    /// Table output path
    pub output: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_gray: 20,
            walkthrough_settle: 5,
            gap_fill_settle: 8,
            output: "calibration.toml".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("stereocam/config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/stereocam/config.toml")
        })
}
