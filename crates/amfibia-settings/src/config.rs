//! Configuration and settings management for AmFIBia
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats stored in platform-specific directories.
//!
//! Configuration is organized into logical sections:
//! - General settings (working directory)
//! - Imaging defaults (scanning resolution, dwell time)
//! - Alignment loop tuning (threshold, budget, stage-move limit)
//! - Milling run behaviour (sleep threshold, poll interval)

use amfibia_core::Resolution;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// General settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Directory for the state snapshot and alignment captures
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
}

/// Imaging defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingSettings {
    /// Scanning resolution as `WIDTHxHEIGHT`
    pub scanning_resolution: String,
    /// Dwell time per pixel in seconds
    pub dwell_time_s: f64,
    /// Resolutions offered when the instrument cannot list its own
    #[serde(default = "default_fallback_resolutions")]
    pub fallback_resolutions: Vec<String>,
}

fn default_fallback_resolutions() -> Vec<String> {
    [
        "512x442",
        "768x512",
        "1024x884",
        "1536x1024",
        "2048x1768",
        "3072x2048",
        "4096x3536",
        "6144x4096",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ImagingSettings {
    fn default() -> Self {
        Self {
            scanning_resolution: "1536x1024".to_string(),
            dwell_time_s: 1e-6,
            fallback_resolutions: default_fallback_resolutions(),
        }
    }
}

impl ImagingSettings {
    pub fn resolution(&self) -> SettingsResult<Resolution> {
        self.scanning_resolution
            .parse()
            .map_err(|e: String| SettingsError::invalid("imaging.scanning_resolution", e))
    }
}

/// Alignment loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSettings {
    /// Matcher confidence at which alignment is accepted
    pub confidence_threshold: f64,
    /// Capture/correlate iterations before giving up
    pub max_iterations: u32,
    /// Corrections longer than this move the stage instead of the beam
    pub stage_move_threshold_m: f64,
    /// Beam current for coarse alignment after a stage move
    pub coarse_current_a: f64,
    /// Residual below which alignment is accepted; half a reference pixel
    /// when unset
    #[serde(default)]
    pub residual_epsilon_m: Option<f64>,
    /// Fraction of the image searched for the reference
    pub search_fraction: f64,
    /// Save every alignment capture as TIFF
    pub save_captures: bool,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.98,
            max_iterations: 5,
            stage_move_threshold_m: 10e-6,
            coarse_current_a: 1e-11,
            residual_epsilon_m: None,
            search_fraction: 0.25,
            save_captures: true,
        }
    }
}

/// Milling run behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MillingSettings {
    /// Delays longer than this put the instrument to sleep first
    pub sleep_threshold_s: u64,
    /// Interval between patterning state polls
    pub poll_interval_ms: u64,
    /// Smallest depth sent to the instrument
    pub minimum_depth_m: f64,
}

impl Default for MillingSettings {
    fn default() -> Self {
        Self {
            sleep_threshold_s: 300,
            poll_interval_ms: 500,
            minimum_depth_m: 1e-9,
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralSettings,
    /// Imaging defaults
    #[serde(default)]
    pub imaging: ImagingSettings,
    /// Alignment tuning
    #[serde(default)]
    pub alignment: AlignmentSettings,
    /// Milling behaviour
    #[serde(default)]
    pub milling: MillingSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("<none>").to_string()).into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform config location: `<config dir>/amfibia/config.json`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("amfibia").join("config.json"))
            .ok_or_else(|| {
                ConfigError::UnsupportedPlatform("no configuration directory".to_string()).into()
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| SettingsError::SaveError(format!("Failed to serialize config: {}", e)))?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SettingsError::ConfigDirectory(e.to_string()))?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        self.imaging.resolution()?;

        if !(self.imaging.dwell_time_s > 0.0) {
            return Err(SettingsError::invalid("imaging.dwell_time_s", "must be > 0"));
        }

        let threshold = self.alignment.confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ValueOutOfRange {
                key: "alignment.confidence_threshold".to_string(),
                value: threshold.to_string(),
            }
            .into());
        }

        if self.alignment.max_iterations == 0 {
            return Err(SettingsError::invalid("alignment.max_iterations", "must be > 0"));
        }

        if !(self.alignment.stage_move_threshold_m > 0.0) {
            return Err(SettingsError::invalid(
                "alignment.stage_move_threshold_m",
                "must be > 0",
            ));
        }

        if !(self.alignment.coarse_current_a > 0.0) {
            return Err(SettingsError::invalid("alignment.coarse_current_a", "must be > 0"));
        }

        if let Some(epsilon) = self.alignment.residual_epsilon_m {
            if !(epsilon > 0.0) {
                return Err(SettingsError::invalid(
                    "alignment.residual_epsilon_m",
                    "must be > 0",
                ));
            }
        }

        let fraction = self.alignment.search_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::ValueOutOfRange {
                key: "alignment.search_fraction".to_string(),
                value: fraction.to_string(),
            }
            .into());
        }

        if self.milling.poll_interval_ms == 0 {
            return Err(SettingsError::invalid("milling.poll_interval_ms", "must be > 0"));
        }

        if !(self.milling.minimum_depth_m > 0.0) {
            return Err(SettingsError::invalid("milling.minimum_depth_m", "must be > 0"));
        }

        Ok(())
    }

    /// Working directory, or an error when none is configured
    pub fn working_directory(&self) -> SettingsResult<&Path> {
        self.general
            .working_directory
            .as_deref()
            .ok_or_else(|| crate::error::PersistenceError::NoWorkingDirectory.into())
    }
}
