//! Error types for the settings crate.
//!
//! This module provides structured error types for configuration management
//! and state snapshot persistence.

use amfibia_core::ProjectError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The configuration file could not be loaded.
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    /// The configuration file could not be saved.
    #[error("Failed to save settings: {0}")]
    SaveError(String),

    /// A configuration value is invalid.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// The configuration directory could not be found or created.
    #[error("Config directory error: {0}")]
    ConfigDirectory(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A configuration format error occurred.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A persistence error occurred.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl SettingsError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        SettingsError::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors related to configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file format is not supported.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of valid range.
    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange { key: String, value: String },

    /// Platform is not supported for config directory resolution.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Errors related to the state snapshot.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// No working directory is configured.
    #[error("No working directory set")]
    NoWorkingDirectory,

    /// The snapshot file does not exist.
    #[error("State file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The snapshot could not be encoded.
    #[error("Failed to encode state: {0}")]
    Encode(String),

    /// The snapshot could not be decoded.
    #[error("Failed to decode state: {0}")]
    Decode(String),

    /// The snapshot was written by an incompatible version.
    #[error("Unsupported state format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// The snapshot content is inconsistent.
    #[error("Invalid state data: {0}")]
    InvalidData(String),

    /// A reference image could not be read or written.
    #[error("Image error for {}: {reason}", .path.display())]
    Image { path: PathBuf, reason: String },

    /// The restored state was rejected by the project.
    #[error("Project rejected restored state: {0}")]
    Project(#[from] ProjectError),

    /// I/O error during persistence.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::LoadError("file not found".to_string());
        assert_eq!(err.to_string(), "Failed to load settings: file not found");

        let err = SettingsError::invalid("alignment.max_iterations", "must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid setting 'alignment.max_iterations': must be > 0"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnsupportedFormat("yaml".to_string());
        assert_eq!(err.to_string(), "Unsupported config format: yaml");

        let err = ConfigError::UnsupportedPlatform("wasm".to_string());
        assert_eq!(err.to_string(), "Unsupported platform: wasm");
    }

    #[test]
    fn test_persistence_error_display() {
        let err = PersistenceError::UnsupportedVersion {
            found: 7,
            expected: 1,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported state format version 7 (expected 1)"
        );

        let err = PersistenceError::NotFound(PathBuf::from("/tmp/AmFIBia.state"));
        assert_eq!(err.to_string(), "State file not found: /tmp/AmFIBia.state");
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::UnsupportedFormat("ini".to_string());
        let settings_err: SettingsError = config_err.into();
        assert!(matches!(settings_err, SettingsError::Config(_)));

        let persist_err = PersistenceError::NoWorkingDirectory;
        let settings_err: SettingsError = persist_err.into();
        assert!(matches!(settings_err, SettingsError::Persistence(_)));

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let settings_err: SettingsError = io_err.into();
        assert!(matches!(settings_err, SettingsError::IoError(_)));
    }
}
