//! AmFIBia Settings Crate
//!
//! Handles application configuration and the on-disk state snapshot.

pub mod config;
pub mod error;
pub mod persistence;

pub use config::{AlignmentSettings, Config, GeneralSettings, ImagingSettings, MillingSettings};
pub use error::{
    ConfigError, ConfigResult, PersistenceError, PersistenceResult, SettingsError, SettingsResult,
};
pub use persistence::{LoadedState, StateStore, STATE_FILE_NAME, STATE_FORMAT_VERSION};
