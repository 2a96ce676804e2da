use amfibia_settings::{Config, SettingsError};
use std::path::PathBuf;

#[test]
fn test_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    config.general.working_directory = Some(PathBuf::from("/data/session"));
    config.alignment.max_iterations = 8;
    config.alignment.residual_epsilon_m = Some(5e-9);
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_toml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.milling.sleep_threshold_s = 600;
    config.imaging.scanning_resolution = "3072x2048".to_string();
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.milling.sleep_threshold_s, 600);
    assert_eq!(loaded.imaging.resolution().unwrap().width, 3072);
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[alignment]\nconfidence_threshold = 0.9\nmax_iterations = 3\n\
         stage_move_threshold_m = 1e-5\ncoarse_current_a = 1e-11\n\
         search_fraction = 0.5\nsave_captures = false\n",
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.alignment.max_iterations, 3);
    assert!(!config.alignment.save_captures);
    assert_eq!(config.milling, Default::default());
    assert_eq!(config.imaging.scanning_resolution, "1536x1024");
}

#[test]
fn test_invalid_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"milling": {"sleep_threshold_s": 1, "poll_interval_ms": 0, "minimum_depth_m": 1e-9}}"#).unwrap();

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));
}

#[test]
fn test_load_or_default_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_or_default(&dir.path().join("missing.json")).unwrap();
    assert_eq!(config, Config::default());
}
