//! Integration-level unit tests for the SettingsEngine public API.
//!
//! These tests exercise the SettingsEngine through its public trait interface:
//! default loading, persistence across instances, and rejection of malformed
//! or out-of-range files.

use std::fs;
use std::time::Duration;

use linkshelf::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use linkshelf::types::errors::SettingsError;
use linkshelf::types::settings::SyncSettings;
use tempfile::TempDir;

/// Helper: create a SettingsEngine backed by a temp directory that lives for the
/// duration of the test (the caller holds the `TempDir` handle).
fn engine_in_temp(dir: &TempDir) -> SettingsEngine {
    SettingsEngine::new(Some(dir.path().join("linkshelf.json")))
}

/// Without a file on disk the core starts with the built-in intervals.
#[test]
fn test_load_defaults_when_no_config_file_exists() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);

    let settings = engine.load().unwrap();

    assert_eq!(settings, SyncSettings::default());
    assert_eq!(settings.poll_interval(), Duration::from_secs(5));
    assert_eq!(settings.connect_timeout(), Duration::from_secs(10));
}

/// A value written through `update` is visible to a fresh engine on the same file.
#[test]
fn test_update_persists_changes() {
    let dir = TempDir::new().unwrap();

    {
        let mut engine = engine_in_temp(&dir);
        engine.load().unwrap();
        let mut settings = engine.get_settings().clone();
        settings.poll_interval_ms = 2_500;
        settings.database_path = Some("bookmarks.db".to_string());
        engine.update(settings).unwrap();
    }

    let mut engine = engine_in_temp(&dir);
    let loaded = engine.load().unwrap();
    assert_eq!(loaded.poll_interval_ms, 2_500);
    assert_eq!(loaded.database_path.as_deref(), Some("bookmarks.db"));
    assert_eq!(loaded.connect_timeout_ms, 10_000);
}

/// Keys missing from the file fall back to their defaults.
#[test]
fn test_partial_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let engine_path = dir.path().join("linkshelf.json");
    fs::write(&engine_path, r#"{ "connect_timeout_ms": 3000 }"#).unwrap();
    let mut engine = SettingsEngine::new(Some(engine_path));

    let settings = engine.load().unwrap();

    assert_eq!(settings.connect_timeout_ms, 3_000);
    assert_eq!(settings.poll_interval_ms, 5_000);
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn test_malformed_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    fs::write(engine.get_config_path(), "{ not json").unwrap();

    let err = engine.load().unwrap_err();

    assert!(matches!(err, SettingsError::Serialization(_)));
    assert_eq!(engine.get_settings(), &SyncSettings::default());
}

#[test]
fn test_zero_interval_in_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    fs::write(engine.get_config_path(), r#"{ "poll_interval_ms": 0 }"#).unwrap();

    assert!(matches!(engine.load(), Err(SettingsError::InvalidValue(_))));
}

#[test]
fn test_update_rejects_zero_timeout_without_writing() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_in_temp(&dir);
    engine.load().unwrap();
    let mut settings = SyncSettings::default();
    settings.connect_timeout_ms = 0;

    assert!(matches!(engine.update(settings), Err(SettingsError::InvalidValue(_))));
    assert!(!engine.get_config_path().exists());
}

#[test]
fn test_save_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b").join("linkshelf.json");
    let engine = SettingsEngine::new(Some(nested.clone()));

    engine.save().unwrap();

    assert!(nested.exists());
}
