//! Tests for loading overlay configuration from disk

use pagewatch_common::{OverlayConfig, Remediation};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_from_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pagewatch.toml");
    fs::write(
        &path,
        r#"
patterns = ["NOT_FOUND gru1::", "timeout"]
remediation = "suppress"
module_attribute = "data-modulo"
max_history = 0
"#,
    )
    .unwrap();

    let config = OverlayConfig::load_from_path(&path).unwrap();
    assert_eq!(config.patterns.len(), 2);
    assert_eq!(config.remediation, Remediation::Suppress);
    assert_eq!(config.module_attribute, "data-modulo");
    assert_eq!(config.log_limits().max_history, 0);
    assert_eq!(config.matcher().unwrap().first_match("Request TIMEOUT"), Some(1));
}

#[test]
fn test_missing_file_error_names_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let err = OverlayConfig::load_from_path(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("absent.toml"));
}

#[test]
fn test_invalid_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "recent_limit = 0\n").unwrap();

    assert!(OverlayConfig::load_from_path(&path).is_err());
    assert_eq!(OverlayConfig::load_or_default(&path), OverlayConfig::default());
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let config = OverlayConfig::load_or_default(dir.path().join("none.toml"));
    assert_eq!(config, OverlayConfig::default());
}
