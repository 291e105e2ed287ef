use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use transfer_harvest::config::{Config, ConfigLoader, Timing};
use transfer_harvest::error::HarvestError;
use transfer_harvest::extract::SheetSource;

#[test]
fn partial_config_keeps_other_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thv.json");
    fs::write(
        &path,
        r#"{
  "registry": "ledger/links.json",
  "headless": true,
  "sheet": {"source": "https://docs.google.com/spreadsheets/d/abc123/edit#gid=7"},
  "timing": {"completion_timeout_ms": 600000, "pacing_ms": 0}
}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.registry, Utf8PathBuf::from("ledger/links.json"));
    assert_eq!(resolved.download_root, Utf8PathBuf::from("Downloads"));
    assert!(resolved.headless);
    assert!(!resolved.interactive_fallback);
    assert_eq!(resolved.sheet.column, "Link");
    assert_eq!(
        resolved.sheet.source,
        Some(SheetSource::Url(
            "https://docs.google.com/spreadsheets/d/abc123/export?format=tsv&gid=7".to_string()
        ))
    );
    assert_eq!(resolved.timing.completion_timeout, Duration::from_secs(600));
    assert_eq!(resolved.timing.pacing, Duration::ZERO);
    assert_eq!(resolved.timing.locator_wait, Timing::default().locator_wait);
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, HarvestError::ConfigRead(_));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thv.json");
    fs::write(&path, r#"{"headless": "sometimes"}"#).unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, HarvestError::ConfigParse(_));
}

#[test]
fn blank_sheet_source_is_ignored() {
    let config: Config = serde_json::from_str(r#"{"sheet": {"source": "  ", "column": "URL"}}"#).unwrap();
    let resolved = ConfigLoader::resolve_config(config);
    assert!(resolved.sheet.source.is_none());
    assert_eq!(resolved.sheet.column, "URL");
}
