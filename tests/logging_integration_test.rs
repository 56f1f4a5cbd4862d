//! Integration tests for logging functionality
//!
//! The global subscriber can only be installed once per process, so a single
//! test owns `init_logging`.

use chrono::NaiveDate;
use quarry::config::LoggingConfig;
use quarry::core::export::FailedUnitsFile;
use quarry::domain::{DateRange, DestinationName, RecordKind, SourceQuery, UnitDescriptor};
use quarry::logging::init_logging;
use tempfile::TempDir;

#[test]
fn test_logging_config_default() {
    let config = LoggingConfig::default();
    assert!(config.local_enabled);
    assert_eq!(config.local_rotation, "daily");
    assert_eq!(config.local_max_size_mb, 100);
}

#[test]
fn test_file_logging_writes_json_lines() {
    std::env::remove_var("RUST_LOG");
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("logs");

    let config = LoggingConfig {
        local_enabled: true,
        local_path: log_path.to_string_lossy().to_string(),
        local_rotation: "daily".to_string(),
        local_max_size_mb: 100,
    };

    let guard = init_logging("info", &config).unwrap();
    assert!(log_path.is_dir());

    // Anything quarry logs at info lands in the file
    let day = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
    FailedUnitsFile::new(
        &DestinationName::new("events").unwrap(),
        RecordKind::Event,
        SourceQuery::default(),
        vec![UnitDescriptor::Range(DateRange::new(day, day).unwrap())],
    )
    .save(temp_dir.path().join("failed.json"))
    .unwrap();

    // Dropping the guard flushes the non-blocking writer
    drop(guard);

    let log_file = std::fs::read_dir(&log_path)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("quarry.log"))
        })
        .expect("no log file written");

    let contents = std::fs::read_to_string(log_file).unwrap();
    let line = contents
        .lines()
        .find(|l| l.contains("Failed units saved"))
        .expect("event missing from log file");
    let entry: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(entry["level"], "INFO");
    assert_eq!(entry["fields"]["units"], 1);

    // A second subscriber can't be installed
    let again = LoggingConfig {
        local_enabled: false,
        ..config
    };
    assert!(init_logging("info", &again).is_err());
}

#[test]
fn test_invalid_level_is_rejected_before_install() {
    let config = LoggingConfig {
        local_enabled: false,
        ..LoggingConfig::default()
    };
    assert!(init_logging("chatty", &config).is_err());
}
