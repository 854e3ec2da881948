//! Configuration loading tests.

use std::io::Write;
use std::time::Duration;

use jobsync_core::config::Config;
use jobsync_core::error::ErrorCode;
use jobsync_core::telemetry::LogFormat;

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_toml_file() {
    let file = config_file(
        r#"
        [sync]
        multi_tenant = true
        production_mode = true
        max_concurrent_mutations = 4
        interval = "30s"

        [observability.logging]
        level = "debug"
        format = "json"

        [observability.metrics]
        listen = "127.0.0.1:9464"
        "#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert!(config.sync.multi_tenant);
    assert_eq!(config.sync.max_concurrent_mutations, 4);
    assert_eq!(config.sync.max_concurrent_reads, 5);
    assert_eq!(config.sync.cadence(), Duration::from_secs(30));
    assert_eq!(config.observability.logging.level, "debug");
    assert_eq!(config.observability.logging.format, LogFormat::Json);
    assert_eq!(
        config.observability.metrics.listen.map(|a| a.port()),
        Some(9464)
    );
}

#[test]
fn test_production_cadence_without_override() {
    let file = config_file(
        r#"
        [sync]
        production_mode = true
        "#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.sync.cadence(), Duration::from_secs(15 * 60));
    assert_eq!(config.sync.timezone, "UTC");
}

#[test]
fn test_invalid_limits_rejected() {
    let file = config_file(
        r#"
        [sync]
        max_concurrent_reads = 0
        "#,
    );

    let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
}

#[test]
fn test_missing_file_fails() {
    assert!(Config::from_file("/nonexistent/jobsync.toml").is_err());
}
