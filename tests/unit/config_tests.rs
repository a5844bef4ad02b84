use std::path::PathBuf;
use std::time::Duration;

use progress_stream::{config::GlobalConfig, AppError};

fn sample_toml() -> &'static str {
    r#"
http_port = 8080
db_path = "data/counters.db"
poll_interval_ms = 250

[operations.import]
steps = [
    { id = "fetch", message = "Fetching files", guessed_time_ms = 1000, duration_ms = 50 },
    { id = "parse", message = "Parsing", guessed_time_ms = 3000 },
]

[operations.broken]
steps = [
    { id = "explode", message = "Exploding", guessed_time_ms = 10, fail = true },
]
"#
}

#[test]
fn parses_valid_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("config parses");

    assert_eq!(config.http_port, 8080);
    assert_eq!(config.db_path, PathBuf::from("data/counters.db"));
    assert_eq!(config.poll_interval(), Duration::from_millis(250));

    let import = &config.operations["import"];
    assert_eq!(import.steps.len(), 2);
    assert_eq!(import.steps[0].id, "fetch");
    assert_eq!(import.steps[0].duration_ms, 50);
    assert_eq!(import.steps[1].duration_ms, 0);
    assert!(!import.steps[1].fail);
    assert!(config.operations["broken"].steps[0].fail);
}

#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");
    assert_eq!(config, GlobalConfig::default());
    assert_eq!(config.http_port, 3000);
    assert_eq!(config.poll_interval_ms, 200);
    assert!(config.operations.is_empty());
}

#[test]
fn zero_poll_interval_is_rejected() {
    let err = GlobalConfig::from_toml_str("poll_interval_ms = 0").expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn operation_without_steps_is_rejected() {
    let err = GlobalConfig::from_toml_str("[operations.empty]\nsteps = []").expect_err("invalid");
    assert!(err.to_string().contains("at least one step"), "{err}");
}

#[test]
fn duplicate_step_ids_are_rejected() {
    let toml = r#"
[operations.dup]
steps = [
    { id = "a", message = "one", guessed_time_ms = 1 },
    { id = "a", message = "two", guessed_time_ms = 1 },
]
"#;
    let err = GlobalConfig::from_toml_str(toml).expect_err("invalid");
    assert!(err.to_string().contains("twice"), "{err}");
}

#[test]
fn blank_step_id_is_rejected() {
    let toml = r#"
[operations.blank]
steps = [{ id = "  ", message = "x", guessed_time_ms = 1 }]
"#;
    assert!(GlobalConfig::from_toml_str(toml).is_err());
}

#[test]
fn invalid_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("http_port = \"not a number\"").expect_err("invalid");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.http_port, 8080);
}

#[test]
fn missing_file_is_a_config_error() {
    let err = GlobalConfig::load_from_path("/nonexistent/progress.toml").expect_err("missing");
    assert!(err.to_string().starts_with("config: failed to read config"));
}
