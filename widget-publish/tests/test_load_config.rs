use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;
use widget_publish::load_config::{load_config, DEFAULT_API_URL};

fn clear_env() {
    env::remove_var("WIDGET_API_URL");
    env::remove_var("WIDGET_CREDENTIALS_PATH");
    env::remove_var("WIDGET_TIMEOUT_SECS");
}

/// Values from the YAML file are used when the environment is silent.
#[test]
#[serial]
fn test_load_config_reads_yaml_file() {
    clear_env();
    let config_yaml = r#"
api_url: https://staging.example.com/api/
credentials_path: /tmp/widget-creds.json
timeout_secs: 60
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(Some(config_file.path())).expect("Config should load");

    assert_eq!(config.api_url, "https://staging.example.com/api/");
    assert_eq!(config.credentials_path, PathBuf::from("/tmp/widget-creds.json"));
    assert_eq!(config.timeout, Duration::from_secs(60));
}

/// Environment variables take precedence over the file.
#[test]
#[serial]
fn test_load_config_env_overrides_file() {
    clear_env();
    let config_file = NamedTempFile::new().expect("temp file");
    write(
        config_file.path(),
        "api_url: https://file.example.com/\ntimeout_secs: 60\n",
    )
    .unwrap();

    env::set_var("WIDGET_API_URL", "http://127.0.0.1:4000/");
    env::set_var("WIDGET_CREDENTIALS_PATH", "/tmp/env-creds.json");
    env::set_var("WIDGET_TIMEOUT_SECS", "5");

    let config = load_config(Some(config_file.path())).expect("Config should load");
    clear_env();

    assert_eq!(config.api_url, "http://127.0.0.1:4000/");
    assert_eq!(config.credentials_path, PathBuf::from("/tmp/env-creds.json"));
    assert_eq!(config.timeout, Duration::from_secs(5));
}

/// Without a file or environment the public API and a 5 minute timeout are used.
#[test]
#[serial]
fn test_load_config_defaults() {
    clear_env();
    env::set_var("WIDGET_CREDENTIALS_PATH", "/tmp/creds.json");

    let config = load_config(None).expect("Config should load");
    clear_env();

    assert_eq!(config.api_url, DEFAULT_API_URL);
    assert_eq!(config.timeout, Duration::from_secs(300));

    let settings = config.publish_settings().expect("default URL is valid");
    assert_eq!(settings.api_base.as_str(), DEFAULT_API_URL);
}

#[test]
#[serial]
fn test_load_config_rejects_bad_timeout() {
    clear_env();
    env::set_var("WIDGET_CREDENTIALS_PATH", "/tmp/creds.json");
    env::set_var("WIDGET_TIMEOUT_SECS", "five minutes");

    let err = load_config(None).unwrap_err();
    clear_env();

    assert!(
        err.to_string().contains("WIDGET_TIMEOUT_SECS"),
        "unexpected error: {err}"
    );
}

/// This test ensures that if the config file is not valid YAML, load_config errors and reports as such.
#[test]
#[serial]
fn test_load_config_errors_for_invalid_file() {
    clear_env();
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), b"not-yaml: [:::").unwrap();

    let err = load_config(Some(config_file.path())).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
#[serial]
fn test_load_config_errors_for_missing_file() {
    clear_env();
    let err = load_config(Some(std::path::Path::new("/nonexistent/widget.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
