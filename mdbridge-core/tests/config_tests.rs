// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, env var overrides, and range checks

use mdbridge_core::config::{Config, ReceiptPolicy};
use serial_test::serial;
use std::io::Write;
use tempfile::TempDir;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("MDBRIDGE_CONFIG_PATH");
    std::env::remove_var("MDBRIDGE_USERNAME");
    std::env::remove_var("MDBRIDGE_DISPLAY_NAME");
    std::env::remove_var("MDBRIDGE_FETCH_HISTORY");
}

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
#[serial]
fn test_config_loads_from_toml_file() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[account]
username = "4915112345678"
display_name = "Alice"

[history]
fetch_history = true

[cache]
capacity = 25

[avatars]
queue_capacity = 8
timeout_secs = 30

[receipts]
policy = "immediate"

[attachments]
download_dir = "/tmp/mdbridge-attachments"
"#,
    );
    std::env::set_var("MDBRIDGE_CONFIG_PATH", path.to_str().unwrap());

    let config = Config::load().unwrap();

    assert_eq!(config.account.username, "4915112345678");
    assert_eq!(config.account.display_name, "Alice");
    assert!(config.history.fetch_history);
    assert_eq!(config.cache.capacity, 25);
    assert_eq!(config.avatars.queue_capacity, 8);
    assert_eq!(config.avatars.timeout_secs, 30);
    assert!(config.avatars.enabled);
    assert_eq!(config.receipts.policy, ReceiptPolicy::Immediate);
    assert_eq!(config.attachments.download_dir, "/tmp/mdbridge-attachments");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_config_env_var_overrides() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[account]
username = "4915112345678"
display_name = "Alice"
"#,
    );
    std::env::set_var("MDBRIDGE_CONFIG_PATH", path.to_str().unwrap());
    std::env::set_var("MDBRIDGE_USERNAME", "15550001");
    std::env::set_var("MDBRIDGE_DISPLAY_NAME", "Override");
    std::env::set_var("MDBRIDGE_FETCH_HISTORY", "yes");

    let config = Config::load().unwrap();

    assert_eq!(config.account.username, "15550001");
    assert_eq!(config.account.display_name, "Override");
    assert!(config.history.fetch_history);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_unparseable_fetch_history_is_ignored() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[history]\nfetch_history = true\n");
    std::env::set_var("MDBRIDGE_CONFIG_PATH", path.to_str().unwrap());
    std::env::set_var("MDBRIDGE_FETCH_HISTORY", "sometimes");

    let config = Config::load().unwrap();
    assert!(config.history.fetch_history);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_values_fail_validation() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[avatars]\ntimeout_secs = 600\n");
    std::env::set_var("MDBRIDGE_CONFIG_PATH", path.to_str().unwrap());

    let err = Config::load().unwrap_err();
    assert!(err.to_string().contains("timeout_secs"));

    let path = write_config(&dir, "[cache]\ncapacity = 0\n");
    std::env::set_var("MDBRIDGE_CONFIG_PATH", path.to_str().unwrap());
    assert!(Config::load().is_err());

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_malformed_toml_is_an_error() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[receipts]\npolicy = \"sometimes\"\n");

    let err = Config::from_file(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse"));
}

#[test]
fn test_effective_config_round_trips_through_toml() {
    let mut config = Config::default();
    config.account.username = "15550001".to_string();
    config.receipts.policy = ReceiptPolicy::Never;

    let rendered = config.to_toml().unwrap();
    let parsed: Config = toml::from_str(&rendered).unwrap();

    assert_eq!(parsed.account.username, "15550001");
    assert_eq!(parsed.receipts.policy, ReceiptPolicy::Never);
    assert_eq!(parsed.cache.capacity, config.cache.capacity);
}
