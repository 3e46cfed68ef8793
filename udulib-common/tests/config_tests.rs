//! Configuration loading through files and process environment
//!
//! Tests that set `UDULIB_*` variables are marked `#[serial]` so they do not
//! race with each other.

use serial_test::serial;
use std::env;
use std::io::Write;
use udulib_common::config::{CliOverrides, Settings, StorageBackend, CONFIG_ENV_VAR};
use udulib_common::Error;

fn clear_env() {
    for key in [
        CONFIG_ENV_VAR,
        "UDULIB_PORT",
        "UDULIB_JWT_SECRET",
        "UDULIB_DATABASE_PATH",
        "UDULIB_STORAGE_BACKEND",
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_explicit_config_file_is_loaded() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [server]
        port = 8123

        [security]
        jwt_secret = "file-secret"
        bcrypt_cost = 10
        "#
    )
    .unwrap();

    let settings = Settings::load(Some(file.path()), &CliOverrides::default()).unwrap();
    assert_eq!(settings.server.port, 8123);
    assert_eq!(settings.security.jwt_secret, "file-secret");
    assert_eq!(settings.security.bcrypt_cost, 10);
}

#[test]
#[serial]
fn test_missing_explicit_config_file_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = Settings::load(Some(&missing), &CliOverrides::default()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_env_var_names_config_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[storage]\nbackend = \"minio\"").unwrap();
    env::set_var(CONFIG_ENV_VAR, file.path());

    let settings = Settings::load(None, &CliOverrides::default()).unwrap();
    assert_eq!(settings.storage.backend, StorageBackend::Minio);

    clear_env();
}

#[test]
#[serial]
fn test_priority_cli_over_env_over_file() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server]\nport = 7000\n[security]\njwt_secret = \"file\"").unwrap();
    env::set_var("UDULIB_PORT", "7001");
    env::set_var("UDULIB_JWT_SECRET", "env");

    let cli = CliOverrides {
        port: Some(7002),
        ..Default::default()
    };
    let settings = Settings::load(Some(file.path()), &cli).unwrap();

    assert_eq!(settings.server.port, 7002);
    assert_eq!(settings.security.jwt_secret, "env");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_file_values_fail_validation() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[security]\nbcrypt_cost = 40").unwrap();

    let err = Settings::load(Some(file.path()), &CliOverrides::default()).unwrap_err();
    assert!(err.to_string().contains("bcrypt_cost"));
}
