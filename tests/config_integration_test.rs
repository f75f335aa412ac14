//! Integration tests for configuration loading and validation
//!
//! Every test takes the env mutex since overrides are read from the process
//! environment.

use meridian::config::{load_config, load_config_or_default};
use meridian::core::convert::{ConversionOptions, FixedValuePolicy};
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

// Mutex to serialize tests that read or modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Helper function to clean up environment variables
fn cleanup_env_vars() {
    std::env::remove_var("MERIDIAN_APPLICATION_LOG_LEVEL");
    std::env::remove_var("MERIDIAN_CONVERSION_FIXED_VALUES");
    std::env::remove_var("MERIDIAN_CONVERSION_GENERATE_UID");
    std::env::remove_var("MERIDIAN_CONTEXT_TERRITORY");
    std::env::remove_var("TEST_MERIDIAN_SYSTEM_ID");
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(contents.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_complete_config() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config(
        r#"
[application]
log_level = "debug"

[conversion]
default_language = "de"
relaxed_names = false
fixed_values = "reject"
rm_version = "1.1.0"
generate_uid = true
system_id = "ehr.example.org"

[context]
language = "de"
territory = "DE"
composer_name = "Dr. Weber"
composer_id = "1234"
id_scheme = "HOSPITAL-NS"
id_namespace = "HOSPITAL-NS"
setting = "238"

[logging]
local_enabled = true
local_path = "/tmp/meridian"
local_rotation = "hourly"
"#,
    );

    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "debug");

    assert_eq!(config.conversion.default_language.as_deref(), Some("de"));
    assert!(!config.conversion.relaxed_names);
    assert_eq!(config.conversion.fixed_values, FixedValuePolicy::Reject);
    assert_eq!(config.conversion.rm_version, "1.1.0");
    assert!(config.conversion.generate_uid);
    assert_eq!(config.conversion.system_id, "ehr.example.org");

    assert_eq!(config.context.territory.as_deref(), Some("DE"));
    assert_eq!(config.context.composer_id.as_deref(), Some("1234"));
    assert_eq!(config.context.setting.as_deref(), Some("238"));

    assert!(config.logging.local_enabled);
    assert_eq!(config.logging.local_path, "/tmp/meridian");
    assert_eq!(config.logging.local_rotation, "hourly");
}

#[test]
fn test_load_minimal_config_with_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config("[context]\nterritory = \"IE\"\n");
    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "info");
    assert!(config.conversion.relaxed_names);
    assert_eq!(config.conversion.fixed_values, FixedValuePolicy::Ignore);
    assert_eq!(config.conversion.rm_version, "1.0.4");
    assert!(!config.conversion.generate_uid);
    assert!(!config.logging.local_enabled);
    assert_eq!(config.logging.local_rotation, "daily");

    let options = ConversionOptions::from(&config.conversion);
    assert_eq!(options, ConversionOptions::default());
}

#[test]
fn test_env_var_substitution() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_MERIDIAN_SYSTEM_ID", "ehr.hospital.org");

    let temp_file = write_config(
        r#"
[conversion]
system_id = "${TEST_MERIDIAN_SYSTEM_ID}"
"#,
    );
    let config = load_config(temp_file.path()).expect("Failed to load config");
    assert_eq!(config.conversion.system_id, "ehr.hospital.org");

    cleanup_env_vars();
}

#[test]
fn test_missing_env_var_is_an_error() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config("[conversion]\nsystem_id = \"${TEST_MERIDIAN_SYSTEM_ID}\"\n");
    let err = load_config(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("TEST_MERIDIAN_SYSTEM_ID"));
}

#[test]
fn test_env_overrides_win_over_the_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("MERIDIAN_APPLICATION_LOG_LEVEL", "warn");
    std::env::set_var("MERIDIAN_CONVERSION_FIXED_VALUES", "reject");
    std::env::set_var("MERIDIAN_CONTEXT_TERRITORY", "GB");

    let temp_file = write_config(
        r#"
[application]
log_level = "debug"

[context]
territory = "IE"
"#,
    );
    let config = load_config(temp_file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "warn");
    assert_eq!(config.conversion.fixed_values, FixedValuePolicy::Reject);
    assert_eq!(config.context.territory.as_deref(), Some("GB"));

    cleanup_env_vars();
}

#[test]
fn test_invalid_override_is_an_error() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("MERIDIAN_CONVERSION_FIXED_VALUES", "sometimes");

    let result = load_config_or_default("does-not-exist-meridian.toml");
    assert!(result.is_err());

    cleanup_env_vars();
}

#[test]
fn test_invalid_values_are_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let temp_file = write_config("[logging]\nlocal_rotation = \"size\"\n");
    let err = load_config(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("local_rotation"));

    let temp_file = write_config("[application]\nlog_level = \"verbose\"\n");
    assert!(load_config(temp_file.path()).is_err());
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    assert!(load_config("does-not-exist-meridian.toml").is_err());
    let config = load_config_or_default("does-not-exist-meridian.toml").unwrap();
    assert_eq!(config.conversion.system_id, "local.meridian");
}
