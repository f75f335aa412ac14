//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::MeridianConfig;
use crate::core::convert::FixedValuePolicy;
use crate::domain::errors::MeridianError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into MeridianConfig
/// 4. Applies environment variable overrides (MERIDIAN_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use meridian::config::loader::load_config;
///
/// let config = load_config("meridian.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<MeridianConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MeridianError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        MeridianError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: MeridianConfig = toml::from_str(&contents)
        .map_err(|e| MeridianError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        MeridianError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Loads the configuration file, or the defaults when it does not exist
///
/// Environment overrides apply in both cases.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<MeridianConfig> {
    let path = path.as_ref();
    if path.exists() {
        return load_config(path);
    }

    let mut config = MeridianConfig::default();
    apply_env_overrides(&mut config)?;
    config.validate().map_err(|e| {
        MeridianError::Configuration(format!("Configuration validation failed: {}", e))
    })?;
    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied unchanged.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| MeridianError::Other(format!("Invalid placeholder pattern: {e}")))?;
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(MeridianError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using MERIDIAN_* prefix
///
/// Environment variables follow the pattern: MERIDIAN_<SECTION>_<KEY>
/// For example: MERIDIAN_CONVERSION_FIXED_VALUES, MERIDIAN_CONTEXT_TERRITORY
fn apply_env_overrides(config: &mut MeridianConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("MERIDIAN_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Conversion overrides
    if let Ok(val) = std::env::var("MERIDIAN_CONVERSION_DEFAULT_LANGUAGE") {
        config.conversion.default_language = Some(val);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONVERSION_RELAXED_NAMES") {
        config.conversion.relaxed_names = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONVERSION_FIXED_VALUES") {
        config.conversion.fixed_values = val.parse::<FixedValuePolicy>()?;
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONVERSION_RM_VERSION") {
        config.conversion.rm_version = val;
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONVERSION_GENERATE_UID") {
        config.conversion.generate_uid = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONVERSION_SYSTEM_ID") {
        config.conversion.system_id = val;
    }

    // Context overrides
    if let Ok(val) = std::env::var("MERIDIAN_CONTEXT_LANGUAGE") {
        config.context.language = Some(val);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONTEXT_TERRITORY") {
        config.context.territory = Some(val);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONTEXT_COMPOSER_NAME") {
        config.context.composer_name = Some(val);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONTEXT_COMPOSER_ID") {
        config.context.composer_id = Some(val);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONTEXT_ID_SCHEME") {
        config.context.id_scheme = Some(val);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONTEXT_ID_NAMESPACE") {
        config.context.id_namespace = Some(val);
    }
    if let Ok(val) = std::env::var("MERIDIAN_CONTEXT_SETTING") {
        config.context.setting = Some(val);
    }

    // Logging overrides
    if let Ok(val) = std::env::var("MERIDIAN_LOGGING_CONSOLE") {
        config.logging.console = val.parse()?;
    }
    if let Ok(val) = std::env::var("MERIDIAN_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("MERIDIAN_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("MERIDIAN_LOGGING_LOCAL_FILE_NAME") {
        config.logging.local_file_name = val;
    }
    if let Ok(val) = std::env::var("MERIDIAN_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}
