//! Configuration schema types
//!
//! This module defines the configuration structure for Meridian. Every section
//! is optional; an empty file yields the defaults.

use crate::core::convert::{ConversionOptions, FixedValuePolicy};
use crate::domain::{ContextBag, MeridianError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main Meridian configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeridianConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Conversion options
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Default context bag, overlaid by `--context` files and `ctx/` entries
    #[serde(default)]
    pub context: ContextBag,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MeridianConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.conversion.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Language used when neither the context nor the input names one
    #[serde(default)]
    pub default_language: Option<String>,

    /// Accept display names and terminology codes as path segments
    #[serde(default = "default_true")]
    pub relaxed_names: bool,

    /// Handling of values that contradict a schema fixed value (ignore or reject)
    #[serde(default)]
    pub fixed_values: FixedValuePolicy,

    /// RM release written into archetype details
    #[serde(default = "default_rm_version")]
    pub rm_version: String,

    /// Generate a version uid for built compositions
    #[serde(default)]
    pub generate_uid: bool,

    /// System id part of generated uids
    #[serde(default = "default_system_id")]
    pub system_id: String,
}

impl ConversionConfig {
    fn validate(&self) -> Result<(), String> {
        if let Some(language) = &self.default_language {
            if language.trim().is_empty() {
                return Err("conversion.default_language cannot be empty".to_string());
            }
        }

        let is_release = |version: &str| {
            let parts: Vec<&str> = version.split('.').collect();
            parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        };
        if !is_release(&self.rm_version) {
            return Err(format!(
                "Invalid conversion.rm_version '{}'. Expected a release like 1.0.4",
                self.rm_version
            ));
        }

        if self.system_id.is_empty() || self.system_id.contains("::") {
            return Err(format!(
                "Invalid conversion.system_id '{}'. Must be non-empty and must not contain '::'",
                self.system_id
            ));
        }

        Ok(())
    }

    /// Runtime options for one conversion
    pub fn options(&self) -> ConversionOptions {
        ConversionOptions {
            default_language: self.default_language.clone(),
            relaxed_names: self.relaxed_names,
            fixed_values: self.fixed_values,
            rm_version: self.rm_version.clone(),
            generate_uid: self.generate_uid,
            system_id: self.system_id.clone(),
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            default_language: None,
            relaxed_names: true,
            fixed_values: FixedValuePolicy::default(),
            rm_version: default_rm_version(),
            generate_uid: false,
            system_id: default_system_id(),
        }
    }
}

impl From<&ConversionConfig> for ConversionOptions {
    fn from(config: &ConversionConfig) -> Self {
        config.options()
    }
}

/// How diagnostics are written to stderr
///
/// Converted documents go to stdout, so the console sink never shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// Compact human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
    /// No console output
    Off,
}

impl FromStr for ConsoleFormat {
    type Err = MeridianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "off" => Ok(Self::Off),
            _ => Err(MeridianError::Configuration(format!(
                "Invalid console format: {s}. Expected 'text', 'json' or 'off'"
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Console sink on stderr
    #[serde(default)]
    pub console: ConsoleFormat,

    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// File name prefix inside `local_path`
    #[serde(default = "default_local_file_name")]
    pub local_file_name: String,

    /// Log rotation strategy (daily, hourly or never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path is required when local logging is enabled".to_string());
        }

        if self.local_file_name.trim().is_empty() || self.local_file_name.contains(['/', '\\']) {
            return Err(format!(
                "Invalid logging.local_file_name '{}'. Must be a plain file name",
                self.local_file_name
            ));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console: ConsoleFormat::default(),
            local_enabled: false,
            local_path: default_local_path(),
            local_file_name: default_local_file_name(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_rm_version() -> String {
    "1.0.4".to_string()
}

fn default_system_id() -> String {
    "local.meridian".to_string()
}

fn default_local_path() -> String {
    "logs".to_string()
}

fn default_local_file_name() -> String {
    "meridian.log".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig {
            log_level: "info".to_string(),
        };

        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test_case("1.0.4", true)]
    #[test_case("1.1.0", true)]
    #[test_case("1.0", false)]
    #[test_case("v1.0.4", false)]
    #[test_case("", false)]
    fn test_rm_version_validation(rm_version: &str, valid: bool) {
        let config = ConversionConfig {
            rm_version: rm_version.to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[test]
    fn test_system_id_validation() {
        let mut config = ConversionConfig::default();
        config.system_id = "a::b".to_string();
        assert!(config.validate().is_err());

        config.system_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_rotation_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.local_rotation = "hourly".to_string();
        assert!(config.validate().is_ok());

        config.local_rotation = "never".to_string();
        assert!(config.validate().is_ok());

        config.local_rotation = "size".to_string();
        assert!(config.validate().is_err());
    }

    #[test_case("" ; "empty")]
    #[test_case("logs/meridian.log" ; "nested path")]
    fn test_logging_file_name_validation(name: &str) {
        let config = LoggingConfig {
            local_file_name: name.to_string(),
            ..LoggingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_console_format_from_toml() {
        let config: MeridianConfig = toml::from_str("[logging]\nconsole = \"off\"\n").unwrap();
        assert_eq!(config.logging.console, ConsoleFormat::Off);
        assert_eq!(config.logging.local_file_name, "meridian.log");
        assert_eq!("JSON".parse::<ConsoleFormat>().unwrap(), ConsoleFormat::Json);
        assert!("pretty".parse::<ConsoleFormat>().is_err());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: MeridianConfig = toml::from_str("").unwrap();
        assert_eq!(config.application.log_level, "info");
        assert!(config.conversion.relaxed_names);
        assert_eq!(config.conversion.fixed_values, FixedValuePolicy::Ignore);
        assert_eq!(config.context, ContextBag::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conversion_options_from_config() {
        let config: MeridianConfig = toml::from_str(
            r#"
[conversion]
default_language = "de"
relaxed_names = false
fixed_values = "reject"
generate_uid = true
system_id = "ehr.example.org"
"#,
        )
        .unwrap();

        let options = ConversionOptions::from(&config.conversion);
        assert_eq!(options.default_language.as_deref(), Some("de"));
        assert!(!options.relaxed_names);
        assert_eq!(options.fixed_values, FixedValuePolicy::Reject);
        assert!(options.generate_uid);
        assert_eq!(options.system_id, "ehr.example.org");
        assert_eq!(options.rm_version, "1.0.4");
    }

    #[test]
    fn test_context_section() {
        let config: MeridianConfig = toml::from_str(
            r#"
[context]
language = "en"
territory = "IE"
composer_name = "Dr. Lee"
"#,
        )
        .unwrap();
        assert_eq!(config.context.territory.as_deref(), Some("IE"));
        assert_eq!(config.context.composer_name.as_deref(), Some("Dr. Lee"));
    }
}
