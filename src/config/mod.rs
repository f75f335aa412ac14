//! Configuration management for Meridian.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Meridian uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `MERIDIAN_<SECTION>_<KEY>` environment overrides
//! - Default values for every setting
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use meridian::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("meridian.toml")?;
//!
//! let options = config.conversion.options();
//! println!("RM version: {}", options.rm_version);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Application settings (log level)
//! - [`ConversionConfig`] - Conversion options (language, name matching, fixed values, uids)
//! - [`ContextBag`](crate::domain::ContextBag) - Default composition context
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [conversion]
//! default_language = "en"
//! relaxed_names = true
//! fixed_values = "ignore"
//! generate_uid = true
//! system_id = "${MERIDIAN_SYSTEM_ID}"
//!
//! [context]
//! territory = "IE"
//! composer_name = "Meridian import"
//!
//! [logging]
//! console = "text"
//! local_enabled = false
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_or_default};
pub use schema::{ApplicationConfig, ConsoleFormat, ConversionConfig, LoggingConfig, MeridianConfig};
