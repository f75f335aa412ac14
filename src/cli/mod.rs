//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Meridian using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Meridian - openEHR composition converter
#[derive(Parser, Debug)]
#[command(name = "meridian")]
#[command(version, about, long_about = None)]
#[command(author = "Meridian Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "meridian.toml", env = "MERIDIAN_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "MERIDIAN_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a raw composition from a flat or structured document
    Build(commands::build::BuildArgs),

    /// Flatten a raw composition into a flat or structured document
    Flatten(commands::flatten::FlattenArgs),

    /// Validate a raw composition against a web template
    Validate(commands::validate::ValidateArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate_config::ValidateConfigArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::convert::Format;

    #[test]
    fn test_cli_parse_build() {
        let cli = Cli::parse_from([
            "meridian", "build", "--template", "wt.json", "--input", "doc.json", "--format", "structured",
        ]);
        assert_eq!(cli.config, "meridian.toml");
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.format, Format::Structured);
                assert!(args.output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_flatten_defaults_to_flat() {
        let cli = Cli::parse_from(["meridian", "flatten", "-t", "wt.json", "-i", "raw.json", "--language", "de"]);
        match cli.command {
            Commands::Flatten(args) => {
                assert_eq!(args.format, Format::Flat);
                assert_eq!(args.language.as_deref(), Some("de"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["meridian", "--config", "custom.toml", "validate-config"]);
        assert_eq!(cli.config, "custom.toml");
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from([
            "meridian", "--log-level", "debug", "validate", "-t", "wt.json", "-i", "raw.json",
        ]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Validate(_)));
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        let result = Cli::try_parse_from(["meridian", "build", "-t", "wt.json", "-i", "d.json", "-f", "xml"]);
        assert!(result.is_err());
    }
}
