//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Meridian configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateConfigArgs {}

impl ValidateConfigArgs {
    /// Execute the validate-config command
    pub fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates after parsing
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let conversion = &config.conversion;
        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!(
            "  Default Language: {}",
            conversion.default_language.as_deref().unwrap_or("(template default)")
        );
        println!("  Relaxed Names: {}", conversion.relaxed_names);
        println!("  Fixed Values: {:?}", conversion.fixed_values);
        println!("  RM Version: {}", conversion.rm_version);
        println!("  Generate UID: {}", conversion.generate_uid);
        println!("  System ID: {}", conversion.system_id);
        if let Some(territory) = &config.context.territory {
            println!("  Context Territory: {territory}");
        }
        println!("  Console Log: {:?}", config.logging.console);
        if config.logging.local_enabled {
            println!(
                "  Log Files: {}/{} ({})",
                config.logging.local_path,
                config.logging.local_file_name,
                config.logging.local_rotation
            );
        }
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_config_exit_codes() {
        let args = ValidateConfigArgs {};
        assert_eq!(args.execute("nonexistent-meridian.toml").unwrap(), 2);

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[conversion]\nfixed_values = \"reject\"\n").unwrap();
        file.flush().unwrap();
        let path = file.path().to_string_lossy().to_string();
        assert_eq!(args.execute(&path).unwrap(), 0);

        let mut broken = NamedTempFile::new().unwrap();
        broken.write_all(b"[logging]\nlocal_rotation = \"weekly\"\n").unwrap();
        broken.flush().unwrap();
        let path = broken.path().to_string_lossy().to_string();
        assert_eq!(args.execute(&path).unwrap(), 2);
    }
}
