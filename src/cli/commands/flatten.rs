//! Flatten command implementation
//!
//! This module implements the `flatten` command, which turns a raw
//! composition into a flat or structured document.

use super::{load_index, read_json, write_json};
use crate::config::load_config_or_default;
use crate::core::convert::{flatten_composition, Format};
use crate::{log_conversion_complete, log_conversion_start, log_error_with_context};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the flatten command
#[derive(Args, Debug)]
pub struct FlattenArgs {
    /// Web Template JSON file
    #[arg(short, long)]
    pub template: PathBuf,

    /// Raw composition JSON file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output format (flat or structured)
    #[arg(short, long, default_value = "flat")]
    pub format: Format,

    /// Language of node names (defaults to the template's language)
    #[arg(long)]
    pub language: Option<String>,

    /// Write the document to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl FlattenArgs {
    /// Execute the flatten command
    pub fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config_or_default(config_path) {
            Ok(config) => config,
            Err(e) => {
                log_error_with_context!(&e, "Failed to load configuration");
                eprintln!("❌ {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let index = match load_index(&self.template) {
            Ok(index) => index,
            Err(e) => {
                log_error_with_context!(&e, "Failed to load web template");
                eprintln!("❌ {e}");
                return Ok(3); // Conversion error exit code
            }
        };
        let raw = read_json(&self.input)?;

        let language = self
            .language
            .as_deref()
            .or(config.conversion.default_language.as_deref());

        log_conversion_start!("flatten", index.template_id());
        let started = Instant::now();
        match flatten_composition(&index, &raw, self.format, language) {
            Ok(document) => {
                let entries = document.as_object().map_or(0, |entries| entries.len());
                log_conversion_complete!("flatten", entries, started.elapsed());
                write_json(&document, self.output.as_deref())?;
                Ok(0)
            }
            Err(e) => {
                log_error_with_context!(&e, "Failed to flatten composition");
                eprintln!("❌ Flatten failed: {e}");
                Ok(3) // Conversion error exit code
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_flatten_rejects_non_composition() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("template.json");
        fs::write(
            &template,
            r#"{"templateId": "Note.v1", "tree": {"id": "note", "name": "Note", "rmType": "COMPOSITION", "aqlPath": "/"}}"#,
        )
        .unwrap();
        let input = dir.path().join("raw.json");
        fs::write(&input, r#"{"_type": "OBSERVATION"}"#).unwrap();

        let args = FlattenArgs {
            template,
            input,
            format: Format::Flat,
            language: None,
            output: Some(dir.path().join("flat.json")),
        };
        assert_eq!(args.execute("missing-meridian.toml").unwrap(), 3);
        assert!(!dir.path().join("flat.json").exists());
    }
}
