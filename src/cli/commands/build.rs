//! Build command implementation
//!
//! This module implements the `build` command, which turns a flat or
//! structured document into a raw composition.

use super::{load_index, read_json, write_json};
use crate::config::load_config_or_default;
use crate::core::convert::{build_composition, Format};
use crate::domain::ContextBag;
use crate::{log_conversion_complete, log_conversion_start, log_error_with_context};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Web Template JSON file
    #[arg(short, long)]
    pub template: PathBuf,

    /// Flat or structured input document
    #[arg(short, long)]
    pub input: PathBuf,

    /// Input format (flat or structured)
    #[arg(short, long, default_value = "flat")]
    pub format: Format,

    /// Context bag JSON file, overlaid on the configured context
    #[arg(long)]
    pub context: Option<PathBuf>,

    /// Write the composition to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl BuildArgs {
    /// Execute the build command
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

        let document = read_json(&self.input)?;
        let mut context = config.context.clone();
        if let Some(path) = &self.context {
            let overlay: ContextBag = serde_json::from_value(read_json(path)?)?;
            context = context.merged_with(overlay);
        }

        log_conversion_start!("build", index.template_id());
        let started = Instant::now();
        let options = config.conversion.options();
        match build_composition(&index, self.format, &document, &context, &options) {
            Ok(raw) => {
                let entries = document.as_object().map_or(0, |entries| entries.len());
                log_conversion_complete!("build", entries, started.elapsed());
                write_json(&raw, self.output.as_deref())?;
                Ok(0)
            }
            Err(e) => {
                log_error_with_context!(&e, "Failed to build composition");
                eprintln!("❌ Build failed: {e}");
                Ok(3) // Conversion error exit code
            }
        }
    }
}
