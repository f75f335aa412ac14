//! Validate command implementation
//!
//! This module implements the `validate` command, which checks a raw
//! composition against a Web Template and prints the violations.

use super::{load_index, read_json};
use crate::core::convert::validate_composition;
use crate::{log_conversion_complete, log_conversion_start, log_error_with_context};
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Web Template JSON file
    #[arg(short, long)]
    pub template: PathBuf,

    /// Raw composition JSON file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    /// Execute the validate command
    ///
    /// Returns 0 for a compliant composition and 1 when violations exist.
    pub fn execute(&self) -> anyhow::Result<i32> {
        let index = match load_index(&self.template) {
            Ok(index) => index,
            Err(e) => {
                log_error_with_context!(&e, "Failed to load web template");
                eprintln!("❌ {e}");
                return Ok(3); // Conversion error exit code
            }
        };
        let raw = read_json(&self.input)?;

        log_conversion_start!("validate", index.template_id());
        let started = Instant::now();
        let report = match validate_composition(&index, &raw) {
            Ok(report) => report,
            Err(e) => {
                log_error_with_context!(&e, "Failed to walk composition");
                eprintln!("❌ Validation failed: {e}");
                return Ok(3); // Conversion error exit code
            }
        };
        log_conversion_complete!("validate", report.violations.len(), started.elapsed());

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.format_summary());
        }

        Ok(if report.is_success() { 0 } else { 1 })
    }
}
