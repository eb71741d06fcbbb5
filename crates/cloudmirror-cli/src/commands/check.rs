//! Check command - Validate the configuration without touching the remote
//!
//! Loads the configuration file, runs every validation rule and reports the
//! mappings that would be reconciled.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use cloudmirror_core::config::Config;
use serde_json::json;

use super::{print_validation_errors, validation_errors_json};
use crate::output::{count, get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct CheckCommand {}

impl CheckCommand {
    pub fn execute(
        &self,
        config_path: &Path,
        loaded: Result<Config>,
        format: OutputFormat,
    ) -> Result<ExitCode> {
        let formatter = get_formatter(format);

        let config = match loaded {
            Ok(config) => config,
            Err(e) => {
                if format.is_json() {
                    formatter.print_json(&json!({
                        "valid": false,
                        "path": config_path.display().to_string(),
                        "errors": [{"field": "", "message": format!("{e:#}")}],
                    }));
                } else {
                    formatter.error(&format!("{e:#}"));
                }
                return Ok(ExitCode::FAILURE);
            }
        };

        let errors = config.validate();

        if format.is_json() {
            formatter.print_json(&json!({
                "valid": errors.is_empty(),
                "path": config_path.display().to_string(),
                "errors": validation_errors_json(&errors),
                "mappings": config.paths.len(),
                "exclusions": config.exclude.len(),
            }));
        } else if errors.is_empty() {
            formatter.success(&format!("Configuration is valid ({})", config_path.display()));
            for (local, remote) in &config.paths {
                let remote = if remote.is_empty() { "/" } else { remote.as_str() };
                formatter.info(&format!("{} -> {}", local.display(), remote));
            }
            formatter.info(&count(config.exclude.len(), "exclusion"));
        } else {
            print_validation_errors(formatter.as_ref(), &errors);
        }

        Ok(if errors.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}
