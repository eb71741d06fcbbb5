//! Sync command - Mirror the configured local roots into Google Drive
//!
//! Provides the `cloudmirror sync` CLI command which:
//! 1. Validates the configuration
//! 2. Authenticates with the credentials file
//! 3. Builds the Drive remote store (wrapped for dry runs)
//! 4. Runs the ReconciliationEngine and displays the report

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use cloudmirror_core::config::Config;
use cloudmirror_core::domain::policy::{ChangeDetection, MappingErrorPolicy};
use cloudmirror_core::ports::authenticator::IAuthenticator;
use cloudmirror_core::ports::remote_store::IRemoteStore;
use cloudmirror_gdrive::auth::CredentialsFileAuthenticator;
use cloudmirror_gdrive::client::DriveClient;
use cloudmirror_gdrive::store::DriveRemoteStore;
use cloudmirror_sync::{DryRunStore, EngineOptions, MappingReport, ReconcileReport, ReconciliationEngine};
use tracing::info;

use super::{print_validation_errors, validation_errors_json};
use crate::output::{count, get_formatter, OutputFormat, OutputFormatter};

/// Change detection modes selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChangeDetectionArg {
    /// Upload every file that exists on both sides
    Always,
    /// Skip files whose remote copy has the same size and is not older
    SizeAndModified,
}

impl From<ChangeDetectionArg> for ChangeDetection {
    fn from(arg: ChangeDetectionArg) -> Self {
        match arg {
            ChangeDetectionArg::Always => ChangeDetection::Always,
            ChangeDetectionArg::SizeAndModified => ChangeDetection::SizeAndModified,
        }
    }
}

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Keep going when a mapping fails and report it at the end
    #[arg(long)]
    pub continue_on_error: bool,

    /// Override `sync.change_detection` from the configuration
    #[arg(long, value_enum)]
    pub change_detection: Option<ChangeDetectionArg>,
}

impl SyncCommand {
    /// Engine options from the configuration, with command line overrides applied
    pub fn options(&self, config: &Config) -> EngineOptions {
        let mut options = EngineOptions::from_config(config);
        if self.continue_on_error {
            options.on_mapping_error = MappingErrorPolicy::ContinueAndReport;
        }
        if let Some(mode) = self.change_detection {
            options.change_detection = mode.into();
        }
        options
    }

    pub async fn execute(
        &self,
        config_path: &Path,
        config: Config,
        format: OutputFormat,
    ) -> Result<ExitCode> {
        let formatter = get_formatter(format);

        // Step 1: Validate before any remote call
        let errors = config.validate();
        if !errors.is_empty() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "errors": validation_errors_json(&errors),
                }));
            } else {
                print_validation_errors(formatter.as_ref(), &errors);
            }
            return Ok(ExitCode::FAILURE);
        }
        info!(config_path = %config_path.display(), mappings = config.paths.len(), "Loaded configuration");

        let mappings = config.mappings()?;
        let root_id = config.root_id()?;
        let options = self.options(&config);

        // Step 2: Authenticate
        let credential = CredentialsFileAuthenticator::new()
            .authenticate(&config.credentials_file)
            .await
            .context("Authentication failed")?;

        // Step 3: Create adapters
        let client = DriveClient::new(
            credential.access_token.as_str(),
            Duration::from_secs(config.remote.request_timeout_secs),
        )?;
        let drive: Arc<dyn IRemoteStore> =
            Arc::new(DriveRemoteStore::new(client).with_page_size(config.remote.page_size));
        let store: Arc<dyn IRemoteStore> = if self.dry_run {
            formatter.info("Dry run mode - no changes will be made");
            Arc::new(DryRunStore::new(drive))
        } else {
            drive
        };

        // Step 4: Run
        let engine = ReconciliationEngine::new(store, root_id, config.exclusions(), options);
        let report = match engine.run(&mappings).await {
            Ok(report) => report,
            Err(err) => {
                let message = err.chain();
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "error": message,
                    }));
                } else {
                    formatter.error(&message);
                }
                return Ok(ExitCode::FAILURE);
            }
        };

        // Step 5: Display results
        if format.is_json() {
            let mut json = serde_json::to_value(&report).context("Failed to serialize report")?;
            json["success"] = report.is_success().into();
            json["dry_run"] = self.dry_run.into();
            formatter.print_json(&json);
        } else {
            print_report(formatter.as_ref(), &report, self.dry_run);
        }

        Ok(if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

fn print_report(formatter: &dyn OutputFormatter, report: &ReconcileReport, dry_run: bool) {
    let duration = if report.duration_ms >= 1000 {
        format!("{:.1}s", report.duration_ms as f64 / 1000.0)
    } else {
        format!("{}ms", report.duration_ms)
    };

    if report.is_success() {
        formatter.success(&format!(
            "{} in {}",
            if dry_run { "Dry run completed" } else { "Sync completed" },
            duration
        ));
    } else {
        formatter.error(&format!(
            "{} of {} failed",
            count(report.failures.len(), "mapping"),
            report.failures.len() + report.mappings.len()
        ));
    }

    for mapping in &report.mappings {
        formatter.info(&mapping_line(mapping));
        if mapping.delete_failures > 0 {
            formatter.warn(&format!(
                "{}: {} could not be deleted",
                mapping.local_root.display(),
                count(mapping.delete_failures, "remote node")
            ));
        }
    }
    for failure in &report.failures {
        formatter.error(&format!(
            "{}: {}",
            failure.local_root.display(),
            failure.error
        ));
    }
}

/// One-line summary of a mapping's changes
fn mapping_line(mapping: &MappingReport) -> String {
    let remote = if mapping.remote_path.is_empty() {
        "/"
    } else {
        mapping.remote_path.as_str()
    };

    let mut changes = Vec::new();
    if mapping.folders_created > 0 {
        changes.push(format!("{} created", count(mapping.folders_created, "folder")));
    }
    if mapping.files_created > 0 {
        changes.push(format!("{} created", count(mapping.files_created, "file")));
    }
    if mapping.files_updated > 0 {
        changes.push(format!("{} updated", count(mapping.files_updated, "file")));
    }
    if mapping.files_unchanged > 0 {
        changes.push(format!("{} unchanged", count(mapping.files_unchanged, "file")));
    }
    if mapping.nodes_deleted > 0 {
        changes.push(format!("{} deleted", count(mapping.nodes_deleted, "node")));
    }
    if mapping.entries_excluded + mapping.entries_skipped > 0 {
        changes.push(format!(
            "{} skipped",
            count(mapping.entries_excluded + mapping.entries_skipped, "path")
        ));
    }
    if changes.is_empty() {
        changes.push("nothing to do".to_string());
    }

    format!("{} -> {}: {}", mapping.local_root.display(), remote, changes.join(", "))
}
