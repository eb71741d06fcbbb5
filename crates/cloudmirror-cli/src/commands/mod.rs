//! CLI subcommands

pub mod check;
pub mod sync;

use cloudmirror_core::config::ValidationError;

use crate::output::OutputFormatter;

/// Prints every validation error, one per line
pub(crate) fn print_validation_errors(formatter: &dyn OutputFormatter, errors: &[ValidationError]) {
    formatter.error(&format!(
        "Configuration has {}:",
        crate::output::count(errors.len(), "error")
    ));
    for error in errors {
        formatter.info(&error.to_string());
    }
}

/// JSON rendering of validation errors
pub(crate) fn validation_errors_json(errors: &[ValidationError]) -> serde_json::Value {
    errors
        .iter()
        .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
        .collect()
}
