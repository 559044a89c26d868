//! `mmdshot validate` command implementation.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use mmdshot_schema::{SchemaError, validate_batch};

use crate::error::CliError;
use crate::input::read_batch;
use crate::output::Output;

/// Arguments for the validate command.
#[derive(Args)]
pub(crate) struct ValidateArgs {
    /// Batch request JSON file (`-` reads stdin).
    batch: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ValidateArgs {
    /// Execute the validate command.
    ///
    /// Prints the normalized renderer request to stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be read or fails validation.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let raw = read_batch(&self.batch)?;

        let normalized = match normalize(&raw) {
            Ok(normalized) => normalized,
            Err(CliError::Schema(err)) => {
                for violation in &err.violations {
                    output.warning(&format!("  {violation}"));
                }
                return Err(violation_summary(&err));
            }
            Err(err) => return Err(err),
        };

        writeln!(std::io::stdout().lock(), "{}", normalized.json)?;
        output.success(&format!(
            "Batch is valid: {} diagram(s), {} with expected checksums",
            normalized.diagrams, normalized.checksums
        ));
        Ok(())
    }
}

/// Normalized request ready for the renderer.
#[derive(Debug)]
struct Normalized {
    json: String,
    diagrams: usize,
    checksums: usize,
}

/// Error reported after the individual violations were already listed.
fn violation_summary(err: &SchemaError) -> CliError {
    CliError::Validation(format!(
        "batch failed validation with {} violation(s)",
        err.violations.len()
    ))
}

fn normalize(raw: &serde_json::Value) -> Result<Normalized, CliError> {
    let batch = validate_batch(raw)?;
    Ok(Normalized {
        json: serde_json::to_string_pretty(&batch.request)?,
        diagrams: batch.request.len(),
        checksums: batch.expected_checksums.iter().flatten().count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_normalize_fills_defaults_and_drops_checksums() {
        let raw = json!({
            "mmd": [
                {"code": "graph TD", "checksum": "5d41402abc4b2a76b9719d911017c592"},
                {"code": "graph LR", "config": {"theme": "forest"}}
            ],
            "config": {"width": 1200, "zoom": 1.5}
        });

        let normalized = normalize(&raw).unwrap();
        let value: serde_json::Value = serde_json::from_str(&normalized.json).unwrap();

        assert_eq!(normalized.diagrams, 2);
        assert_eq!(normalized.checksums, 1);
        assert_eq!(
            value,
            json!({
                "mmd": [
                    {"code": "graph TD"},
                    {"code": "graph LR", "config": {"theme": "forest"}}
                ],
                "mmd_config": {},
                "config": {"margin": 20.0, "max_width": -1, "width": 1200, "zoom": 1.5}
            })
        );
    }

    #[test]
    fn test_normalize_reports_schema_error() {
        let raw = json!({"mmd": [{"code": 5}]});
        let err = normalize(&raw).unwrap_err();
        match err {
            CliError::Schema(e) => assert!(e.has_path("mmd[0].code")),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_violation_summary_does_not_repeat_violations() {
        let raw = json!({"mmd": [{"code": 5, "colour": "red"}]});
        let Err(CliError::Schema(err)) = normalize(&raw) else {
            panic!("expected schema error");
        };

        let message = violation_summary(&err).to_string();

        assert_eq!(message, "batch failed validation with 2 violation(s)");
        assert!(!message.contains("mmd[0]"));
    }
}
