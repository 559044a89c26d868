//! Pipeline error type.

use std::path::PathBuf;

use mmdshot_schema::SchemaError;

use crate::bridge::BridgeError;
use crate::trim::TrimError;

/// Failure of a batch run, named after the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("render failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("trim failed: {0}")]
    Trim(#[from] TrimError),

    /// The output directory could not be prepared or the worker pool could not start.
    #[error("trim failed: {0}")]
    Setup(String),

    #[error("report failed: could not write {}: {source}", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Name of the stage the error came from.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Schema(_) => "validate",
            Self::Bridge(_) => "render",
            Self::Trim(_) | Self::Setup(_) => "trim",
            Self::Report { .. } => "report",
        }
    }
}
