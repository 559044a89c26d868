//! CLI error types.

use mmdshot_config::ConfigError;
use mmdshot_render::{BridgeError, PipelineError};
use mmdshot_schema::SchemaError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid batch JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    Bridge(#[from] BridgeError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Mismatch(String),
}
