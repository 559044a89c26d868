//! Configuration schema and request validation for mmdshot.
//!
//! A batch request names the diagrams to render, an optional global Mermaid
//! configuration, and the application settings that govern post-processing.
//! Before anything is handed to the renderer the whole batch is checked
//! against a closed-world schema:
//!
//! - unknown fields are rejected rather than silently forwarded,
//! - primitive types are strict (no numeric-string coercion),
//! - default-bearing fields are filled in and `null` fields are dropped.
//!
//! # Architecture
//!
//! - [`schema`]: declarative field tables for every configuration namespace
//! - [`model`]: typed, closed records that serialize to the renderer wire format
//! - [`validate`]: the validation pass that turns raw JSON into a [`ValidatedBatch`]
//!
//! # Example
//!
//! ```
//! use mmdshot_schema::validate_batch;
//! use serde_json::json;
//!
//! let raw = json!({
//!     "mmd": [{ "code": "flowchart TD\n a --> b", "checksum": "" }],
//!     "config": { "margin": 0 }
//! });
//! let batch = validate_batch(&raw).unwrap();
//! assert_eq!(batch.request.app_config.margin, 0.0);
//! assert_eq!(batch.expected_checksums, vec![None]);
//! ```

mod error;
pub mod model;
pub mod schema;
pub mod validate;

pub use error::{SchemaError, Violation, ViolationKind};
pub use model::{
    AppConfig, BatchRequest, DiagramRequest, ErConfig, FlowchartConfig, GanttConfig,
    MermaidConfig, SequenceConfig,
};
pub use validate::{ValidatedBatch, validate_batch};
