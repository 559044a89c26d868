//! Screenshot pipeline for Mermaid diagram batches.
//!
//! A validated batch is sent to an external renderer process, every returned
//! screenshot is cropped to its content on a bounded thread pool, and the
//! renderer output is checked against expected checksums:
//!
//! - [`RendererBridge`]: subprocess round-trip with timeout
//! - [`trim_image`]: autocrop with optional white margin
//! - [`Report`]: MD5 checksums and the Markdown results table
//! - [`Pipeline`]: drives the stages and persists the artifacts

mod bridge;
mod consts;
mod error;
mod pipeline;
mod report;
mod trim;

pub use bridge::{BridgeError, Renderer, RendererBridge, check_image_count};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineOutcome, Stage};
pub use report::{MatchStatus, Report, ReportRow, content_checksum};
pub use trim::{
    BoundingBox, TrimError, TrimErrorKind, TrimOptions, add_margin, content_bounds, decode_image,
    encode_png, screenshot_filename, trim_image, trim_to_file,
};
