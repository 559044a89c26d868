//! Internal constants for rendering and post-processing.

use std::time::Duration;

/// How often the bridge polls the renderer process for exit.
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Filename prefix for persisted screenshots.
pub const SCREENSHOT_PREFIX: &str = "screenshot";

/// Extension (and encoding) of persisted screenshots.
pub const SCREENSHOT_EXT: &str = "png";

/// Canvas color behind the margin border.
pub const BACKGROUND: [u8; 3] = [255, 255, 255];

/// Upper bound on the RGB canvas allocated for a bordered screenshot.
pub const MAX_CANVAS_BYTES: u64 = 1 << 30;
