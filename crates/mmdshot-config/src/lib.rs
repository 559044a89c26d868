//! Harness configuration for mmdshot.
//!
//! Parses `mmdshot.toml` with serde and auto-discovers it in the current
//! directory or its parents. The file configures how the harness runs, not
//! what the renderer draws (that lives in the batch request):
//!
//! ```toml
//! [renderer]
//! command = "yarn -s electron --trace-warnings src/electron.js"
//! timeout_secs = 120
//!
//! [output]
//! dir = "screenshots"
//! report = "results.md"
//! workers = 10
//!
//! [trim]
//! empty_content = "full-frame"
//! ```
//!
//! CLI flags are applied on top of the file via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! `renderer.command`, `output.dir` and `output.report` support `${VAR}` and
//! `${VAR:-default}`.

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "mmdshot.toml";

/// Renderer command used when none is configured.
pub const DEFAULT_COMMAND: &str = "yarn -s electron --trace-warnings src/electron.js";

/// Renderer timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Trim worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 10;

/// Report filename used when none is configured.
pub const DEFAULT_REPORT: &str = "results.md";

/// Upper bound on trim workers.
const MAX_WORKERS: usize = 256;

/// CLI settings that override configuration file values.
///
/// Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override renderer command.
    pub command: Option<String>,
    /// Override renderer timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Override output directory.
    pub output_dir: Option<PathBuf>,
    /// Override report path.
    pub report: Option<PathBuf>,
    /// Disable (`Some(false)`) or force-enable the report.
    pub report_enabled: Option<bool>,
    /// Override trim worker count.
    pub workers: Option<usize>,
    /// Override empty-content policy.
    pub empty_content: Option<EmptyContentPolicy>,
}

/// Harness configuration.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Renderer subprocess configuration.
    pub renderer: RendererConfig,
    /// Output configuration (paths are relative strings from TOML).
    output: OutputConfigRaw,
    /// Trimming configuration.
    pub trim: TrimConfig,

    /// Resolved output configuration (set after loading).
    #[serde(skip)]
    pub output_resolved: OutputConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Renderer subprocess configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Command line launching the renderer, split with shell-word rules.
    pub command: String,
    /// Deadline for one batch round-trip, in seconds.
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_owned(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl RendererConfig {
    /// Renderer deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Raw output configuration as parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OutputConfigRaw {
    dir: Option<String>,
    /// Empty string disables the report.
    report: Option<String>,
    workers: Option<usize>,
}

/// Resolved output configuration with absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Directory receiving `screenshot-<index>.png` files.
    pub dir: PathBuf,
    /// Report file, or `None` when reporting is disabled.
    pub report: Option<PathBuf>,
    /// Size of the trim worker pool.
    pub workers: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            report: Some(PathBuf::from(DEFAULT_REPORT)),
            workers: DEFAULT_WORKERS,
        }
    }
}

/// What to do with an image that has no non-background content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptyContentPolicy {
    /// Keep the full frame uncropped and log a warning.
    #[default]
    FullFrame,
    /// Fail the batch.
    Reject,
}

impl std::str::FromStr for EmptyContentPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full-frame" => Ok(Self::FullFrame),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::Validation(format!(
                "trim.empty_content must be \"full-frame\" or \"reject\", got \"{other}\""
            ))),
        }
    }
}

/// Trimming configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrimConfig {
    /// Policy for images with an empty bounding box.
    pub empty_content: EmptyContentPolicy,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`renderer.command`").
        field: String,
        /// Error message (e.g., "${`ELECTRON_MAIN`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `mmdshot.toml` in the current directory and its parents, falling
    /// back to defaults relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(command) = &settings.command {
            self.renderer.command.clone_from(command);
        }
        if let Some(timeout_secs) = settings.timeout_secs {
            self.renderer.timeout_secs = timeout_secs;
        }
        if let Some(dir) = &settings.output_dir {
            self.output_resolved.dir.clone_from(dir);
        }
        if let Some(report) = &settings.report {
            self.output_resolved.report = Some(report.clone());
        }
        match settings.report_enabled {
            Some(false) => self.output_resolved.report = None,
            Some(true) if self.output_resolved.report.is_none() => {
                self.output_resolved.report = Some(self.output_resolved.dir.join(DEFAULT_REPORT));
            }
            _ => {}
        }
        if let Some(workers) = settings.workers {
            self.output_resolved.workers = workers;
        }
        if let Some(policy) = settings.empty_content {
            self.trim.empty_content = policy;
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "renderer.command cannot be empty".to_owned(),
            ));
        }
        if self.renderer.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "renderer.timeout_secs must be greater than 0".to_owned(),
            ));
        }

        let workers = self.output_resolved.workers;
        if workers == 0 {
            return Err(ConfigError::Validation(
                "output.workers must be greater than 0".to_owned(),
            ));
        }
        if workers > MAX_WORKERS {
            return Err(ConfigError::Validation(format!(
                "output.workers cannot exceed {MAX_WORKERS}"
            )));
        }

        Ok(())
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            renderer: RendererConfig::default(),
            output: OutputConfigRaw::default(),
            trim: TrimConfig::default(),
            output_resolved: OutputConfig {
                dir: base.to_path_buf(),
                report: Some(base.join(DEFAULT_REPORT)),
                workers: DEFAULT_WORKERS,
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.renderer.command = expand::expand_env(&self.renderer.command, "renderer.command")?;

        if let Some(ref dir) = self.output.dir {
            self.output.dir = Some(expand::expand_env(dir, "output.dir")?);
        }
        if let Some(ref report) = self.output.report {
            self.output.report = Some(expand::expand_env(report, "output.report")?);
        }

        Ok(())
    }

    /// Resolve relative paths against the config file's directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let dir = match self.output.dir.as_deref() {
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        };
        let report = match self.output.report.as_deref() {
            Some("") => None,
            Some(report) => Some(config_dir.join(report)),
            None => Some(config_dir.join(DEFAULT_REPORT)),
        };

        self.output_resolved = OutputConfig {
            dir,
            report,
            workers: self.output.workers.unwrap_or(DEFAULT_WORKERS),
        };
    }
}
