//! `mmdshot run` command implementation.

use std::path::PathBuf;

use clap::Args;
use mmdshot_config::{CliSettings, Config, EmptyContentPolicy};
use mmdshot_render::{MatchStatus, Pipeline, PipelineOutcome, RendererBridge};

use crate::error::CliError;
use crate::input::read_batch;
use crate::output::Output;

/// Arguments for the run command.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Batch request JSON file (`-` reads stdin).
    batch: PathBuf,

    /// Path to configuration file (default: auto-discover mmdshot.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Renderer command line (overrides config).
    #[arg(long, env = "MMDSHOT_COMMAND")]
    command: Option<String>,

    /// Directory for screenshots (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Report file path (overrides config).
    #[arg(long)]
    report: Option<PathBuf>,

    /// Do not write the checksum report.
    #[arg(long, conflicts_with = "report")]
    no_report: bool,

    /// Renderer timeout in seconds (overrides config).
    #[arg(long)]
    timeout: Option<u64>,

    /// Number of trim workers (overrides config).
    #[arg(short, long)]
    workers: Option<usize>,

    /// Blank screenshot handling: `full-frame` or `reject` (overrides config).
    #[arg(long)]
    empty_content: Option<EmptyContentPolicy>,

    /// Fail if any supplied checksum does not match.
    #[arg(long, conflicts_with = "no_report")]
    strict: bool,

    /// Enable verbose output (stage transitions and timing logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunArgs {
    /// Execute the run command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration, validation or any pipeline stage
    /// fails, or on checksum mismatch with `--strict`.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let raw = read_batch(&self.batch)?;
        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;
        tracing::debug!(
            config_path = ?config.config_path,
            workers = config.output_resolved.workers,
            timeout_secs = config.renderer.timeout_secs,
            "Configuration loaded"
        );

        let bridge = RendererBridge::new(&config.renderer.command)?
            .timeout(config.renderer.timeout());

        output.highlight(&format!("Renderer: {}", config.renderer.command));
        output.info(&format!(
            "Output directory: {}",
            config.output_resolved.dir.display()
        ));

        let outcome = Pipeline::from_config(bridge, &config).run_raw(&raw)?;
        self.summarize(&output, &config, &outcome)
    }

    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            command: self.command.clone(),
            timeout_secs: self.timeout,
            output_dir: self.output_dir.clone(),
            report: self.report.clone(),
            report_enabled: self.no_report.then_some(false),
            workers: self.workers,
            empty_content: self.empty_content,
        }
    }

    fn summarize(
        &self,
        output: &Output,
        config: &Config,
        outcome: &PipelineOutcome,
    ) -> Result<(), CliError> {
        output.separator();
        output.success(&format!(
            "Saved {} screenshot(s) to {}",
            outcome.images.len(),
            config.output_resolved.dir.display()
        ));

        let Some(report) = &outcome.report else {
            output.info("Report: disabled");
            if self.strict {
                output.warning("--strict has no effect without a report");
            }
            return Ok(());
        };

        for row in report.rows() {
            output.report_row(row);
        }
        if let Some(path) = &outcome.report_path {
            output.info(&format!("Report: {}", path.display()));
        }

        if self.strict && !report.all_matched() {
            let mismatched: Vec<String> = report
                .rows()
                .iter()
                .filter(|row| row.status == MatchStatus::Mismatch)
                .map(|row| row.index.to_string())
                .collect();
            return Err(CliError::Mismatch(format!(
                "checksum mismatch for diagram(s) {}",
                mismatched.join(", ")
            )));
        }
        Ok(())
    }
}
