//! Batch orchestration: validate, render, trim, report.
//!
//! A run moves through `Start -> Validated -> Rendered -> Trimmed -> Reported
//! -> Done`. Any stage may fail, which ends the run; screenshots already
//! written stay on disk but no report is produced.

use std::fmt;
use std::path::{Path, PathBuf};

use mmdshot_config::{Config, EmptyContentPolicy};
use mmdshot_schema::{ValidatedBatch, validate_batch};
use rayon::prelude::*;

use crate::bridge::{Renderer, check_image_count};
use crate::error::PipelineError;
use crate::report::Report;
use crate::trim::{TrimError, TrimOptions, trim_to_file};

/// Position of a run in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Validated,
    Rendered,
    Trimmed,
    Reported,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Validated => "validated",
            Self::Rendered => "rendered",
            Self::Trimmed => "trimmed",
            Self::Reported => "reported",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Logs stage transitions of a single run.
struct StageLog {
    current: Stage,
}

impl StageLog {
    fn new() -> Self {
        Self {
            current: Stage::Start,
        }
    }

    fn advance(&mut self, next: Stage) {
        tracing::info!(from = %self.current, to = %next, "Pipeline stage");
        self.current = next;
    }

    fn fail(&mut self, error: &PipelineError) {
        tracing::error!(
            from = %self.current,
            stage = error.stage(),
            error = %error,
            "Pipeline failed"
        );
        self.current = Stage::Failed;
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Persisted screenshots, indexed like the batch diagrams.
    pub images: Vec<PathBuf>,
    /// Checksum report, unless reporting is disabled.
    pub report: Option<Report>,
    /// Where the report was written.
    pub report_path: Option<PathBuf>,
}

/// Runs batches through a [`Renderer`] and post-processes the results.
///
/// # Example
///
/// ```ignore
/// use mmdshot_render::{Pipeline, RendererBridge};
///
/// let bridge = RendererBridge::new("yarn -s electron src/electron.js")?;
/// let outcome = Pipeline::new(bridge, "shots")
///     .workers(4)
///     .report(Some("shots/results.md".into()))
///     .run_raw(&batch_json)?;
/// ```
#[derive(Debug)]
pub struct Pipeline<R> {
    renderer: R,
    output_dir: PathBuf,
    workers: usize,
    report_path: Option<PathBuf>,
    empty_content: EmptyContentPolicy,
}

impl<R: Renderer> Pipeline<R> {
    /// Create a pipeline writing screenshots to `output_dir`, with no report.
    pub fn new(renderer: R, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            output_dir: output_dir.into(),
            workers: mmdshot_config::DEFAULT_WORKERS,
            report_path: None,
            empty_content: EmptyContentPolicy::default(),
        }
    }

    /// Create a pipeline from resolved configuration.
    pub fn from_config(renderer: R, config: &Config) -> Self {
        let output = &config.output_resolved;
        Self::new(renderer, output.dir.clone())
            .workers(output.workers)
            .report(output.report.clone())
            .empty_content(config.trim.empty_content)
    }

    /// Size of the trimming thread pool.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Report file location; `None` disables the report stage.
    #[must_use]
    pub fn report(mut self, path: Option<PathBuf>) -> Self {
        self.report_path = path;
        self
    }

    #[must_use]
    pub fn empty_content(mut self, policy: EmptyContentPolicy) -> Self {
        self.empty_content = policy;
        self
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Validate a raw batch document, then run it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Schema`] before anything is sent to the
    /// renderer, or any error from [`Pipeline::run`].
    pub fn run_raw(&self, raw: &serde_json::Value) -> Result<PipelineOutcome, PipelineError> {
        let mut log = StageLog::new();
        let batch = match validate_batch(raw) {
            Ok(batch) => batch,
            Err(e) => {
                let error = PipelineError::from(e);
                log.fail(&error);
                return Err(error);
            }
        };
        self.run_logged(&batch, log)
    }

    /// Run an already validated batch.
    ///
    /// # Errors
    ///
    /// Returns the first error of the stage that failed.
    pub fn run(&self, batch: &ValidatedBatch) -> Result<PipelineOutcome, PipelineError> {
        self.run_logged(batch, StageLog::new())
    }

    fn run_logged(
        &self,
        batch: &ValidatedBatch,
        mut log: StageLog,
    ) -> Result<PipelineOutcome, PipelineError> {
        log.advance(Stage::Validated);
        let result = self.run_stages(batch, &mut log);
        match &result {
            Ok(_) => log.advance(Stage::Done),
            Err(e) => log.fail(e),
        }
        result
    }

    fn run_stages(
        &self,
        batch: &ValidatedBatch,
        log: &mut StageLog,
    ) -> Result<PipelineOutcome, PipelineError> {
        let request = &batch.request;

        let images = self.renderer.render(request)?;
        check_image_count(request.len(), &images)?;
        log.advance(Stage::Rendered);

        let options = TrimOptions {
            margin: request.app_config.margin_px(),
            empty_content: self.empty_content,
        };
        let paths = self.trim_all(&images, options)?;
        log.advance(Stage::Trimmed);

        let Some(report_path) = &self.report_path else {
            return Ok(PipelineOutcome {
                images: paths,
                report: None,
                report_path: None,
            });
        };

        let report = Report::from_images(&images, &batch.expected_checksums);
        report
            .write_to(report_path)
            .map_err(|source| PipelineError::Report {
                path: report_path.clone(),
                source,
            })?;
        tracing::info!(path = %report_path.display(), rows = report.rows().len(), "Report written");
        log.advance(Stage::Reported);

        Ok(PipelineOutcome {
            images: paths,
            report: Some(report),
            report_path: Some(report_path.clone()),
        })
    }

    /// Trim every image on a bounded pool.
    ///
    /// All tasks run to completion; the lowest-index failure is returned.
    fn trim_all(
        &self,
        images: &[String],
        options: TrimOptions,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            PipelineError::Setup(format!(
                "failed to create {}: {e}",
                self.output_dir.display()
            ))
        })?;

        if images.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.min(images.len()))
            .build()
            .map_err(|e| PipelineError::Setup(format!("failed to create thread pool: {e}")))?;

        tracing::debug!(
            images = images.len(),
            workers = pool.current_num_threads(),
            margin = options.margin,
            "Trimming screenshots"
        );

        let mut slots: Vec<Result<PathBuf, TrimError>> = Vec::with_capacity(images.len());
        pool.install(|| {
            images
                .par_iter()
                .enumerate()
                .map(|(index, encoded)| trim_to_file(index, encoded, options, &self.output_dir))
                .collect_into_vec(&mut slots);
        });

        let failed = slots.iter().filter(|slot| slot.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, total = slots.len(), "Some screenshots failed to trim");
        }

        Ok(slots.into_iter().collect::<Result<Vec<_>, _>>()?)
    }
}
