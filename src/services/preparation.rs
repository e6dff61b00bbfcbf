//! The preparation run controller.
//!
//! One [`Preparer::run`] call prepares one project folder (or one single
//! file) for one [`PreparationKind`]:
//!
//! 1. stage the source files into the kind's output subfolder (or a scratch
//!    directory in single-file mode), reusing earlier results when lazy
//! 2. size a [`FailureGovernor`] to the number of staged files
//! 3. for every staged file in walk order: record a reuse, skip it lazily,
//!    or run the kind's step sequence
//! 4. in single-file mode, copy the result out and delete the scratch directory
//!
//! Only the two escalation routes (a killed tool, a tripped governor) and
//! filesystem failures end a run early; they surface as [`PrepareError`] and
//! `main` turns them into the process exit status.

use crate::metrics::Metrics;
use crate::models::{FileStatus, PrepareSettings, PreparationKind};
use crate::services::cache::{CacheError, ResultCache};
use crate::services::governor::FailureGovernor;
use crate::services::materialize::Materializer;
use crate::services::paths;
use crate::services::pipeline::{FilePipeline, PipelineOutcome, StepError};
use crate::services::projects;
use crate::services::rewrite::TextRewriter;
use crate::services::source_tree::{self, SOURCE_FOLDER, TreeError};
use crate::services::staging::{self, StagingError, StagingReport};
use crate::services::tools::{ToolFailure, ToolRunner, Toolchain};
use crate::state::StateManager;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs;
use std::io;
use thiserror::Error;

/// Exit status for internal software errors (`EX_SOFTWARE` in sysexits.h).
pub const EX_SOFTWARE: i32 = 70;

/// Ways a preparation run can end early
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("{0}")]
    Usage(String),

    #[error("Fatal tool failure: {0}")]
    ToolKilled(ToolFailure),

    #[error("Too many errors ({errors}). Aborting preparation.")]
    GovernorTripped { errors: usize },

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PrepareError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PrepareError::ToolKilled(_) | PrepareError::GovernorTripped { .. } => EX_SOFTWARE,
            _ => 1,
        }
    }

    fn io(path: &Utf8Path, source: io::Error) -> Self {
        PrepareError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Per-run switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub lazy_preparation: bool,
    pub backups: bool,
    pub prefer_links: bool,
    /// Input list of earlier projects whose results may be reused (lazy runs only).
    pub prepare_from: Option<Utf8PathBuf>,
}

impl RunOptions {
    pub fn from_settings(settings: &PrepareSettings) -> Self {
        Self {
            lazy_preparation: settings.lazy_preparation,
            backups: settings.backups,
            prefer_links: settings.prefer_links,
            prepare_from: None,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_settings(&PrepareSettings::default())
    }
}

/// What a run works on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunInput {
    /// A project directory containing a `source` folder.
    Folder(Utf8PathBuf),
    /// One file, prepared in a scratch directory; the result goes to `output`.
    File {
        input: Utf8PathBuf,
        output: Utf8PathBuf,
    },
}

/// Per-file outcome counts of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub project: String,
    pub kind: PreparationKind,
    pub prepared: usize,
    pub reused: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn new(project: &str, kind: PreparationKind) -> Self {
        Self {
            project: project.to_string(),
            kind,
            prepared: 0,
            reused: 0,
            skipped: 0,
            failed: 0,
        }
    }

    fn count(&mut self, status: FileStatus) {
        match status {
            FileStatus::Prepared => self.prepared += 1,
            FileStatus::Reused => self.reused += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.prepared + self.reused + self.skipped + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' {}: {} prepared, {} reused, {} skipped, {} failed",
            self.kind, self.project, self.prepared, self.reused, self.skipped, self.failed
        )
    }
}

/// Drives preparation runs with one toolchain and tool runner
pub struct Preparer<R: ToolRunner> {
    options: RunOptions,
    toolchain: Toolchain,
    runner: R,
    rewriter: TextRewriter,
    state: StateManager,
    metrics: Metrics,
}

impl<R: ToolRunner> Preparer<R> {
    pub fn new(options: RunOptions, toolchain: Toolchain, runner: R) -> Self {
        Self {
            options,
            toolchain,
            runner,
            rewriter: TextRewriter::new(),
            state: StateManager::new(),
            metrics: Metrics::new(),
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run state; clone it to follow a run from elsewhere.
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn run(
        &self,
        kind: PreparationKind,
        input: &RunInput,
    ) -> Result<RunSummary, PrepareError> {
        match input {
            RunInput::Folder(folder) => self.prepare_folder(kind, folder).await,
            RunInput::File { input, output } => self.prepare_file(kind, input, output).await,
        }
    }

    /// Prepare every source file of the project at `folder`.
    pub async fn prepare_folder(
        &self,
        kind: PreparationKind,
        folder: &Utf8Path,
    ) -> Result<RunSummary, PrepareError> {
        let project = folder.file_name().unwrap_or(folder.as_str()).to_string();
        tracing::info!("# starting '{}' preparations: {}", kind, project);

        let source_root = folder.join(SOURCE_FOLDER);
        let dest_root = folder.join(kind.subfolder());

        let cache = self.result_cache(kind)?;
        let materializer = Materializer::new(self.options.prefer_links);
        let report = staging::stage_tree(
            &source_root,
            &dest_root,
            self.options.lazy_preparation,
            &cache,
            kind,
            &materializer,
        )?;
        if self.options.lazy_preparation && report.kept > 0 {
            tracing::debug!(
                "{} files kept from an earlier run in {}; files deleted from the source tree are not removed",
                report.kept,
                dest_root
            );
        }

        let files = source_tree::source_files(&dest_root)?;
        let mut governor = FailureGovernor::for_batch(files.len());
        tracing::debug!(
            "{} files to prepare, tolerating {} tool failures",
            files.len(),
            governor.max_errors()
        );

        self.state.start_run(kind, project.as_str(), files.len());
        let result = self
            .prepare_files(kind, &project, &dest_root, &files, &report, &mut governor)
            .await;
        self.finish(kind, &project, result.as_ref().ok());
        result
    }

    /// Prepare a single file in a scratch directory and copy its result to `output`.
    pub async fn prepare_file(
        &self,
        kind: PreparationKind,
        input: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<RunSummary, PrepareError> {
        let project = input.file_name().unwrap_or(input.as_str()).to_string();
        tracing::info!("# starting '{}' preparations: {}", kind, project);

        let scratch = tempfile::Builder::new()
            .suffix(kind.subfolder())
            .tempdir()
            .map_err(|e| PrepareError::io(input, e))?;
        let scratch_root = paths::from_std(scratch.path().to_path_buf())
            .map_err(|e| PrepareError::io(input, e))?;
        let current = scratch_root.join(&project);

        self.state.start_run(kind, project.as_str(), 1);
        let mut summary = RunSummary::new(&project, kind);
        let mut governor = FailureGovernor::for_batch(1);

        let result = async {
            staging::stage_single_file(input, &current)?;
            let status = self.run_pipeline(kind, &current, &mut governor).await?;
            self.state.record_file(Utf8Path::new(&project), status);
            summary.count(status);

            let result = kind.result_path(&current);
            fs::copy(&result, output).map_err(|e| PrepareError::io(output, e))?;
            Ok::<(), PrepareError>(())
        }
        .await;

        self.finish(kind, &project, result.as_ref().ok().map(|_| &summary));
        result?;
        scratch
            .close()
            .map_err(|e| PrepareError::io(&scratch_root, e))?;
        Ok(summary)
    }

    async fn prepare_files(
        &self,
        kind: PreparationKind,
        project: &str,
        dest_root: &Utf8Path,
        files: &[Utf8PathBuf],
        report: &StagingReport,
        governor: &mut FailureGovernor,
    ) -> Result<RunSummary, PrepareError> {
        let mut summary = RunSummary::new(project, kind);

        for file in files {
            let relative = source_tree::relative_name(file, dest_root);
            self.state.update_progress(&relative);

            let status = if report.was_reused(&relative) {
                self.metrics.record_file_reused();
                FileStatus::Reused
            } else if self.can_skip(kind, file) {
                tracing::debug!("Lazily skipping preparation of {}", relative);
                self.metrics.record_file_skipped();
                FileStatus::Skipped
            } else {
                self.run_pipeline(kind, file, governor).await?
            };

            self.state.record_file(&relative, status);
            summary.count(status);
        }

        Ok(summary)
    }

    async fn run_pipeline(
        &self,
        kind: PreparationKind,
        file: &Utf8Path,
        governor: &mut FailureGovernor,
    ) -> Result<FileStatus, PrepareError> {
        let pipeline = FilePipeline::new(
            &self.runner,
            &self.toolchain,
            &self.rewriter,
            &self.metrics,
            self.options.backups,
        );

        match pipeline.run(kind, file, governor).await? {
            PipelineOutcome::Completed { .. } => {
                self.metrics.record_file_prepared();
                Ok(FileStatus::Prepared)
            }
            PipelineOutcome::Failed(_) => {
                self.metrics.record_file_failed();
                Ok(FileStatus::Failed)
            }
        }
    }

    /// A lazy run leaves a file alone when its result already exists.
    ///
    /// Kinds whose result is the working file itself are never skipped.
    pub fn can_skip(&self, kind: PreparationKind, file: &Utf8Path) -> bool {
        if !self.options.lazy_preparation {
            return false;
        }
        let result = kind.result_path(file);
        result.is_file() && result != file
    }

    /// The result cache for `kind`, empty unless a lazy run names earlier projects.
    fn result_cache(&self, kind: PreparationKind) -> Result<ResultCache, PrepareError> {
        let Some(list) = self
            .options
            .prepare_from
            .as_deref()
            .filter(|_| self.options.lazy_preparation)
        else {
            return Ok(ResultCache::new());
        };

        let prepared = projects::read_input_list(list).map_err(|e| PrepareError::io(list, e))?;
        Ok(ResultCache::build(&prepared, kind)?)
    }

    fn finish(&self, kind: PreparationKind, project: &str, summary: Option<&RunSummary>) {
        self.state.finish_run();
        if let Some(summary) = summary {
            tracing::info!("{}", summary);
        }
        tracing::info!("# finished '{}' preparations: {}", kind, project);
        self.metrics.log_summary();
    }
}
