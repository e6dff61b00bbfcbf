//! Running a preparation kind's step sequence over one working file.

use crate::metrics::Metrics;
use crate::models::{PreparationKind, Step};
use crate::services::governor::{FailureGovernor, Verdict};
use crate::services::preparation::PrepareError;
use crate::services::rewrite::TextRewriter;
use crate::services::source_tree;
use crate::services::tools::{ToolFailure, ToolInvocation, ToolRunner, ToolStatus, Toolchain};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use std::time::Instant;
use thiserror::Error;

/// Why a single step did not complete
#[derive(Error, Debug)]
pub enum StepError {
    /// A tool exited with a failure code or timed out.
    #[error("{0}")]
    Recoverable(ToolFailure),

    /// A tool was killed by a signal.
    #[error("{0}")]
    Fatal(ToolFailure),

    #[error("Step '{step}' could not start '{command}': {source}")]
    Spawn {
        step: Step,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Step '{step}' failed on {path}: {source}")]
    Filesystem {
        step: Step,
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How a file's step sequence ended, short of aborting the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed { steps: usize, backups: usize },
    /// A recoverable tool failure stopped this file; the run goes on.
    Failed(ToolFailure),
}

/// Numbered `.bak<N>` snapshots of one working file
struct Backups<'f> {
    file: &'f Utf8Path,
    enabled: bool,
    taken: usize,
}

impl<'f> Backups<'f> {
    fn new(file: &'f Utf8Path, enabled: bool) -> Self {
        Self {
            file,
            enabled,
            taken: 0,
        }
    }

    fn take(&mut self, step: Step) -> Result<(), StepError> {
        if !self.enabled {
            return Ok(());
        }
        let backup = Utf8PathBuf::from(format!("{}.bak{}", self.file, self.taken));
        fs::copy(self.file, &backup).map_err(|source| StepError::Filesystem {
            step,
            path: backup.clone(),
            source,
        })?;
        self.taken += 1;
        Ok(())
    }
}

/// Runs step sequences with a shared toolchain and rewriter
pub struct FilePipeline<'a, R: ToolRunner> {
    runner: &'a R,
    toolchain: &'a Toolchain,
    rewriter: &'a TextRewriter,
    metrics: &'a Metrics,
    backups: bool,
}

impl<'a, R: ToolRunner> FilePipeline<'a, R> {
    pub fn new(
        runner: &'a R,
        toolchain: &'a Toolchain,
        rewriter: &'a TextRewriter,
        metrics: &'a Metrics,
        backups: bool,
    ) -> Self {
        Self {
            runner,
            toolchain,
            rewriter,
            metrics,
            backups,
        }
    }

    /// Apply every step of `kind` to `file`, in order.
    ///
    /// A recoverable tool failure ends this file's sequence and is counted by
    /// `governor`; the run is aborted with [`PrepareError::GovernorTripped`]
    /// once the governor says so. A killed tool aborts with
    /// [`PrepareError::ToolKilled`] straight away.
    pub async fn run(
        &self,
        kind: PreparationKind,
        file: &Utf8Path,
        governor: &mut FailureGovernor,
    ) -> Result<PipelineOutcome, PrepareError> {
        let start = Instant::now();
        let mut backups = Backups::new(file, self.backups);
        let mut steps = 0;

        for &step in kind.steps() {
            tracing::debug!("{}: {}", step, file);

            match self.run_step(step, file, &mut backups).await {
                Ok(()) => {
                    steps += 1;
                    self.metrics.record_step();
                }
                Err(StepError::Recoverable(failure)) => {
                    tracing::warn!("Command '{}' {}", failure.command, failure.status);
                    tracing::warn!("Working directory was: {}", failure.working_dir);

                    if governor.record_failure() == Verdict::Abort {
                        tracing::error!(
                            "Too many errors ({}). Aborting preparation.",
                            governor.errors_seen()
                        );
                        return Err(PrepareError::GovernorTripped {
                            errors: governor.errors_seen(),
                        });
                    }
                    return Ok(PipelineOutcome::Failed(failure));
                }
                Err(StepError::Fatal(failure)) => {
                    tracing::error!("Command '{}' {}", failure.command, failure.status);
                    tracing::error!("Working directory was: {}", failure.working_dir);
                    return Err(PrepareError::ToolKilled(failure));
                }
                Err(other) => return Err(PrepareError::Step(other)),
            }
        }

        self.metrics.record_preparation_time(start.elapsed());
        Ok(PipelineOutcome::Completed {
            steps,
            backups: backups.taken,
        })
    }

    async fn run_step(
        &self,
        step: Step,
        file: &Utf8Path,
        backups: &mut Backups<'_>,
    ) -> Result<(), StepError> {
        // Only headers carry include guards.
        if step == Step::RemoveIncludeGuards && !source_tree::is_header_file(file) {
            return Ok(());
        }
        if step.takes_backup() {
            backups.take(step)?;
        }

        match step {
            Step::RewriteMultilineMacros => self.rewrite_in_place(step, file, |text| {
                self.rewriter.join_multiline_macros(text)
            }),
            Step::DeleteComments => self.delete_comments(step, file).await,
            Step::DeleteWhitespace => {
                self.rewrite_in_place(step, file, |text| self.rewriter.squeeze_whitespace(text))
            }
            Step::RewriteIfdefs => {
                self.rewrite_in_place(step, file, |text| self.rewriter.rewrite_ifdefs(text))
            }
            Step::RemoveIncludeGuards => self.rewrite_in_place(step, file, |text| {
                self.rewriter.remove_include_guards(text)
            }),
            Step::RemoveOtherPreprocessor => self.rewrite_in_place(step, file, |text| {
                self.rewriter.keep_conditional_directives(text)
            }),
            Step::DeleteEmptyLines => {
                self.rewrite_in_place(step, file, |text| self.rewriter.delete_empty_lines(text))
            }
            Step::FormatCode => self.format_code(step, file).await,
            Step::TransformToSrcml => self.transform_to_srcml(step, file).await,
        }
    }

    /// Rewrite `file` through a temporary file, replacing it on success.
    fn rewrite_in_place(
        &self,
        step: Step,
        file: &Utf8Path,
        rewrite: impl FnOnce(&str) -> String,
    ) -> Result<(), StepError> {
        let fs_error = |path: &Utf8Path| {
            let path = path.to_path_buf();
            move |source| StepError::Filesystem { step, path, source }
        };

        let bytes = fs::read(file).map_err(fs_error(file))?;
        let rewritten = rewrite(&String::from_utf8_lossy(&bytes));

        let tmp = temp_name(file, "tmp.txt");
        fs::write(&tmp, rewritten).map_err(fs_error(&tmp))?;
        fs::rename(&tmp, file).map_err(fs_error(file))
    }

    /// srcML round trip through the comment-stripping stylesheet.
    async fn delete_comments(&self, step: Step, file: &Utf8Path) -> Result<(), StepError> {
        let xml = temp_name(file, "tmp.xml");
        let stripped = temp_name(file, "tmp_out.xml");
        let source = temp_name(file, "tmp_src.txt");

        let result: Result<(), StepError> = async {
            self.invoke(step, self.toolchain.to_srcml(file, &xml)).await?;

            match self
                .invoke(step, self.toolchain.delete_comments(&xml, &stripped, None))
                .await
            {
                Err(StepError::Recoverable(failure)) => {
                    tracing::info!("Command '{}' {}. Retrying ...", failure.command, failure.status);
                    let depth = self.toolchain.settings().xslt_max_parser_depth;
                    self.invoke(step, self.toolchain.delete_comments(&xml, &stripped, Some(depth)))
                        .await?;
                }
                other => other?,
            }

            self.invoke(step, self.toolchain.from_srcml(&stripped, &source))
                .await?;
            fs::rename(&source, file).map_err(|e| StepError::Filesystem {
                step,
                path: file.to_path_buf(),
                source: e,
            })
        }
        .await;

        for tmp in [&xml, &stripped, &source] {
            remove_silently(step, tmp)?;
        }
        result
    }

    async fn format_code(&self, step: Step, file: &Utf8Path) -> Result<(), StepError> {
        let formatted = temp_name(file, "tmp.txt");

        let result = self.invoke(step, self.toolchain.format_code(file, &formatted)).await;
        if result.is_err() {
            remove_silently(step, &formatted)?;
            return result;
        }

        fs::rename(&formatted, file).map_err(|source| StepError::Filesystem {
            step,
            path: file.to_path_buf(),
            source,
        })
    }

    /// Write `<file>.xml`; a partial document is removed on failure.
    async fn transform_to_srcml(&self, step: Step, file: &Utf8Path) -> Result<(), StepError> {
        let xml = temp_name(file, ".xml");

        let result = self.invoke(step, self.toolchain.to_srcml(file, &xml)).await;
        if result.is_err() {
            remove_silently(step, &xml)?;
        }
        result
    }

    /// Run one tool and turn its exit into a step result.
    async fn invoke(&self, step: Step, invocation: ToolInvocation) -> Result<(), StepError> {
        self.metrics.record_tool_invocation();

        let status = self
            .runner
            .run(&invocation)
            .await
            .map_err(|source| StepError::Spawn {
                step,
                command: invocation.command_line(),
                source,
            })?;

        match status {
            ToolStatus::Success => Ok(()),
            ToolStatus::Failed(_) | ToolStatus::TimedOut(_) => {
                Err(StepError::Recoverable(ToolFailure::new(&invocation, status)))
            }
            ToolStatus::Killed(_) => Err(StepError::Fatal(ToolFailure::new(&invocation, status))),
        }
    }
}

/// `<file><suffix>`, next to the working file.
fn temp_name(file: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{file}{suffix}"))
}

fn remove_silently(step: Step, path: &Utf8Path) -> Result<(), StepError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StepError::Filesystem {
            step,
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolSettings;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Writes `stdout` files for every call and ends each one with a scripted status.
    struct StatusRunner {
        statuses: RefCell<Vec<ToolStatus>>,
        calls: RefCell<Vec<ToolInvocation>>,
    }

    impl StatusRunner {
        fn new(mut statuses: Vec<ToolStatus>) -> Self {
            statuses.reverse();
            Self {
                statuses: RefCell::new(statuses),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ToolRunner for StatusRunner {
        async fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolStatus> {
            self.calls.borrow_mut().push(invocation.clone());
            if let Some(out) = &invocation.stdout {
                fs::write(out, "out\n")?;
            }
            Ok(self.statuses.borrow_mut().pop().unwrap_or(ToolStatus::Success))
        }
    }

    fn working_file(name: &str, content: &str) -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let file = Utf8PathBuf::try_from(dir.path().join(name)).unwrap();
        fs::write(&file, content).unwrap();
        (dir, file)
    }

    #[tokio::test]
    async fn test_pretty_takes_one_backup_per_step() {
        let (_dir, file) = working_file("a.c", "#define A \\\n 1\n");
        let runner = StatusRunner::new(vec![]);
        let toolchain = Toolchain::new(ToolSettings::default()).unwrap();
        let rewriter = TextRewriter::new();
        let metrics = Metrics::new();
        let pipeline = FilePipeline::new(&runner, &toolchain, &rewriter, &metrics, true);
        let mut governor = FailureGovernor::for_batch(1);

        let outcome = pipeline
            .run(PreparationKind::Pretty, &file, &mut governor)
            .await
            .unwrap();

        assert_eq!(outcome, PipelineOutcome::Completed { steps: 2, backups: 2 });
        assert_eq!(
            fs::read_to_string(format!("{file}.bak0")).unwrap(),
            "#define A \\\n 1\n"
        );
        assert_eq!(fs::read_to_string(format!("{file}.bak1")).unwrap(), "#define A 1\n");
        assert_eq!(fs::read_to_string(&file).unwrap(), "out\n");
    }

    #[tokio::test]
    async fn test_no_backups_when_disabled() {
        let (_dir, file) = working_file("a.c", "int a;\n");
        let runner = StatusRunner::new(vec![]);
        let toolchain = Toolchain::new(ToolSettings::default()).unwrap();
        let rewriter = TextRewriter::new();
        let metrics = Metrics::new();
        let pipeline = FilePipeline::new(&runner, &toolchain, &rewriter, &metrics, false);
        let mut governor = FailureGovernor::for_batch(1);

        let outcome = pipeline
            .run(PreparationKind::Pretty, &file, &mut governor)
            .await
            .unwrap();

        assert_eq!(outcome, PipelineOutcome::Completed { steps: 2, backups: 0 });
        assert!(!Utf8PathBuf::from(format!("{file}.bak0")).exists());
    }

    #[tokio::test]
    async fn test_failed_srcml_leaves_no_partial_result() {
        let (_dir, file) = working_file("a.c", "int a;\n");
        // comments: srcml, xsltproc, srcml; then the final srcml fails
        let runner = StatusRunner::new(vec![
            ToolStatus::Success,
            ToolStatus::Success,
            ToolStatus::Success,
            ToolStatus::Failed(1),
        ]);
        let toolchain = Toolchain::new(ToolSettings::default()).unwrap();
        let rewriter = TextRewriter::new();
        let metrics = Metrics::new();
        let pipeline = FilePipeline::new(&runner, &toolchain, &rewriter, &metrics, true);
        let mut governor = FailureGovernor::for_batch(10);

        let outcome = pipeline
            .run(PreparationKind::FeatureLocations, &file, &mut governor)
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Failed(_)));
        assert!(!Utf8PathBuf::from(format!("{file}.xml")).exists());
        assert!(!Utf8PathBuf::from(format!("{file}tmp.xml")).exists());
        assert_eq!(governor.errors_seen(), 1);
    }

    #[tokio::test]
    async fn test_killed_tool_is_fatal() {
        let (_dir, file) = working_file("a.c", "int a;\n");
        let runner = StatusRunner::new(vec![ToolStatus::Killed(Some(9))]);
        let toolchain = Toolchain::new(ToolSettings::default()).unwrap();
        let rewriter = TextRewriter::new();
        let metrics = Metrics::new();
        let pipeline = FilePipeline::new(&runner, &toolchain, &rewriter, &metrics, true);
        let mut governor = FailureGovernor::for_batch(10);

        let result = pipeline
            .run(PreparationKind::General, &file, &mut governor)
            .await;

        assert!(matches!(result, Err(PrepareError::ToolKilled(_))));
        assert_eq!(governor.errors_seen(), 0);
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_xsltproc_retried_with_parser_depth() {
        let (_dir, file) = working_file("a.c", "int a;\n");
        let runner = StatusRunner::new(vec![ToolStatus::Success, ToolStatus::Failed(6)]);
        let toolchain = Toolchain::new(ToolSettings::default()).unwrap();
        let rewriter = TextRewriter::new();
        let metrics = Metrics::new();
        let pipeline = FilePipeline::new(&runner, &toolchain, &rewriter, &metrics, true);
        let mut governor = FailureGovernor::for_batch(1);

        let outcome = pipeline
            .run(PreparationKind::FeatureLocations, &file, &mut governor)
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Completed { .. }));
        let calls = runner.calls.borrow();
        assert_eq!(calls[2].program, "xsltproc");
        assert_eq!(calls[2].args[0], "--maxparserdepth");
        assert_eq!(governor.errors_seen(), 0);
    }
}
