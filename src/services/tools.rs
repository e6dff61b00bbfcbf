//! External programs (srcML, xsltproc, astyle) and how they are run.
//!
//! Steps never spawn processes themselves. They build a [`ToolInvocation`]
//! through the [`Toolchain`] and hand it to a [`ToolRunner`], which lets the
//! pipeline run against scripted runners in tests.

use crate::models::ToolSettings;
use crate::services::paths;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs::File;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;

/// Identity transform dropping every srcML comment element.
pub const BUNDLED_DELETE_COMMENTS_XSL: &str = include_str!("../../assets/delete_comments.xsl");

/// One external command with its redirections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// File fed to the process on stdin; `None` means no input.
    pub stdin: Option<Utf8PathBuf>,
    /// File receiving the process's stdout; `None` discards it.
    pub stdout: Option<Utf8PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdin_from(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Program and arguments as one line, for diagnostics.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How an external process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    /// Exited on its own with a non-zero code.
    Failed(i32),
    /// Terminated by a signal (the number, where the platform reports one).
    Killed(Option<i32>),
    /// Killed after exceeding the configured timeout.
    TimedOut(Duration),
}

impl ToolStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolStatus::Success)
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::Success => write!(f, "succeeded"),
            ToolStatus::Failed(code) => write!(f, "failed with exit code {code}"),
            ToolStatus::Killed(Some(signal)) => write!(f, "was killed by signal {signal}"),
            ToolStatus::Killed(None) => write!(f, "was terminated abnormally"),
            ToolStatus::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// A failed tool run, as reported to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub command: String,
    pub working_dir: Utf8PathBuf,
    pub status: ToolStatus,
}

impl ToolFailure {
    pub fn new(invocation: &ToolInvocation, status: ToolStatus) -> Self {
        Self {
            command: invocation.command_line(),
            working_dir: paths::current_dir().unwrap_or_else(|_| Utf8PathBuf::from(".")),
            status,
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command '{}' {} (working directory: {})",
            self.command, self.status, self.working_dir
        )
    }
}

/// Runs external commands to completion
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    /// Run `invocation` and report how it ended.
    ///
    /// An `Err` means the process could not be started or its redirections
    /// could not be opened.
    async fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolStatus>;
}

/// Runs commands as child processes of this one
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolStatus> {
        tracing::debug!("Executing: {}", invocation.command_line());
        let start = Instant::now();

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &invocation.stdin {
            Some(path) => command.stdin(File::open(path)?),
            None => command.stdin(Stdio::null()),
        };
        match &invocation.stdout {
            Some(path) => command.stdout(File::create(path)?),
            None => command.stdout(Stdio::null()),
        };

        let child = command.spawn()?;

        // Dropping the child on timeout kills it.
        let output = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    tracing::warn!("{} timed out after {:?}", invocation.program, limit);
                    return Ok(ToolStatus::TimedOut(limit));
                }
            },
            None => child.wait_with_output().await?,
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!("{} stderr: {}", invocation.program, stderr.trim_end());
        }

        let status = classify(output.status);
        tracing::debug!(
            "{} {} in {:.2}s",
            invocation.program,
            status,
            start.elapsed().as_secs_f32()
        );
        Ok(status)
    }
}

fn classify(status: ExitStatus) -> ToolStatus {
    if status.success() {
        return ToolStatus::Success;
    }
    match status.code() {
        Some(code) => ToolStatus::Failed(code),
        None => ToolStatus::Killed(signal_of(status)),
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

/// Builds the invocations used by the preparation steps
#[derive(Debug)]
pub struct Toolchain {
    settings: ToolSettings,
    stylesheet: Utf8PathBuf,
    // Holds the bundled stylesheet alive when no stylesheet is configured.
    _scratch: Option<TempDir>,
}

impl Toolchain {
    /// Create a toolchain, writing the bundled stylesheet to a scratch
    /// directory unless `settings` names one.
    pub fn new(settings: ToolSettings) -> io::Result<Self> {
        let (stylesheet, scratch) = match &settings.delete_comments_xsl {
            Some(path) => (path.clone(), None),
            None => {
                let scratch = tempfile::Builder::new()
                    .prefix("cppstats-prepare")
                    .tempdir()?;
                let path = paths::from_std(scratch.path().join("deleteComments.xsl"))?;
                std::fs::write(&path, BUNDLED_DELETE_COMMENTS_XSL)?;
                (path, Some(scratch))
            }
        };

        tracing::debug!("Comment stylesheet: {}", stylesheet);
        Ok(Self {
            settings,
            stylesheet,
            _scratch: scratch,
        })
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn stylesheet(&self) -> &Utf8Path {
        &self.stylesheet
    }

    /// `srcml <source> --language=<lang>`, writing the document to `xml`.
    pub fn to_srcml(&self, source: &Utf8Path, xml: &Utf8Path) -> ToolInvocation {
        ToolInvocation::new(&self.settings.srcml)
            .arg(source.as_str())
            .arg(format!("--language={}", self.settings.srcml_language))
            .stdout_to(xml)
    }

    /// `srcml <xml>`, writing the recovered source to `source`.
    pub fn from_srcml(&self, xml: &Utf8Path, source: &Utf8Path) -> ToolInvocation {
        ToolInvocation::new(&self.settings.srcml)
            .arg(xml.as_str())
            .stdout_to(source)
    }

    /// `xsltproc [--maxparserdepth N] <stylesheet> <xml>`, writing to `output`.
    pub fn delete_comments(
        &self,
        xml: &Utf8Path,
        output: &Utf8Path,
        max_parser_depth: Option<u32>,
    ) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(&self.settings.xsltproc);
        if let Some(depth) = max_parser_depth {
            invocation = invocation
                .arg("--maxparserdepth")
                .arg(depth.to_string());
        }
        invocation
            .arg(self.stylesheet.as_str())
            .arg(xml.as_str())
            .stdout_to(output)
    }

    /// `astyle --style=<style>` from `input` to `output`.
    pub fn format_code(&self, input: &Utf8Path, output: &Utf8Path) -> ToolInvocation {
        ToolInvocation::new(&self.settings.astyle)
            .arg(format!("--style={}", self.settings.astyle_style))
            .stdin_from(input)
            .stdout_to(output)
    }
}
