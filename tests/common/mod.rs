//! Shared fixtures for the integration tests.
//!
//! [`ScriptedRunner`] stands in for srcml, xsltproc and astyle so the full
//! preparation pipeline runs without the real tools installed.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cppstats_prepare::services::{ToolInvocation, ToolRunner, ToolStatus, Toolchain};
use cppstats_prepare::{Preparer, RunOptions, ToolSettings};
use regex::Regex;
use std::fs;
use std::io;
use std::sync::Mutex;
use tempfile::TempDir;

const UNIT_NAMESPACE: &str = "http://www.srcML.org/srcML/src";

struct Rule {
    program: String,
    needle: String,
    status: ToolStatus,
    remaining: Option<usize>,
}

/// Fake tool runner emulating the three external tools.
///
/// - `srcml <file> --language=C` wraps the file in a `<unit>` element whose
///   `filename` attribute is the path it was given
/// - `srcml <xml>` unwraps it again
/// - `xsltproc <xsl> <xml>` strips C comments from the unit body
/// - `astyle` expands tabs to four spaces
///
/// Rules added with [`failing`](Self::failing) end matching invocations with
/// a scripted status instead, writing no output.
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// End every `program` call whose command line contains `needle` with `status`.
    pub fn failing(self, program: &str, needle: &str, status: ToolStatus) -> Self {
        self.add_rule(program, needle, status, None)
    }

    /// Like [`failing`](Self::failing), for the first matching call only.
    pub fn failing_once(self, program: &str, needle: &str, status: ToolStatus) -> Self {
        self.add_rule(program, needle, status, Some(1))
    }

    fn add_rule(
        self,
        program: &str,
        needle: &str,
        status: ToolStatus,
        remaining: Option<usize>,
    ) -> Self {
        self.rules.lock().unwrap().push(Rule {
            program: program.to_string(),
            needle: needle.to_string(),
            status,
            remaining,
        });
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.program == program)
            .count()
    }

    fn scripted_status(&self, invocation: &ToolInvocation) -> Option<ToolStatus> {
        let command = invocation.command_line();
        let mut rules = self.rules.lock().unwrap();

        let rule = rules.iter_mut().find(|rule| {
            rule.program == invocation.program
                && command.contains(&rule.needle)
                && rule.remaining != Some(0)
        })?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.status)
    }
}

impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolStatus> {
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some(status) = self.scripted_status(invocation) {
            return Ok(status);
        }

        match invocation.program.as_str() {
            "srcml" => emulate_srcml(invocation)?,
            "xsltproc" => emulate_xsltproc(invocation)?,
            "astyle" => emulate_astyle(invocation)?,
            _ => return Ok(ToolStatus::Failed(127)),
        }
        Ok(ToolStatus::Success)
    }
}

fn stdout_of(invocation: &ToolInvocation) -> io::Result<&Utf8Path> {
    invocation
        .stdout
        .as_deref()
        .ok_or_else(|| io::Error::other("expected a stdout redirection"))
}

fn emulate_srcml(invocation: &ToolInvocation) -> io::Result<()> {
    let out = stdout_of(invocation)?;
    let input = &invocation.args[0];
    let content = fs::read_to_string(input)?;

    if invocation.args.iter().any(|arg| arg.starts_with("--language=")) {
        fs::write(out, wrap_unit(input, &content))
    } else {
        let (_, body) = split_unit(&content);
        fs::write(out, body)
    }
}

fn emulate_xsltproc(invocation: &ToolInvocation) -> io::Result<()> {
    let out = stdout_of(invocation)?;
    let xml = invocation
        .args
        .last()
        .ok_or_else(|| io::Error::other("xsltproc without input"))?;
    let content = fs::read_to_string(xml)?;

    let (header, body) = split_unit(&content);
    let block = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    let line = Regex::new(r"//[^\n]*").unwrap();
    let stripped = line.replace_all(&block.replace_all(body, ""), "").into_owned();

    fs::write(out, format!("{header}{stripped}</unit>\n"))
}

fn emulate_astyle(invocation: &ToolInvocation) -> io::Result<()> {
    let out = stdout_of(invocation)?;
    let input = invocation
        .stdin
        .as_deref()
        .ok_or_else(|| io::Error::other("astyle reads stdin"))?;
    let content = fs::read_to_string(input)?;
    fs::write(out, content.replace('\t', "    "))
}

/// A srcML-like document for `content`, as the fake srcml writes it.
pub fn wrap_unit(filename: &str, content: &str) -> String {
    format!(
        "<unit xmlns=\"{UNIT_NAMESPACE}\" language=\"C\" filename=\"{filename}\">\n{content}</unit>\n"
    )
}

/// Opening tag line and body of a document written by [`wrap_unit`].
pub fn split_unit(document: &str) -> (&str, &str) {
    let split = document.find('\n').map_or(0, |i| i + 1);
    let (header, rest) = document.split_at(split);
    (header, rest.strip_suffix("</unit>\n").unwrap_or(rest))
}

/// A temporary directory with a UTF-8 path.
pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

/// Create `<root>/<name>/source` holding `files` (relative path, content).
pub fn create_project(root: &Utf8Path, name: &str, files: &[(&str, &str)]) -> Utf8PathBuf {
    let project = root.join(name);
    let source = project.join("source");
    for (relative, content) in files {
        let path = source.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
    }
    fs::create_dir_all(&source).unwrap();
    project
}

pub fn preparer(options: RunOptions, runner: ScriptedRunner) -> Preparer<ScriptedRunner> {
    let toolchain = Toolchain::new(ToolSettings::default()).unwrap();
    Preparer::new(options, toolchain, runner)
}

pub fn eager() -> RunOptions {
    RunOptions::default()
}

pub fn lazy() -> RunOptions {
    RunOptions {
        lazy_preparation: true,
        ..RunOptions::default()
    }
}

pub fn read(path: impl AsRef<Utf8Path>) -> String {
    fs::read_to_string(path.as_ref()).unwrap()
}

/// `a.c` and `b.h` sample sources.
pub const A_C: &str =
    "/* header comment */\n#include <stdio.h>\n\n#ifdef DEBUG\n\tint x; // trailing\n#endif\n";
pub const B_H: &str = "#ifndef B_H\n#define B_H\nint b;\n#endif\n";
