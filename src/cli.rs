//! Command-line arguments.

use crate::models::{PrepareSettings, PreparationKind};
use crate::services::paths;
use crate::services::preparation::{PrepareError, RunOptions};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use std::fmt::Write as _;

#[derive(Parser, Debug)]
#[command(
    name = "cppstats-prepare",
    version,
    about = "Prepare C/C++ source trees for cppstats analyses",
    long_about = "Prepare C/C++ source trees for cppstats analyses.\n\n\
                  Copies each project's `source` folder into a kind-specific output folder and\n\
                  normalizes every file there with srcml, xsltproc and astyle."
)]
pub struct Cli {
    /// Preparation kind to run.
    #[arg(long, value_enum, default_value = "general")]
    pub kind: KindArg,

    /// Prepare a single file and write the result to OUT.
    #[arg(
        long,
        num_args = 2,
        value_names = ["IN", "OUT"],
        conflicts_with = "list"
    )]
    pub file: Option<Vec<Utf8PathBuf>>,

    /// Input list of project folders, one per line; `#` starts a comment.
    #[arg(long, value_name = "FILE")]
    pub list: Option<Utf8PathBuf>,

    /// Run every kind over every listed project.
    #[arg(long, requires = "list")]
    pub all_kinds: bool,

    /// Keep earlier work and skip files whose result already exists.
    #[arg(long)]
    pub lazy: bool,

    /// Input list of already prepared projects whose results may be reused (with --lazy).
    #[arg(long, value_name = "FILE")]
    pub prepare_from: Option<Utf8PathBuf>,

    /// Do not take `.bak<N>` snapshots before each step.
    #[arg(long)]
    pub no_backup: bool,

    /// Copy reused files instead of linking them.
    #[arg(long)]
    pub copy: bool,

    /// Directory holding cppstats-prepare.yaml.
    #[arg(long, value_name = "DIR", default_value = ".cppstats")]
    pub config_dir: Utf8PathBuf,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log to the log file only.
    #[arg(long)]
    pub no_console: bool,

    /// Print the preparation kinds and exit.
    #[arg(long)]
    pub list_kinds: bool,
}

/// CLI kind choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    General,
    Discipline,
    #[value(name = "featurelocations")]
    FeatureLocations,
    Pretty,
}

impl From<KindArg> for PreparationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::General => PreparationKind::General,
            KindArg::Discipline => PreparationKind::Discipline,
            KindArg::FeatureLocations => PreparationKind::FeatureLocations,
            KindArg::Pretty => PreparationKind::Pretty,
        }
    }
}

/// What the invocation asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    ListKinds,
    File {
        input: Utf8PathBuf,
        output: Utf8PathBuf,
    },
    List {
        path: Utf8PathBuf,
        all_kinds: bool,
    },
}

impl Cli {
    pub fn kind(&self) -> PreparationKind {
        self.kind.into()
    }

    /// Resolve the requested mode; single-file paths become absolute.
    pub fn mode(&self) -> Result<Mode, PrepareError> {
        if self.list_kinds {
            return Ok(Mode::ListKinds);
        }

        if let Some([input, output]) = self.file.as_deref() {
            let absolute = |path: &Utf8PathBuf| {
                paths::absolute(path).map_err(|source| PrepareError::Io {
                    path: path.clone(),
                    source,
                })
            };
            return Ok(Mode::File {
                input: absolute(input)?,
                output: absolute(output)?,
            });
        }

        if let Some(path) = &self.list {
            return Ok(Mode::List {
                path: path.clone(),
                all_kinds: self.all_kinds,
            });
        }

        Err(PrepareError::Usage(
            "No single file or input list of projects given (use --file IN OUT or --list FILE)"
                .to_string(),
        ))
    }

    /// Apply command-line switches on top of loaded settings.
    pub fn apply_overrides(&self, settings: &mut PrepareSettings) {
        if self.lazy {
            settings.lazy_preparation = true;
        }
        if self.no_backup {
            settings.backups = false;
        }
        if self.copy {
            settings.prefer_links = false;
        }
        if self.verbose {
            settings.debug_mode = true;
        }
    }

    pub fn run_options(&self, settings: &PrepareSettings) -> RunOptions {
        RunOptions {
            prepare_from: self.prepare_from.clone(),
            ..RunOptions::from_settings(settings)
        }
    }
}

/// One line per kind: name, output subfolder and steps.
pub fn kind_table() -> String {
    let mut table = String::new();
    for kind in PreparationKind::ALL {
        let steps: Vec<&str> = kind.steps().iter().map(|step| step.name()).collect();
        let _ = writeln!(
            table,
            "{:<18}{:<28}{}",
            kind.name(),
            kind.subfolder(),
            steps.join(", ")
        );
    }
    table
}
