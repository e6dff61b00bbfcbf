//! Services module - the preparation engine.
//!
//! Everything here is independent of the command line and can be driven
//! from tests with a scripted [`ToolRunner`].
//!
//! # Components
//!
//! - [`Materializer`]: places a file at a destination by symbolic link or copy
//! - [`stage_tree`]: mirrors a project's `source` folder into a kind's output subfolder
//! - [`ResultCache`]: results of earlier projects, reused for byte-identical files
//! - [`FilePipeline`]: runs one kind's step sequence over one working file,
//!   taking numbered backups
//! - [`FailureGovernor`]: counts recoverable tool failures and decides when a run aborts
//! - [`Preparer`]: the run controller tying the above together
//! - [`projects`]: input lists and the batch drivers
//!
//! # External tools
//!
//! `srcml`, `xsltproc` and `astyle` are described by [`Toolchain`] and started
//! through [`ToolRunner`]. A non-zero exit is recoverable and counted by the
//! governor; a tool killed by a signal aborts the whole run.

pub mod cache;
pub mod governor;
pub mod materialize;
pub mod paths;
pub mod pipeline;
pub mod preparation;
pub mod projects;
pub mod rewrite;
pub mod source_tree;
pub mod staging;
pub mod tools;

pub use cache::{CacheError, PreparedFile, ResultCache};
pub use governor::{FailureGovernor, Verdict};
pub use materialize::{MaterializeError, Materialized, Materializer};
pub use pipeline::{FilePipeline, PipelineOutcome, StepError};
pub use preparation::{EX_SOFTWARE, PrepareError, Preparer, RunInput, RunOptions, RunSummary};
pub use rewrite::TextRewriter;
pub use source_tree::TreeError;
pub use staging::{StagingError, StagingReport, stage_single_file, stage_tree};
pub use tools::{ProcessRunner, ToolFailure, ToolInvocation, ToolRunner, ToolStatus, Toolchain};
