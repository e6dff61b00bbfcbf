//! Data models for cppstats-prepare.
//!
//! - [`PreparationKind`] and [`Step`]: the fixed table of kinds, their output
//!   subfolders and step sequences
//! - [`PrepareSettings`] / [`ToolSettings`]: settings loaded from `cppstats-prepare.yaml`
//! - [`RunState`] / [`FileStatus`]: progress of the current run, owned by
//!   [`StateManager`](crate::state::StateManager)

pub mod config;
pub mod kind;
pub mod run_state;

pub use config::{PrepareSettings, ToolSettings};
pub use kind::{PreparationKind, Step, UnknownKind};
pub use run_state::{FileStatus, RunState};
