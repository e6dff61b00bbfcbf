// cppstats-prepare - source preparation for cppstats analyses
//
// This is the library crate containing the preparation engine and its data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{FileStatus, PrepareSettings, PreparationKind, RunState, Step, ToolSettings};
pub use services::{PrepareError, Preparer, RunInput, RunOptions, RunSummary};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
