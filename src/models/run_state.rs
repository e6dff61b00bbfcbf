use crate::models::PreparationKind;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// What happened to one source file during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    /// The full step sequence ran.
    Prepared,
    /// Staged copy and result were taken from an earlier project.
    Reused,
    /// A result already existed and lazy preparation was on.
    Skipped,
    /// A tool failed and the file was left half prepared.
    Failed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Prepared => "prepared",
            FileStatus::Reused => "reused",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress and results of the current (or last) preparation run.
///
/// Owned by [`crate::state::StateManager`]; read it through
/// [`read()`](crate::state::StateManager::read) or
/// [`snapshot()`](crate::state::StateManager::snapshot).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunState {
    pub is_running: bool,
    pub kind: Option<PreparationKind>,
    pub project: Option<String>,

    pub current_file: Option<Utf8PathBuf>,
    pub progress: usize,
    pub total_files: usize,

    // Results, in processing order
    pub prepared_files: Vec<Utf8PathBuf>,
    pub reused_files: Vec<Utf8PathBuf>,
    pub skipped_files: Vec<Utf8PathBuf>,
    pub failed_files: Vec<Utf8PathBuf>,
}

impl RunState {
    /// Record the outcome for `file` and advance the progress counter.
    pub fn add_result(&mut self, file: &Utf8Path, status: FileStatus) {
        let list = match status {
            FileStatus::Prepared => &mut self.prepared_files,
            FileStatus::Reused => &mut self.reused_files,
            FileStatus::Skipped => &mut self.skipped_files,
            FileStatus::Failed => &mut self.failed_files,
        };
        list.push(file.to_path_buf());
        self.progress += 1;
    }

    pub fn processed_count(&self) -> usize {
        self.prepared_files.len()
            + self.reused_files.len()
            + self.skipped_files.len()
            + self.failed_files.len()
    }

    /// Clear everything recorded for the previous run.
    pub fn reset_run_state(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_result_routes_by_status() {
        let mut state = RunState::default();
        state.add_result(Utf8Path::new("a.c"), FileStatus::Prepared);
        state.add_result(Utf8Path::new("b.h"), FileStatus::Failed);
        state.add_result(Utf8Path::new("c.c"), FileStatus::Reused);

        assert_eq!(state.progress, 3);
        assert_eq!(state.processed_count(), 3);
        assert_eq!(state.prepared_files, vec![Utf8PathBuf::from("a.c")]);
        assert_eq!(state.failed_files, vec![Utf8PathBuf::from("b.h")]);
        assert!(state.skipped_files.is_empty());
    }

    #[test]
    fn test_reset() {
        let mut state = RunState {
            is_running: true,
            total_files: 4,
            ..Default::default()
        };
        state.add_result(Utf8Path::new("a.c"), FileStatus::Skipped);
        state.reset_run_state();
        assert_eq!(state, RunState::default());
    }
}
