// State management module
//
// This module provides the StateManager which wraps RunState with thread-safe access
// using Arc<RwLock<T>> and emits change events for anyone following a run.

use crate::models::{FileStatus, PreparationKind, RunState};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when the run state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A preparation run has started
    RunStarted {
        kind: PreparationKind,
        project: String,
        total_files: usize,
    },

    /// Progress has been updated during a run
    ProgressUpdated {
        current: usize,
        total: usize,
        current_file: Option<Utf8PathBuf>,
    },

    /// A file has been handled
    FileProcessed {
        file: Utf8PathBuf,
        outcome: FileStatus,
    },

    /// The run has finished
    RunFinished {
        prepared: usize,
        reused: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Thread-safe run state with event emission
///
/// - Provides shared access to [`RunState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Clones share the same state and channel.
pub struct StateManager {
    state: Arc<RwLock<RunState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> RunState {
        self.read(RunState::clone)
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let done = state_manager.read(|state| state.processed_count());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Applies `update_fn`, compares the result with the previous state and
    /// broadcasts one event per detected change.
    ///
    /// # Returns
    /// The events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = detect_changes(&old_state, &state);
        for change in &changes {
            self.emit(change.clone());
        }
        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Begin a run over `total_files` files of `project`
    pub fn start_run(
        &self,
        kind: PreparationKind,
        project: impl Into<String>,
        total_files: usize,
    ) -> Vec<StateChange> {
        let project = project.into();
        self.update(|state| {
            state.reset_run_state();
            state.is_running = true;
            state.kind = Some(kind);
            state.project = Some(project);
            state.total_files = total_files;
        })
    }

    /// Mark `file` as the file being worked on
    pub fn update_progress(&self, file: &Utf8Path) -> Vec<StateChange> {
        self.update(|state| {
            state.current_file = Some(file.to_path_buf());
        })
    }

    /// Record the outcome for one file
    pub fn record_file(&self, file: &Utf8Path, outcome: FileStatus) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.add_result(file, outcome));

        let event = StateChange::FileProcessed {
            file: file.to_path_buf(),
            outcome,
        };
        self.emit(event.clone());
        changes.push(event);
        changes
    }

    /// End the current run
    pub fn finish_run(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_running = false;
            state.current_file = None;
        })
    }

    fn emit(&self, change: StateChange) {
        // No subscribers is fine.
        let _ = self.state_tx.send(change);
    }
}

/// Events describing the difference between two states
fn detect_changes(old: &RunState, new: &RunState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.is_running != new.is_running {
        if new.is_running {
            changes.push(StateChange::RunStarted {
                kind: new.kind.unwrap_or(PreparationKind::General),
                project: new.project.clone().unwrap_or_default(),
                total_files: new.total_files,
            });
        } else {
            changes.push(StateChange::RunFinished {
                prepared: new.prepared_files.len(),
                reused: new.reused_files.len(),
                skipped: new.skipped_files.len(),
                failed: new.failed_files.len(),
            });
        }
    }

    if old.progress != new.progress
        || old.total_files != new.total_files
        || old.current_file != new.current_file
    {
        changes.push(StateChange::ProgressUpdated {
            current: new.progress,
            total: new.total_files,
            current_file: new.current_file.clone(),
        });
    }

    changes
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert!(!state.is_running);
        assert_eq!(state.progress, 0);
        assert_eq!(state.kind, None);
    }

    #[test]
    fn test_start_run_emits_started_event() {
        let manager = StateManager::new();
        let changes = manager.start_run(PreparationKind::Pretty, "demo", 2);

        assert!(changes.contains(&StateChange::RunStarted {
            kind: PreparationKind::Pretty,
            project: "demo".to_string(),
            total_files: 2,
        }));
        assert!(manager.read(|s| s.is_running));
    }

    #[test]
    fn test_record_file_emits_progress_then_file_event() {
        let manager = StateManager::new();
        manager.start_run(PreparationKind::General, "demo", 1);

        let changes = manager.record_file(Utf8Path::new("a.c"), FileStatus::Prepared);

        assert_eq!(changes.len(), 2);
        assert!(matches!(
            changes[0],
            StateChange::ProgressUpdated { current: 1, total: 1, .. }
        ));
        assert_eq!(
            changes[1],
            StateChange::FileProcessed {
                file: Utf8PathBuf::from("a.c"),
                outcome: FileStatus::Prepared,
            }
        );
    }

    #[test]
    fn test_finish_run_reports_counts() {
        let manager = StateManager::new();
        manager.start_run(PreparationKind::General, "demo", 3);
        manager.record_file(Utf8Path::new("a.c"), FileStatus::Prepared);
        manager.record_file(Utf8Path::new("b.c"), FileStatus::Skipped);
        manager.record_file(Utf8Path::new("c.c"), FileStatus::Failed);

        let changes = manager.finish_run();
        assert!(changes.contains(&StateChange::RunFinished {
            prepared: 1,
            reused: 0,
            skipped: 1,
            failed: 1,
        }));
    }

    #[test]
    fn test_no_change_no_event() {
        let manager = StateManager::new();
        let changes = manager.update(|_| {});
        assert!(changes.is_empty());
    }
}
