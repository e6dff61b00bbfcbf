//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events on mutations
//! - Supports multiple subscribers
//! - Reports the start and end of a real preparation run

mod common;

use camino::{Utf8Path, Utf8PathBuf};
use common::{A_C, B_H, ScriptedRunner, create_project, eager, preparer, utf8_tempdir};
use cppstats_prepare::{FileStatus, PreparationKind, RunInput, StateChange, StateManager};
use std::sync::Arc;
use tokio::time::{Duration, timeout};

#[tokio::test]
async fn test_state_change_events_emitted() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.start_run(PreparationKind::General, "demo", 2);

    // Should receive RunStarted event
    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");

    assert!(
        matches!(event, StateChange::RunStarted { total_files: 2, .. }),
        "Expected RunStarted event, got: {:?}",
        event
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = StateManager::new();
    let mut rx1 = state.subscribe();
    let mut rx2 = state.clone().subscribe();

    state.record_file(Utf8Path::new("a.c"), FileStatus::Reused);

    for rx in [&mut rx1, &mut rx2] {
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StateChange::ProgressUpdated { current: 1, .. }));
        let second = rx.recv().await.unwrap();
        assert_eq!(
            second,
            StateChange::FileProcessed {
                file: Utf8PathBuf::from("a.c"),
                outcome: FileStatus::Reused,
            }
        );
    }
}

#[tokio::test]
async fn test_concurrent_state_access() {
    let state = Arc::new(StateManager::new());
    state.start_run(PreparationKind::Pretty, "demo", 10);

    let mut handles = vec![];
    for i in 0..10 {
        let state_clone = state.clone();
        handles.push(tokio::spawn(async move {
            state_clone.record_file(
                Utf8PathBuf::from(format!("f{i}.c")).as_path(),
                FileStatus::Prepared,
            );
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = state.snapshot();
    assert_eq!(snapshot.progress, 10);
    assert_eq!(snapshot.prepared_files.len(), 10);
}

#[tokio::test]
async fn test_preparation_run_events() {
    let (_dir, root) = utf8_tempdir();
    let project = create_project(&root, "demo", &[("a.c", A_C), ("b.h", B_H)]);

    let preparer = preparer(eager(), ScriptedRunner::new());
    let mut rx = preparer.state().subscribe();

    preparer
        .run(PreparationKind::General, &RunInput::Folder(project))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(
        events.first(),
        Some(&StateChange::RunStarted {
            kind: PreparationKind::General,
            project: "demo".to_string(),
            total_files: 2,
        })
    );
    assert!(events.contains(&StateChange::RunFinished {
        prepared: 2,
        reused: 0,
        skipped: 0,
        failed: 0,
    }));

    let processed: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            StateChange::FileProcessed { file, outcome } => Some((file.as_str(), *outcome)),
            _ => None,
        })
        .collect();
    assert_eq!(
        processed,
        vec![("a.c", FileStatus::Prepared), ("b.h", FileStatus::Prepared)]
    );

    let state = preparer.state().snapshot();
    assert!(!state.is_running);
    assert_eq!(state.processed_count(), 2);
}
