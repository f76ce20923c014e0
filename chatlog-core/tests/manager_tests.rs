// ABOUTME: Integration tests for the transient artifact manager
// ABOUTME: Covers conversion scenarios, atomic creation, timed deletion, purge, and shutdown

use chatlog_core::{
    ArtifactError, ArtifactHandle, ArtifactManager, ArtifactState, ConversionPolicy,
    DeletionOutcome, FixedClock, IncomingMessage,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a manager over a fresh temp directory
fn create_test_manager(policy: ConversionPolicy) -> (TempDir, ArtifactManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let manager = ArtifactManager::new(temp_dir.path().join("chatlog_files"), policy)
        .expect("Failed to create manager");
    (temp_dir, manager)
}

fn scenario_policy() -> ConversionPolicy {
    ConversionPolicy {
        threshold_chars: 200,
        max_chars: 5000,
        ..Default::default()
    }
}

fn files_in(manager: &ArtifactManager) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(manager.dir())
        .expect("Failed to read artifact dir")
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect()
}

fn create(manager: &ArtifactManager, text: &str) -> ArtifactHandle {
    manager
        .create_artifact(text, &IncomingMessage::direct("alice", text))
        .expect("Failed to create artifact")
}

// =============================================================================
// Conversion Scenario Tests
// =============================================================================

#[test]
fn test_scenario_199_chars_rejected() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    assert!(!manager.should_convert(&"x".repeat(199)));
    assert!(files_in(&manager).is_empty());
}

#[test]
fn test_scenario_200_chars_accepted_with_header_and_exact_body() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let text = "y".repeat(200);
    assert!(manager.should_convert(&text));

    let msg = IncomingMessage::group("group-1", "bob", text.clone());
    let handle = manager.create_artifact(&text, &msg).unwrap();

    let content = std::fs::read_to_string(&handle.path).unwrap();
    assert!(content.starts_with("=== Chat Log ===\nTime: "));
    assert!(content.contains("Group: group-1\nSender: bob\n"));
    let body = content.split("\nMessage:\n").nth(1).unwrap();
    assert_eq!(body, text);
    assert_eq!(files_in(&manager), vec![handle.path.clone()]);
}

#[test]
fn test_scenario_5001_chars_rejected_as_too_long() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    assert!(!manager.should_convert(&"z".repeat(5001)));
    assert_eq!(
        manager.evaluate(&"z".repeat(5001)),
        chatlog_core::Decision::TooLong
    );
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_handle_path_is_absolute_and_named_with_prefix() {
    let policy = ConversionPolicy {
        filename_prefix: "[log]".to_string(),
        ..scenario_policy()
    };
    let (_tmp, manager) = create_test_manager(policy);
    let handle = create(&manager, "hello");

    assert!(handle.path.is_absolute());
    let name = handle.file_name().unwrap();
    assert!(name.starts_with("[log]"));
    assert!(name.ends_with(".txt"));
    assert_eq!(manager.state(&handle), ArtifactState::Created);
}

#[test]
fn test_concurrent_creation_in_same_second_yields_distinct_files() {
    let clock = Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ));
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let manager = manager.with_clock(clock);

    let handles: Vec<(String, ArtifactHandle)> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..16)
            .map(|i| {
                let manager = &manager;
                s.spawn(move || {
                    let text = format!("message number {} {}", i, "pad ".repeat(i));
                    let msg = IncomingMessage::direct(format!("user-{}", i), text.clone());
                    let handle = manager.create_artifact(&text, &msg).unwrap();
                    (text, handle)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let mut paths: Vec<_> = handles.iter().map(|(_, h)| h.path.clone()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 16, "every message must get its own file");
    assert_eq!(files_in(&manager).len(), 16);

    for (text, handle) in &handles {
        let content = std::fs::read_to_string(&handle.path).unwrap();
        let body = content.split("\nMessage:\n").nth(1).unwrap();
        assert_eq!(body, text);
    }
}

#[tokio::test]
async fn test_io_error_leaves_no_file_and_no_deletion() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    std::fs::remove_dir_all(manager.dir()).unwrap();

    let text = "q".repeat(300);
    let err = manager
        .create_artifact(&text, &IncomingMessage::direct("alice", text.clone()))
        .unwrap_err();

    assert!(matches!(err, ArtifactError::Io { .. }));
    assert!(err.is_io());
    assert!(!manager.dir().exists());
    assert_eq!(manager.pending_deletions(), 0);
}

// =============================================================================
// Deletion Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_file_exists_until_retention_elapses() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "short lived");

    let task = manager.schedule_deletion(&handle, Duration::from_secs(30));
    assert_eq!(manager.pending_deletions(), 1);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(handle.path.exists(), "file must survive until retention elapses");
    assert!(!task.is_finished());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!handle.path.exists(), "file must be gone after retention");
    assert_eq!(task.join().await, DeletionOutcome::Deleted);
    assert_eq!(manager.state(&handle), ArtifactState::Deleted);
    assert_eq!(manager.pending_deletions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deletion_happens_even_if_never_served() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "unserved");
    assert_eq!(manager.state(&handle), ArtifactState::Created);

    let task = manager.schedule_deletion(&handle, Duration::from_secs(5));
    assert_eq!(task.join().await, DeletionOutcome::Deleted);
    assert!(!handle.path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_externally_removed_file_counts_as_deleted() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "gone early");
    let other = create(&manager, "still here");

    let task = manager.schedule_deletion(&handle, Duration::from_secs(10));
    std::fs::remove_file(&handle.path).unwrap();

    assert_eq!(task.join().await, DeletionOutcome::AlreadyGone);
    assert!(other.path.exists());
    assert_eq!(manager.state(&other), ArtifactState::Created);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_timer_and_keeps_file() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "kept");

    let task = manager.schedule_deletion(&handle, Duration::from_secs(30));
    task.cancel();
    assert_eq!(task.join().await, DeletionOutcome::Cancelled);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(handle.path.exists());
    assert_eq!(manager.pending_deletions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rescheduling_cancels_previous_timer() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "rescheduled");

    let first = manager.schedule_deletion(&handle, Duration::from_secs(5));
    let second = manager.schedule_deletion(&handle, Duration::from_secs(50));

    assert_eq!(first.join().await, DeletionOutcome::Cancelled);
    assert!(handle.path.exists());
    assert_eq!(manager.pending_deletions(), 1);

    assert_eq!(second.join().await, DeletionOutcome::Deleted);
    assert!(!handle.path.exists());
}

#[test]
fn test_delete_twice_is_idempotent_and_isolated() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "first");
    let other = create(&manager, "second");

    assert_eq!(manager.delete_now(&handle), DeletionOutcome::Deleted);
    assert_eq!(manager.delete_now(&handle), DeletionOutcome::AlreadyGone);
    assert_eq!(manager.state(&handle), ArtifactState::Deleted);

    assert!(other.path.exists());
    assert_eq!(manager.state(&other), ArtifactState::Created);
}

#[tokio::test(start_paused = true)]
async fn test_delete_now_cancels_pending_timer() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "eager");

    let task = manager.schedule_deletion(&handle, Duration::from_secs(30));
    assert_eq!(manager.delete_now(&handle), DeletionOutcome::Deleted);
    assert_eq!(task.join().await, DeletionOutcome::Cancelled);
    assert_eq!(manager.pending_deletions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduling_a_deleted_handle_does_not_revive_it() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "gone");
    assert_eq!(manager.delete_now(&handle), DeletionOutcome::Deleted);

    let task = manager.schedule_deletion(&handle, Duration::from_secs(30));

    assert_eq!(manager.state(&handle), ArtifactState::Deleted);
    assert_eq!(manager.pending_deletions(), 0);
    assert_eq!(task.join().await, DeletionOutcome::AlreadyGone);
}

#[test]
fn test_delete_now_refuses_paths_outside_directory() {
    let (tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "template");

    let outside = tmp.path().join("outside.txt");
    std::fs::write(&outside, "keep me").unwrap();
    let direct = ArtifactHandle {
        path: outside.clone(),
        created_at: handle.created_at,
    };
    let dotted = ArtifactHandle {
        path: manager.dir().join("..").join("outside.txt"),
        created_at: handle.created_at,
    };

    assert_eq!(manager.delete_now(&direct), DeletionOutcome::Failed);
    assert_eq!(manager.delete_now(&dotted), DeletionOutcome::Failed);
    assert!(outside.exists());
    assert!(handle.path.exists());
}

// =============================================================================
// Lifecycle State Tests
// =============================================================================

#[test]
fn test_mark_served_transitions_once() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "served");

    assert!(manager.mark_served(&handle));
    assert_eq!(manager.state(&handle), ArtifactState::Served);
    assert!(!manager.mark_served(&handle));

    manager.delete_now(&handle);
    assert!(!manager.mark_served(&handle));
    assert_eq!(manager.state(&handle), ArtifactState::Deleted);
}

// =============================================================================
// Purge and Shutdown Tests
// =============================================================================

#[test]
fn test_purge_all_removes_files_from_unrelated_runs() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "current run");
    std::fs::write(manager.dir().join("chatlog-20200101000000-old.txt"), "old").unwrap();
    std::fs::write(manager.dir().join(".chatlog-abandoned.tmp"), "partial").unwrap();
    std::fs::create_dir(manager.dir().join("stray")).unwrap();
    std::fs::write(manager.dir().join("stray").join("inner.txt"), "x").unwrap();

    let report = manager.purge_all();

    assert_eq!(report.removed, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 1);
    assert!(files_in(&manager).is_empty());
    assert_eq!(manager.state(&handle), ArtifactState::Deleted);
}

#[test]
fn test_purge_all_on_missing_directory_is_not_an_error() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    std::fs::remove_dir_all(manager.dir()).unwrap();

    let report = manager.purge_all();
    assert_eq!(report, chatlog_core::PurgeReport::default());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_timers_and_deletes_eagerly() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let a = create(&manager, "a");
    let b = create(&manager, "b");
    std::fs::write(manager.dir().join("leftover.txt"), "from a crash").unwrap();

    let task_a = manager.schedule_deletion(&a, Duration::from_secs(3600));
    let task_b = manager.schedule_deletion(&b, Duration::from_secs(3600));

    let report = manager.shutdown();

    assert_eq!(report.removed, 3);
    assert!(files_in(&manager).is_empty());
    assert_eq!(manager.pending_deletions(), 0);
    assert_eq!(task_a.join().await, DeletionOutcome::Cancelled);
    assert_eq!(task_b.join().await, DeletionOutcome::Cancelled);
}

#[test]
fn test_shutdown_without_purge_only_removes_tracked_files() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let manager = manager.purge_on_shutdown(false);
    let handle = create(&manager, "tracked");
    let foreign = manager.dir().join("foreign.txt");
    std::fs::write(&foreign, "not ours").unwrap();

    let report = manager.shutdown();

    assert_eq!(report.removed, 1);
    assert!(!handle.path.exists());
    assert!(foreign.exists());
}

#[test]
fn test_shutdown_with_keep_files_leaves_files_in_place() {
    let policy = ConversionPolicy {
        keep_files: true,
        ..scenario_policy()
    };
    let (_tmp, manager) = create_test_manager(policy);
    let tracked = create(&manager, "tracked");
    let released = create(&manager, "released");
    assert!(manager.release(&released));

    let report = manager.shutdown();

    assert_eq!(report.removed, 0);
    assert!(tracked.path.exists());
    assert!(released.path.exists());
}

#[test]
fn test_release_forgets_artifact_without_deleting() {
    let (_tmp, manager) = create_test_manager(scenario_policy());
    let handle = create(&manager, "released");
    manager.mark_served(&handle);

    assert!(manager.release(&handle));
    assert!(!manager.release(&handle));
    assert_eq!(manager.state(&handle), ArtifactState::Deleted);
    assert!(handle.path.exists());
}

#[test]
fn test_managers_are_isolated() {
    let (_tmp_a, a) = create_test_manager(scenario_policy());
    let (_tmp_b, b) = create_test_manager(scenario_policy());
    let handle_a = create(&a, "in a");
    let handle_b = create(&b, "in b");

    a.purge_all();

    assert!(!handle_a.path.exists());
    assert!(handle_b.path.exists());
    assert_eq!(b.state(&handle_b), ArtifactState::Created);
}
