// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_core::{FakeClock, SequentialIdGen};

fn board() -> (tempfile::TempDir, TaskBoard) {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    let clock = Arc::new(FakeClock::at_ts(1_767_225_600));
    let ids = Arc::new(SequentialIdGen::new("evt"));
    (tmp, TaskBoard::new(dirs, clock, ids))
}

#[test]
fn create_task_allocates_monotone_ids() {
    let (_tmp, board) = board();
    let first = board.apply_text("orchestrator", "create task: first").unwrap();
    assert_eq!(first.task_id.as_deref(), Some("T-001"));
    let second = board.apply_text("orchestrator", "create task: second").unwrap();
    assert_eq!(second.task_id.as_deref(), Some("T-002"));

    let snapshot = board.load_snapshot().unwrap();
    assert_eq!(snapshot.tasks["T-001"].status, TaskStatus::Pending);
    assert_eq!(snapshot.tasks["T-001"].history.len(), 1);
}

#[test]
fn create_with_override_sets_assignee_hint() {
    let (_tmp, board) = board();
    let outcome = board
        .apply_text("orchestrator", "@coder create task T-001: demo")
        .unwrap();
    assert_eq!(outcome.assignee_hint.as_deref(), Some("coder"));
    let snapshot = board.load_snapshot().unwrap();
    assert_eq!(snapshot.tasks["T-001"].assignee_hint.as_deref(), Some("coder"));
    assert_eq!(snapshot.tasks["T-001"].created_by, "orchestrator");
}

#[test]
fn duplicate_create_is_a_hard_error() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "create task T-001: demo").unwrap();
    let err = board
        .apply_text("orchestrator", "create task T-001: again")
        .unwrap_err();
    assert!(matches!(err, BoardError::TaskExists(id) if id == "T-001"));
    // No second event, no mutation
    assert_eq!(board.load_snapshot().unwrap().tasks["T-001"].title, "demo");
}

#[test]
fn claim_moves_pending_to_claimed_then_in_progress() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "create task T-001: demo").unwrap();

    let first = board.apply_text("coder", "claim task T-001").unwrap();
    assert_eq!(first.status, Some(TaskStatus::Claimed));
    assert_eq!(first.owner.as_deref(), Some("coder"));

    let second = board.apply_text("coder", "claim task T-001").unwrap();
    assert_eq!(second.status, Some(TaskStatus::InProgress));
}

#[test]
fn mark_done_requires_a_legal_transition() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "create task T-001: demo").unwrap();

    // pending -> done is not allowed
    let err = board
        .apply_text("orchestrator", "mark done T-001: too soon")
        .unwrap_err();
    assert!(matches!(err, BoardError::InvalidTransition { .. }));

    board.apply_text("coder", "claim task T-001").unwrap();
    let done = board.apply_text("coder", "mark done T-001: shipped").unwrap();
    assert_eq!(done.status, Some(TaskStatus::Done));

    let snapshot = board.load_snapshot().unwrap();
    assert_eq!(snapshot.tasks["T-001"].result.as_deref(), Some("shipped"));
    assert_eq!(snapshot.tasks["T-001"].owner.as_deref(), Some("coder"));
}

#[test]
fn done_is_terminal() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "create task T-001: demo").unwrap();
    board.apply_text("coder", "claim task T-001").unwrap();
    board.apply_text("coder", "mark done T-001: ok").unwrap();

    let err = board.apply_text("coder", "block task T-001: nope").unwrap_err();
    assert!(matches!(err, BoardError::InvalidTransition { .. }));
}

#[test]
fn block_defaults_the_reason() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "create task T-001: demo").unwrap();
    board.apply_text("orchestrator", "block task T-001").unwrap();
    let snapshot = board.load_snapshot().unwrap();
    assert_eq!(
        snapshot.tasks["T-001"].blocked_reason.as_deref(),
        Some("unspecified blocker")
    );
}

#[test]
fn escalate_blocks_and_opens_a_diag_task() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "create task T-001: demo").unwrap();
    let outcome = board
        .apply_text("orchestrator", "escalate task T-001: it broke")
        .unwrap();
    assert_eq!(outcome.status, Some(TaskStatus::Blocked));
    assert_eq!(outcome.diag_task_id.as_deref(), Some("T-002"));
    assert_eq!(outcome.diag_assignee_hint.as_deref(), Some("debugger"));

    let snapshot = board.load_snapshot().unwrap();
    let diag = &snapshot.tasks["T-002"];
    assert_eq!(diag.title, "DIAG T-001: it broke");
    assert_eq!(diag.related_to.as_deref(), Some("T-001"));
    assert_eq!(diag.assignee_hint.as_deref(), Some("debugger"));
    assert_eq!(diag.status, TaskStatus::Pending);
}

#[test]
fn status_reports_task_or_counts() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "create task T-001: one").unwrap();
    board.apply_text("orchestrator", "create task T-002: two").unwrap();
    board.apply_text("coder", "claim task T-002").unwrap();

    let one = board.apply_text("orchestrator", "status T-001").unwrap();
    assert_eq!(one.task.as_ref().map(|t| t.status), Some(TaskStatus::Pending));

    let all = board.apply_text("orchestrator", "status").unwrap();
    assert_eq!(all.total, Some(2));
    let counts = all.counts.unwrap();
    assert_eq!(counts.get("pending"), Some(&1));
    assert_eq!(counts.get("claimed"), Some(&1));
}

#[test]
fn status_for_missing_task_is_an_error() {
    let (_tmp, board) = board();
    let err = board.apply_text("orchestrator", "status T-404").unwrap_err();
    assert!(matches!(err, BoardError::TaskNotFound(id) if id == "T-404"));
}

#[test]
fn synthesize_reports_terminal_and_related_tasks() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "create task T-001: one").unwrap();
    board.apply_text("coder", "claim task T-001").unwrap();
    board.apply_text("coder", "mark done T-001: landed").unwrap();
    board.apply_text("orchestrator", "create task T-002: two").unwrap();

    let report = board
        .apply_text("orchestrator", "synthesize")
        .unwrap()
        .report
        .unwrap();
    assert!(report.starts_with("SYNTHESIS REPORT"));
    assert!(report.contains("T-001 [done] owner=coder :: landed"));
    assert!(!report.contains("T-002"));
}

#[test]
fn unknown_text_is_unsupported() {
    let (_tmp, board) = board();
    let err = board.apply_text("orchestrator", "do something").unwrap_err();
    assert!(matches!(err, BoardError::UnsupportedIntent(_)));
}

#[test]
fn duplicate_message_id_does_not_mutate_twice() {
    let (_tmp, board) = board();
    let first = board
        .apply_text_with_message_id("orchestrator", "create task T-001: demo", Some("msg-1"))
        .unwrap();
    assert!(!first.duplicate);

    let second = board
        .apply_text_with_message_id("orchestrator", "create task T-001: demo", Some("msg-1"))
        .unwrap();
    assert!(second.duplicate);

    // Only one task, one event
    let snapshot = board.load_snapshot().unwrap();
    assert_eq!(snapshot.tasks.len(), 1);
    assert_eq!(snapshot.tasks["T-001"].history.len(), 1);
}

#[test]
fn events_precede_snapshot_and_replay_matches() {
    let (_tmp, board) = board();
    board.apply_text("orchestrator", "@coder create task T-001: demo").unwrap();
    board.apply_text("coder", "claim task T-001").unwrap();
    board.apply_text("coder", "mark done T-001: ok").unwrap();

    let live = board.load_snapshot().unwrap();
    let report =
        orc_storage::rebuild_snapshot(board.dirs(), "2026-01-01T01:00:00Z", false).unwrap();
    assert_eq!(report.events_replayed, 3);

    let rebuilt = orc_storage::Snapshot::load(&board.dirs().snapshot_path()).unwrap();
    let live_tasks = serde_json::to_value(&live.tasks).unwrap();
    let rebuilt_tasks = serde_json::to_value(&rebuilt.tasks).unwrap();
    assert_eq!(live_tasks, rebuilt_tasks);
}
