// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[yare::parameterized(
    pending_claim      = { TaskStatus::Pending, TaskStatus::Claimed, true },
    pending_block      = { TaskStatus::Pending, TaskStatus::Blocked, true },
    pending_done       = { TaskStatus::Pending, TaskStatus::Done, false },
    claimed_progress   = { TaskStatus::Claimed, TaskStatus::InProgress, true },
    claimed_done       = { TaskStatus::Claimed, TaskStatus::Done, true },
    progress_review    = { TaskStatus::InProgress, TaskStatus::Review, true },
    progress_failed    = { TaskStatus::InProgress, TaskStatus::Failed, true },
    review_progress    = { TaskStatus::Review, TaskStatus::InProgress, true },
    review_failed      = { TaskStatus::Review, TaskStatus::Failed, false },
    blocked_progress   = { TaskStatus::Blocked, TaskStatus::InProgress, true },
    blocked_claimed    = { TaskStatus::Blocked, TaskStatus::Claimed, true },
    blocked_done       = { TaskStatus::Blocked, TaskStatus::Done, false },
    failed_progress    = { TaskStatus::Failed, TaskStatus::InProgress, true },
    failed_done        = { TaskStatus::Failed, TaskStatus::Done, false },
    done_is_terminal   = { TaskStatus::Done, TaskStatus::InProgress, false },
    self_edge_is_noop  = { TaskStatus::Done, TaskStatus::Done, true },
)]
fn transition_matrix(from: TaskStatus, to: TaskStatus, allowed: bool) {
    assert_eq!(can_transition(from, to), allowed);
}

#[test]
fn status_round_trips_through_serde() {
    let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
    assert_eq!(json, "\"in_progress\"");
    let back: TaskStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(back, TaskStatus::InProgress);
}

#[test]
fn next_task_id_is_monotone() {
    let ids = vec!["T-001".to_string(), "T-007".to_string(), "X-99".to_string()];
    assert_eq!(next_task_id(ids.iter()), "T-008");
    let empty: Vec<String> = Vec::new();
    assert_eq!(next_task_id(empty.iter()), "T-001");
}

#[yare::parameterized(
    null_is_zero     = { json!(null), 0.0 },
    bool_true        = { json!(true), 1.0 },
    plain_number     = { json!(2.5), 2.5 },
    numeric_string   = { json!("3"), 3.0 },
    junk_string      = { json!("high"), 0.0 },
    nan_string       = { json!("NaN"), 0.0 },
    inf_string       = { json!("inf"), 0.0 },
)]
fn to_number_sanitizes(value: serde_json::Value, expected: f64) {
    assert_eq!(to_number(&value, 0.0), expected);
}

#[test]
fn normalize_refs_dedupes_and_keeps_order() {
    let value = json!(["T-002", "T-001", "T-002", " ", "T-003"]);
    assert_eq!(normalize_refs(&value), vec!["T-002", "T-001", "T-003"]);
}

#[test]
fn normalize_refs_accepts_csv_and_json_strings() {
    assert_eq!(
        normalize_refs(&json!("T-001, T-002 ; T-003")),
        vec!["T-001", "T-002", "T-003"]
    );
    assert_eq!(
        normalize_refs(&json!("[\"T-004\",\"T-005\"]")),
        vec!["T-004", "T-005"]
    );
    assert_eq!(normalize_refs(&json!({"taskId": "T-009"})), vec!["T-009"]);
}

#[test]
fn task_deserialization_sanitizes_numbers_and_refs() {
    let raw = json!({
        "taskId": "T-001",
        "title": "demo",
        "status": "pending",
        "priority": "NaN",
        "impact": 2,
        "dependsOn": "T-002 T-002 T-003",
        "blockedBy": ["ENV:prod", "ENV:prod"],
    });
    let task: Task = serde_json::from_value(raw).unwrap();
    assert_eq!(task.priority, 0.0);
    assert_eq!(task.impact, 2.0);
    assert_eq!(task.depends_on, vec!["T-002", "T-003"]);
    assert_eq!(task.blocked_by, vec!["ENV:prod"]);
}

proptest::proptest! {
    #[test]
    fn refs_round_trip_is_stable(items in proptest::collection::vec("[A-Za-z0-9_-]{1,8}", 0..8)) {
        let value = json!(items);
        let once = normalize_refs(&value);
        let twice = normalize_refs(&json!(once));
        proptest::prop_assert_eq!(once, twice);
    }
}
