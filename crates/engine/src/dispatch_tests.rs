// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{Approval, ApprovalStatus, ApprovalTarget, GovernanceCommand};
use orc_adapters::{FakeWorker, WorkerError};
use orc_core::{FakeClock, SequentialIdGen, TaskStatus};
use orc_storage::save_json_pretty;
use serde_json::json;

struct Harness {
    _tmp: tempfile::TempDir,
    dirs: StateDir,
    clock: FakeClock,
    dispatcher: Dispatcher,
    fake: FakeWorker,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    let clock = FakeClock::at_ts(1_767_225_600);
    let fake = FakeWorker::new();
    let dispatcher = Dispatcher::new(
        dirs.clone(),
        Arc::new(clock.clone()),
        Arc::new(SequentialIdGen::new("evt")),
    )
    .with_executor(Arc::new(fake.clone()));
    Harness {
        _tmp: tmp,
        dirs,
        clock,
        dispatcher,
        fake,
    }
}

impl Harness {
    fn create_task(&self, text: &str) {
        self.dispatcher.board().apply_text("orchestrator", text).unwrap();
    }

    fn request(&self, task_id: &str, agent: &str) -> DispatchRequest {
        DispatchRequest {
            task_id: Some(task_id.to_string()),
            agent: agent.to_string(),
            actor: "orchestrator".to_string(),
            ..DispatchRequest::default()
        }
    }

    fn task_status(&self, task_id: &str) -> TaskStatus {
        self.dispatcher.board().load_snapshot().unwrap().tasks[task_id].status
    }

    fn metric_events(&self) -> Vec<String> {
        orc_storage::read_jsonl_values(&self.dirs.metrics_path())
            .unwrap()
            .into_iter()
            .filter_map(|row| row["event"].as_str().map(str::to_string))
            .collect()
    }
}

#[tokio::test]
async fn happy_path_closes_the_task() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.fake.push_output(
        r#"{"status":"done","summary":"ok","evidence":["pytest -q => 3 passed","logs/x.log"]}"#,
    );

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.decision, DispatchDecision::Done);
    assert_eq!(outcome.reason_code, "done_with_evidence");
    assert!(outcome.auto_close);
    assert_eq!(h.task_status("T-001"), TaskStatus::Done);
    assert!(h.metric_events().contains(&"dispatch_done".to_string()));

    // The governance checkpoint was audited
    let audit = h.dispatcher.governance().verify_audit_chain();
    assert!(audit.ok);
    assert!(audit.rows >= 1);
}

#[tokio::test]
async fn done_without_evidence_is_demoted_to_blocked() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.fake.push_output(r#"{"status":"done","summary":"done"}"#);

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Blocked);
    assert_eq!(outcome.reason_code, "incomplete_output");
    assert_eq!(
        outcome.acceptance_reason_code.as_deref(),
        Some("missing_hard_evidence")
    );
    assert_eq!(h.task_status("T-001"), TaskStatus::Blocked);
    assert!(h.metric_events().contains(&"dispatch_blocked".to_string()));
}

#[tokio::test]
async fn failure_signal_in_summary_blocks() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.fake
        .push_output(r#"{"status":"done","summary":"FAILED tests/test_x.py::test_a"}"#);

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Blocked);
    assert_eq!(
        outcome.acceptance_reason_code.as_deref(),
        Some("failure_signal_detected")
    );
    assert_eq!(h.task_status("T-001"), TaskStatus::Blocked);
}

#[tokio::test]
async fn worker_blocked_reply_blocks_with_its_reason() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.fake
        .push_output(r#"{"status":"blocked","summary":"missing credentials"}"#);

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.reason_code, "blocked_signal");
    assert_eq!(outcome.recovery.as_ref().unwrap().attempt, 1);
    let snapshot = h.dispatcher.board().load_snapshot().unwrap();
    assert_eq!(
        snapshot.tasks["T-001"].blocked_reason.as_deref(),
        Some("missing credentials")
    );
}

#[tokio::test]
async fn progress_reply_leaves_the_task_running() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.fake.push_output(r#"{"status":"progress","summary":"half way"}"#);

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Progress);
    assert_eq!(h.task_status("T-001"), TaskStatus::Claimed);
    // Progress emits no dispatch metric
    assert!(h.metric_events().is_empty());
}

#[tokio::test]
async fn unparseable_output_synthesizes_a_blocked_reply() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.fake.push_output("complete gibberish with no json");

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.reason_code, "blocked_signal");
    let snapshot = h.dispatcher.board().load_snapshot().unwrap();
    assert_eq!(
        snapshot.tasks["T-001"].blocked_reason.as_deref(),
        Some("output is empty or invalid")
    );
}

#[tokio::test]
async fn spawn_timeout_triggers_recovery() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.fake.push_error(WorkerError::Timeout(30));

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Blocked);
    assert_eq!(outcome.reason_code, "spawn_failed");
    let recovery = outcome.recovery.as_ref().unwrap();
    assert_eq!(recovery.next_assignee, "debugger");
    assert_eq!(recovery.action, "retry");
    assert!(h.metric_events().contains(&"recovery_scheduled".to_string()));
    assert_eq!(h.task_status("T-001"), TaskStatus::Blocked);
}

#[tokio::test]
async fn fake_output_skips_the_subprocess() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    let mut request = h.request("T-001", "coder");
    request.fake_output =
        Some(r#"{"status":"done","summary":"ok","evidence":["logs/x.log"]}"#.to_string());

    let outcome = h.dispatcher.dispatch(&request).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Done);
    assert_eq!(h.fake.call_count(), 0);
}

#[tokio::test]
async fn governance_freeze_denies_dispatch() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.dispatcher
        .governance()
        .execute("operator", &GovernanceCommand::Freeze)
        .unwrap();

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Denied);
    assert_eq!(outcome.reason_code, "governance_frozen");
    // Task untouched and no worker spawned
    assert_eq!(h.task_status("T-001"), TaskStatus::Pending);
    assert_eq!(h.fake.call_count(), 0);
    assert!(h.metric_events().contains(&"dispatch_blocked".to_string()));
}

#[tokio::test]
async fn pending_approval_denies_until_approved() {
    let h = harness();
    h.create_task("@coder create task T-804: gated");
    h.dispatcher
        .governance()
        .put_approval(Approval {
            id: "APR-1".to_string(),
            status: ApprovalStatus::Pending,
            target: ApprovalTarget {
                kind: "dispatch".to_string(),
                task_id: Some("T-804".to_string()),
                agent: None,
            },
            ..Approval::default()
        })
        .unwrap();

    let denied = h.dispatcher.dispatch(&h.request("T-804", "coder")).await.unwrap();
    assert_eq!(denied.decision, DispatchDecision::Denied);
    assert_eq!(denied.reason_code, "approval_required");

    h.dispatcher
        .governance()
        .execute("operator", &GovernanceCommand::Approve("APR-1".to_string()))
        .unwrap();
    h.fake
        .push_output(r#"{"status":"done","summary":"ok","evidence":["logs/x.log"]}"#);
    let allowed = h.dispatcher.dispatch(&h.request("T-804", "coder")).await.unwrap();
    assert_eq!(allowed.decision, DispatchDecision::Done);
}

#[tokio::test]
async fn empty_task_id_selects_via_priority_engine() {
    let h = harness();
    h.create_task("@coder create task T-001: low");
    h.create_task("@coder create task T-002: high");
    // Raise T-002's priority directly in the snapshot
    {
        let mut snapshot = h.dispatcher.board().load_snapshot().unwrap();
        if let Some(task) = snapshot.tasks.get_mut("T-002") {
            task.priority = 5.0;
        }
        snapshot
            .save_with_timestamp(&h.dirs.snapshot_path(), "2026-01-01T00:00:00Z")
            .unwrap();
    }
    h.fake
        .push_output(r#"{"status":"done","summary":"ok","evidence":["logs/x.log"]}"#);

    let mut request = h.request("", "coder");
    request.task_id = None;
    let outcome = h.dispatcher.dispatch(&request).await.unwrap();
    assert_eq!(outcome.task_id, "T-002");
    let selection = outcome.selection.as_ref().unwrap();
    assert_eq!(selection.task_id, "T-002");
}

#[tokio::test]
async fn no_ready_task_is_a_denied_outcome() {
    let h = harness();
    let mut request = h.request("", "coder");
    request.task_id = None;
    let outcome = h.dispatcher.dispatch(&request).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Denied);
    assert_eq!(outcome.reason_code, "no_ready_task");
}

#[tokio::test]
async fn requested_unready_task_is_denied_without_fallback() {
    let h = harness();
    h.create_task("@coder create task T-001: blocked one");
    h.create_task("@coder create task T-002: ready one");
    h.dispatcher
        .board()
        .apply_text("orchestrator", "block task T-001: waiting")
        .unwrap();

    // T-001 is blocked; requesting it must not fall back to T-002
    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Denied);
    assert_eq!(outcome.reason_code, "requested_task_not_ready");
    assert_eq!(h.task_status("T-002"), TaskStatus::Pending);
    assert_eq!(h.fake.call_count(), 0);
}

#[tokio::test]
async fn token_budget_exceeded_demotes_and_escalates() {
    let h = harness();
    save_json_pretty(
        &h.dirs.config_dir().join("budget-policy.json"),
        &json!({
            "global": {
                "maxTaskTokens": 50,
                "maxTaskWallTimeSec": 3600,
                "maxTaskRetries": 3,
                "degradePolicy": ["reduced_context", "manual_handoff", "stop_run"],
                "onExceeded": "manual_handoff",
            },
            "agents": {},
        }),
    )
    .unwrap();
    h.create_task("@coder create task T-001: budget");
    h.fake.push_output(
        r#"{"status":"done","summary":"ok","evidence":["logs/x.log"],"metrics":{"tokenUsage":120,"elapsedMs":500}}"#,
    );

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Blocked);
    assert_eq!(outcome.reason_code, "budget_exceeded");
    assert_eq!(outcome.next_assignee.as_deref(), Some("human"));
    assert_eq!(outcome.action.as_deref(), Some("escalate"));
    assert_eq!(
        outcome.degrade_action,
        Some(orc_policy::DegradeAction::ManualHandoff)
    );
    assert_eq!(
        outcome.exceeded_keys.as_deref(),
        Some(&["maxTaskTokens".to_string()][..])
    );
}

#[tokio::test]
async fn usage_aliases_do_not_double_count() {
    let h = harness();
    save_json_pretty(
        &h.dirs.config_dir().join("budget-policy.json"),
        &json!({
            "global": {"maxTaskTokens": 80, "maxTaskWallTimeSec": 3600, "maxTaskRetries": 3},
            "agents": {},
        }),
    )
    .unwrap();
    h.create_task("@coder create task T-001: aliases");
    h.fake.push_output(
        r#"{"status":"done","summary":"ok","evidence":["logs/x.log"],"usage":{"prompt_tokens":25,"completion_tokens":25,"input_tokens":25,"output_tokens":25}}"#,
    );

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.metrics.token_usage, 50);
    assert_ne!(outcome.reason_code, "budget_exceeded");
    assert_eq!(outcome.decision, DispatchDecision::Done);
}

#[tokio::test]
async fn budget_precheck_blocks_before_spawn() {
    let h = harness();
    save_json_pretty(
        &h.dirs.config_dir().join("budget-policy.json"),
        &json!({
            "global": {"maxTaskTokens": 1000, "maxTaskWallTimeSec": 3600, "maxTaskRetries": 1},
            "agents": {},
        }),
    )
    .unwrap();
    save_json_pretty(
        &h.dirs.budget_state_path(),
        &json!({
            "entries": {
                "T-001|coder": {
                    "taskId": "T-001",
                    "agent": "coder",
                    "tokenUsage": 10,
                    "elapsedMs": 500,
                    "retryCount": 1,
                }
            },
            "updatedAt": "2026-03-01T00:00:00Z",
        }),
    )
    .unwrap();
    h.create_task("@coder create task T-001: retry budget");

    let outcome = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(outcome.decision, DispatchDecision::Blocked);
    assert_eq!(outcome.reason_code, "budget_exceeded");
    assert_eq!(
        outcome.exceeded_keys.as_deref(),
        Some(&["maxTaskRetries".to_string()][..])
    );
    // The worker never ran
    assert_eq!(h.fake.call_count(), 0);
    assert_eq!(h.task_status("T-001"), TaskStatus::Blocked);
}

#[tokio::test]
async fn prompt_carries_snapshot_history_and_schema() {
    let h = harness();
    h.create_task("@coder create task T-040: structured prompt");
    h.create_task("@debugger create task T-041: blocked sample");
    h.dispatcher
        .board()
        .apply_text("orchestrator", "block task T-041: sample blocked")
        .unwrap();
    h.fake.push_output(
        r#"{"status":"done","summary":"ok","evidence":["logs/t040.log","pytest passed"]}"#,
    );

    let outcome = h.dispatcher.dispatch(&h.request("T-040", "coder")).await.unwrap();
    let prompt = outcome.agent_prompt.as_deref().unwrap();
    assert!(prompt.contains("BOARD_SNAPSHOT"));
    assert!(prompt.contains("TASK_RECENT_HISTORY"));
    assert!(prompt.contains("OUTPUT_SCHEMA"));
    assert!(prompt.contains("\"status\": \"done|blocked|progress\""));
    assert!(prompt.contains("T-041 [blocked]"));
}

#[tokio::test]
async fn worker_receives_the_prompt_on_request() {
    let h = harness();
    h.create_task("@coder create task T-001: demo");
    h.fake.push_output(r#"{"status":"progress","summary":"ack"}"#);

    h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    let calls = h.fake.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].task_id, "T-001");
    assert!(calls[0].prompt.contains("OUTPUT_SCHEMA"));
}

#[tokio::test]
async fn second_spawn_failure_advances_the_chain_after_cooldown() {
    let h = harness();
    h.create_task("@coder create task T-001: flaky");
    h.fake.push_error(WorkerError::Spawn("boom".to_string()));

    let first = h.dispatcher.dispatch(&h.request("T-001", "coder")).await.unwrap();
    assert_eq!(first.recovery.as_ref().unwrap().attempt, 1);
    assert_eq!(first.recovery.as_ref().unwrap().next_assignee, "debugger");

    // Reclaim the blocked task and retry as the next assignee after the
    // cooldown expires
    h.clock.advance_secs(200);
    h.dispatcher
        .board()
        .apply_text("debugger", "claim task T-001")
        .unwrap();
    h.fake.push_error(WorkerError::Spawn("boom again".to_string()));
    let second = h
        .dispatcher
        .dispatch(&h.request("T-001", "debugger"))
        .await
        .unwrap();
    let recovery = second.recovery.as_ref().unwrap();
    assert_eq!(recovery.attempt, 2);
    assert_eq!(recovery.next_assignee, "invest-analyst");
}
