// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_core::FakeClock;

fn governance() -> (tempfile::TempDir, Governance) {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    let clock = Arc::new(FakeClock::at_ts(1_767_225_600));
    (tmp, Governance::new(dirs, clock))
}

fn approval(id: &str, status: ApprovalStatus, task_id: Option<&str>, agent: Option<&str>) -> Approval {
    Approval {
        id: id.to_string(),
        status,
        target: ApprovalTarget {
            kind: "dispatch".to_string(),
            task_id: task_id.map(str::to_string),
            agent: agent.map(str::to_string),
        },
        ..Approval::default()
    }
}

#[test]
fn default_state_allows_dispatch() {
    let (_tmp, gov) = governance();
    let result = gov.checkpoint_dispatch("orchestrator", "T-001", "coder").unwrap();
    assert!(result.allowed);
    assert_eq!(result.reason, "allowed");
}

#[test]
fn frozen_denies_all_checkpoints() {
    let (_tmp, gov) = governance();
    gov.execute("operator", &GovernanceCommand::Freeze).unwrap();

    for result in [
        gov.checkpoint_dispatch("o", "T-001", "coder").unwrap(),
        gov.checkpoint_autopilot("o").unwrap(),
        gov.checkpoint_scheduler("o").unwrap(),
    ] {
        assert!(!result.allowed);
        assert_eq!(result.reason, "governance_frozen");
    }

    gov.execute("operator", &GovernanceCommand::Unfreeze).unwrap();
    assert!(gov.checkpoint_dispatch("o", "T-001", "coder").unwrap().allowed);
}

#[test]
fn paused_blocks_loops_but_not_dispatch() {
    let (_tmp, gov) = governance();
    gov.execute("operator", &GovernanceCommand::Pause).unwrap();

    assert!(gov.checkpoint_dispatch("o", "T-001", "coder").unwrap().allowed);
    let autopilot = gov.checkpoint_autopilot("o").unwrap();
    assert_eq!(autopilot.reason, "governance_paused");
    let scheduler = gov.checkpoint_scheduler("o").unwrap();
    assert_eq!(scheduler.reason, "governance_paused");

    gov.execute("operator", &GovernanceCommand::Resume).unwrap();
    assert!(gov.checkpoint_autopilot("o").unwrap().allowed);
}

#[test]
fn abort_credits_are_consumed_once() {
    let (_tmp, gov) = governance();
    gov.execute(
        "operator",
        &GovernanceCommand::Abort(AbortTarget::Task("t-001".to_string())),
    )
    .unwrap();

    // Unrelated task is not affected
    assert!(gov.checkpoint_dispatch("o", "T-002", "coder").unwrap().allowed);

    let denied = gov.checkpoint_dispatch("o", "T-001", "coder").unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.reason, "governance_aborted");
    assert_eq!(denied.consumed.as_ref().unwrap().scope, "task");

    // One-shot: the next crossing is allowed again
    assert!(gov.checkpoint_dispatch("o", "T-001", "coder").unwrap().allowed);
}

#[test]
fn global_abort_applies_to_any_scope() {
    let (_tmp, gov) = governance();
    gov.execute("operator", &GovernanceCommand::Abort(AbortTarget::Global))
        .unwrap();
    let denied = gov.checkpoint_scheduler("o").unwrap();
    assert_eq!(denied.reason, "governance_aborted");
    assert_eq!(denied.consumed.as_ref().unwrap().scope, "global");
    assert!(gov.checkpoint_scheduler("o").unwrap().allowed);
}

#[test]
fn scoped_abort_consumed_before_global() {
    let (_tmp, gov) = governance();
    gov.execute("operator", &GovernanceCommand::Abort(AbortTarget::Scheduler))
        .unwrap();
    gov.execute("operator", &GovernanceCommand::Abort(AbortTarget::Global))
        .unwrap();

    let first = gov.checkpoint_scheduler("o").unwrap();
    assert_eq!(first.consumed.as_ref().unwrap().scope, "scheduler");
    let second = gov.checkpoint_scheduler("o").unwrap();
    assert_eq!(second.consumed.as_ref().unwrap().scope, "global");
    assert!(gov.checkpoint_scheduler("o").unwrap().allowed);
}

#[test]
fn pending_approval_gates_matching_dispatch() {
    let (_tmp, gov) = governance();
    gov.put_approval(approval("APR-1", ApprovalStatus::Pending, Some("T-804"), None))
        .unwrap();

    let denied = gov.checkpoint_dispatch("o", "T-804", "coder").unwrap();
    assert_eq!(denied.reason, "approval_required");
    assert_eq!(denied.approval_id.as_deref(), Some("APR-1"));

    // Other tasks pass
    assert!(gov.checkpoint_dispatch("o", "T-001", "coder").unwrap().allowed);

    gov.execute("operator", &GovernanceCommand::Approve("APR-1".to_string()))
        .unwrap();
    assert!(gov.checkpoint_dispatch("o", "T-804", "coder").unwrap().allowed);
}

#[test]
fn rejected_approval_denies_with_its_own_reason() {
    let (_tmp, gov) = governance();
    gov.put_approval(approval("APR-2", ApprovalStatus::Rejected, None, Some("Coder")))
        .unwrap();

    let denied = gov.checkpoint_dispatch("o", "T-001", "CODER").unwrap();
    assert_eq!(denied.reason, "approval_rejected");
    // Agent matching is case-insensitive; other agents pass
    assert!(gov.checkpoint_dispatch("o", "T-001", "debugger").unwrap().allowed);
}

#[test]
fn approve_records_the_decider() {
    let (_tmp, gov) = governance();
    gov.put_approval(approval("APR-3", ApprovalStatus::Pending, None, None))
        .unwrap();
    let outcome = gov
        .execute("operator", &GovernanceCommand::Approve("APR-3".to_string()))
        .unwrap();
    assert_eq!(outcome.status, Some(ApprovalStatus::Approved));

    let state = gov.load_control();
    assert_eq!(state.approvals["APR-3"].decided_by, "operator");
    assert!(!state.approvals["APR-3"].decided_at.is_empty());
}

#[test]
fn approving_missing_approval_fails() {
    let (_tmp, gov) = governance();
    let err = gov
        .execute("operator", &GovernanceCommand::Approve("APR-404".to_string()))
        .unwrap_err();
    assert!(matches!(err, GovernanceError::ApprovalNotFound(_)));
}

#[yare::parameterized(
    zh_status    = { "治理", GovernanceCommand::Status },
    zh_status2   = { "治理 状态", GovernanceCommand::Status },
    zh_pause     = { "治理 暂停", GovernanceCommand::Pause },
    zh_resume    = { "治理 恢复", GovernanceCommand::Resume },
    zh_freeze    = { "治理 冻结", GovernanceCommand::Freeze },
    zh_unfreeze  = { "治理 解冻", GovernanceCommand::Unfreeze },
    en_pause     = { "governance pause", GovernanceCommand::Pause },
    zh_abort_all = { "治理 中止 全部", GovernanceCommand::Abort(AbortTarget::Global) },
    zh_abort_sch = { "治理 中止 调度", GovernanceCommand::Abort(AbortTarget::Scheduler) },
    zh_abort_ap  = { "治理 中止 自动推进", GovernanceCommand::Abort(AbortTarget::Autopilot) },
    zh_abort_tsk = { "治理 中止 t-042", GovernanceCommand::Abort(AbortTarget::Task("T-042".to_string())) },
    en_abort     = { "governance abort scheduler", GovernanceCommand::Abort(AbortTarget::Scheduler) },
    zh_approve   = { "治理 审批 通过 APR-9", GovernanceCommand::Approve("APR-9".to_string()) },
    zh_reject    = { "治理 审批 拒绝 APR-9", GovernanceCommand::Reject("APR-9".to_string()) },
    en_approve   = { "governance approve APR-9", GovernanceCommand::Approve("APR-9".to_string()) },
)]
fn command_grammar(text: &str, expected: GovernanceCommand) {
    assert_eq!(Governance::parse_command(text), Some(expected));
}

#[test]
fn non_governance_text_is_not_parsed() {
    assert_eq!(Governance::parse_command("create task T-001: x"), None);
}

#[test]
fn gibberish_after_prefix_is_invalid() {
    assert!(matches!(
        Governance::parse_command("治理 跳舞"),
        Some(GovernanceCommand::Invalid(_))
    ));
}

#[test]
fn audit_chain_verifies_and_detects_tampering() {
    let (_tmp, gov) = governance();
    gov.execute("operator", &GovernanceCommand::Pause).unwrap();
    gov.checkpoint_autopilot("o").unwrap();
    gov.execute("operator", &GovernanceCommand::Resume).unwrap();
    gov.checkpoint_dispatch("o", "T-001", "coder").unwrap();

    let report = gov.verify_audit_chain();
    assert!(report.ok, "{report:?}");
    assert!(report.rows >= 4);

    // Tamper with one row
    let path = gov.dirs.governance_audit_path();
    let body = std::fs::read_to_string(&path).unwrap();
    let tampered = body.replacen("\"ok\":true", "\"ok\":false", 1);
    assert_ne!(body, tampered);
    std::fs::write(&path, tampered).unwrap();

    let report = gov.verify_audit_chain();
    assert!(!report.ok);
    assert!(report.break_at.is_some());
}

#[test]
fn every_checkpoint_crossing_is_audited() {
    let (_tmp, gov) = governance();
    gov.checkpoint_dispatch("o", "T-001", "coder").unwrap();

    let rows = orc_storage::read_jsonl_values(&gov.dirs.governance_audit_path()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["action"], "checkpoint.dispatch");
    assert_eq!(rows[0]["result"]["allowed"], true);
    assert_eq!(rows[0]["prevHash"], "");
    assert!(!rows[0]["hash"].as_str().unwrap().is_empty());
}

#[test]
fn state_summary_formats_one_line() {
    let (_tmp, gov) = governance();
    gov.execute("operator", &GovernanceCommand::Abort(AbortTarget::Global))
        .unwrap();
    let outcome = gov.execute("operator", &GovernanceCommand::Status).unwrap();
    let line = outcome.state.format_line();
    assert!(line.contains("aborts(global=1"));
    assert!(line.contains("paused=false"));
}
