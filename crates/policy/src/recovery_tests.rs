// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_storage::save_json_pretty;
use serde_json::json;

#[test]
fn defaults_carry_reason_overrides() {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    let policy = RecoveryPolicy::load(&dirs);

    assert_eq!(
        policy.recovery_chain,
        vec!["coder", "debugger", "invest-analyst", "human"]
    );
    assert_eq!(policy.policy_for(RecoveryReason::IncompleteOutput).cooldown_sec, 120);
    assert_eq!(policy.policy_for(RecoveryReason::SpawnFailed).cooldown_sec, 180);
}

#[test]
fn chain_always_ends_in_human() {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    save_json_pretty(
        &dirs.config_dir().join(RECOVERY_POLICY_FILE),
        &json!({"recoveryChain": ["Coder", "coder", "reviewer"]}),
    )
    .unwrap();

    let policy = RecoveryPolicy::load(&dirs);
    assert_eq!(policy.recovery_chain, vec!["coder", "reviewer", "human"]);
}

#[yare::parameterized(
    advances_one        = { "coder", "debugger" },
    case_insensitive    = { "Debugger", "invest-analyst" },
    last_stays_human    = { "human", "human" },
    unknown_uses_head   = { "stranger", "coder" },
    empty_uses_head     = { "", "coder" },
)]
fn next_assignee_walks_the_chain(current: &str, expected: &str) {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    let policy = RecoveryPolicy::load(&dirs);
    assert_eq!(policy.next_assignee_for(current), expected);
}

#[test]
fn reason_parse_rejects_unknown_codes() {
    assert_eq!(RecoveryReason::parse("spawn_failed"), Some(RecoveryReason::SpawnFailed));
    assert_eq!(RecoveryReason::parse("  Blocked_Signal "), Some(RecoveryReason::BlockedSignal));
    assert_eq!(RecoveryReason::parse("meteor_strike"), None);
}
