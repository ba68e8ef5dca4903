// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_storage::save_json_pretty;
use serde_json::json;

fn library_from(config: serde_json::Value) -> StrategyLibrary {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    save_json_pretty(&dirs.config_dir().join(ROLE_STRATEGY_FILE), &config).unwrap();
    let lib = StrategyLibrary::load(&dirs);
    drop(tmp);
    lib
}

#[test]
fn resolve_prefers_task_kind_agent_match() {
    let lib = library_from(json!({
        "taskKinds": {
            "feature": {
                "coder": {"strategyId": "s-kind-agent", "content": "build it"},
                "default": {"strategyId": "s-kind-default", "content": "kind default"},
            },
        },
        "agents": {"coder": {"default": {"strategyId": "s-agent", "content": "agent default"}}},
        "default": {"strategyId": "s-global", "content": "global"},
    }));

    let hit = lib.resolve("coder", "feature", "T-001");
    assert_eq!(hit.strategy_id, "s-kind-agent");
    assert_eq!(hit.matched_by, "taskKind+agent");
    assert!(hit.enabled);

    let kind_default = lib.resolve("debugger", "feature", "T-001");
    assert_eq!(kind_default.strategy_id, "s-kind-default");
    assert_eq!(kind_default.matched_by, "taskKind default");

    let agent_default = lib.resolve("coder", "bugfix", "T-001");
    assert_eq!(agent_default.strategy_id, "s-agent");

    let global = lib.resolve("debugger", "bugfix", "T-001");
    assert_eq!(global.strategy_id, "s-global");
    assert_eq!(global.matched_by, "global default");
}

#[test]
fn missing_everything_resolves_to_none() {
    let lib = library_from(json!({}));
    let miss = lib.resolve("coder", "feature", "T-001");
    assert_eq!(miss.matched_by, "none");
    assert!(!miss.enabled);
}

#[test]
fn disabled_entry_stays_disabled() {
    let lib = library_from(json!({
        "default": {"strategyId": "s", "content": "x", "enabled": false},
    }));
    let hit = lib.resolve("coder", "feature", "T-001");
    assert_eq!(hit.strategy_id, "s");
    assert!(!hit.enabled);
}

#[test]
fn rollout_bucket_is_stable_and_bounded() {
    let a = rollout_bucket("T-001");
    let b = rollout_bucket("T-001");
    assert_eq!(a, b);
    assert!(a < 100);
    // Zero percent never hits, 100 always hits
    let lib = library_from(json!({
        "default": {"strategyId": "s", "content": "x", "rolloutPercent": 0},
    }));
    assert!(!lib.resolve("coder", "k", "T-001").enabled);
    let lib = library_from(json!({
        "default": {"strategyId": "s", "content": "x", "rolloutPercent": 100},
    }));
    assert!(lib.resolve("coder", "k", "T-001").enabled);
}

#[test]
fn rollout_gate_matches_the_bucket() {
    let task_id = "T-804";
    let bucket = rollout_bucket(task_id);
    let lib = library_from(json!({
        "default": {"strategyId": "s", "content": "x", "rolloutPercent": bucket + 1},
    }));
    assert!(lib.resolve("coder", "k", task_id).enabled);
    let lib = library_from(json!({
        "default": {"strategyId": "s", "content": "x", "rolloutPercent": bucket},
    }));
    assert!(!lib.resolve("coder", "k", task_id).enabled);
}
