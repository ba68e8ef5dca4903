// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_storage::save_json_pretty;

fn dirs() -> (tempfile::TempDir, StateDir) {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    (tmp, dirs)
}

fn enable(dirs: &StateDir, extra: serde_json::Value) {
    let mut config = json!({"enabled": true});
    crate::deep_merge(&mut config, &extra);
    save_json_pretty(&dirs.config_dir().join(KNOWLEDGE_FEEDBACK_FILE), &config).unwrap();
}

use serde_json::json;

#[test]
fn disabled_by_default() {
    let (_tmp, dirs) = dirs();
    let hints = fetch_knowledge_hints(&dirs);
    assert!(!hints.enabled);
    assert!(hints.hints.is_empty());
}

#[test]
fn read_write_mode_degrades() {
    let (_tmp, dirs) = dirs();
    enable(&dirs, json!({"readOnly": false}));
    let hints = fetch_knowledge_hints(&dirs);
    assert!(hints.enabled);
    assert!(hints.degraded);
    assert_eq!(hints.degrade_reason, "knowledge adapter requires readOnly=true");
}

#[test]
fn hints_come_from_first_nonempty_source() {
    let (_tmp, dirs) = dirs();
    enable(&dirs, json!({}));
    save_json_pretty(
        &dirs.state_dir().join("knowledge-feedback.json"),
        &json!({
            "lessons": ["always pin versions", "always pin versions", "log the reason"],
            "mistakes": ["skipped review"],
        }),
    )
    .unwrap();

    let hints = fetch_knowledge_hints(&dirs);
    assert!(hints.enabled);
    assert!(!hints.degraded);
    // maxItems defaults to 3, deduped across tags
    assert_eq!(
        hints.hints,
        vec!["always pin versions", "log the reason", "skipped review"]
    );
    assert_eq!(hints.knowledge_tags, vec!["lessons", "mistakes"]);
    assert!(hints.source.ends_with("knowledge-feedback.json"));
}

#[test]
fn unreadable_source_degrades_softly() {
    let (_tmp, dirs) = dirs();
    enable(&dirs, json!({}));
    std::fs::create_dir_all(dirs.state_dir()).unwrap();
    std::fs::write(dirs.state_dir().join("knowledge-feedback.json"), "{broken").unwrap();

    let hints = fetch_knowledge_hints(&dirs);
    assert!(hints.degraded);
    assert!(hints.degrade_reason.starts_with("failed to read knowledge source"));
}

#[test]
fn enabled_with_no_sources_returns_empty() {
    let (_tmp, dirs) = dirs();
    enable(&dirs, json!({}));
    let hints = fetch_knowledge_hints(&dirs);
    assert!(hints.enabled);
    assert!(!hints.degraded);
    assert!(hints.hints.is_empty());
}

#[test]
fn max_items_is_clamped() {
    let (_tmp, dirs) = dirs();
    enable(&dirs, json!({"maxItems": 1}));
    save_json_pretty(
        &dirs.state_dir().join("lessons-learned.json"),
        &json!({"lessons": ["one", "two"]}),
    )
    .unwrap();
    let hints = fetch_knowledge_hints(&dirs);
    assert_eq!(hints.hints, vec!["one"]);
}
