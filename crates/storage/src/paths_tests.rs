// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ensure_seeds_journal_and_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    dirs.ensure("2026-03-01T00:00:00Z").unwrap();

    assert!(dirs.locks_dir().is_dir());
    assert!(dirs.journal_path().is_file());
    assert!(dirs.snapshot_path().is_file());

    let snapshot = crate::Snapshot::load(&dirs.snapshot_path()).unwrap();
    assert!(snapshot.tasks.is_empty());
    assert_eq!(snapshot.meta.version, crate::SNAPSHOT_VERSION);
}

#[test]
fn ensure_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    dirs.ensure("2026-03-01T00:00:00Z").unwrap();
    dirs.ensure("2026-03-02T00:00:00Z").unwrap();
    // Existing snapshot is not overwritten
    let snapshot = crate::Snapshot::load(&dirs.snapshot_path()).unwrap();
    assert_eq!(snapshot.meta.updated_at, "2026-03-01T00:00:00Z");
}

#[test]
fn config_candidates_prefer_config_dir() {
    let dirs = StateDir::new("/run/root");
    let candidates = dirs.config_candidates("budget-policy.json");
    assert_eq!(candidates[0], dirs.config_dir().join("budget-policy.json"));
    assert_eq!(candidates[1], dirs.state_dir().join("budget-policy.json"));
}
