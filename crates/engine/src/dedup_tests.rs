// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn dedup() -> (tempfile::TempDir, InboundDedup) {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    (tmp, InboundDedup::new(dirs))
}

#[test]
fn fresh_then_duplicate() {
    let (_tmp, dedup) = dedup();
    assert!(dedup.check_and_record("msg-1", "2026-03-01T00:00:00Z").unwrap());
    assert!(!dedup.check_and_record("msg-1", "2026-03-01T00:00:01Z").unwrap());
    assert!(dedup.check_and_record("msg-2", "2026-03-01T00:00:02Z").unwrap());
}

#[test]
fn empty_ids_are_always_fresh() {
    let (_tmp, dedup) = dedup();
    assert!(dedup.check_and_record("", "2026-03-01T00:00:00Z").unwrap());
    assert!(dedup.check_and_record("  ", "2026-03-01T00:00:00Z").unwrap());
}

#[test]
fn capacity_evicts_oldest_ids() {
    let (_tmp, dedup) = dedup();
    for idx in 0..=super::SEEN_CAPACITY {
        let id = format!("msg-{idx}");
        assert!(dedup.check_and_record(&id, "2026-03-01T00:00:00Z").unwrap());
    }
    // msg-0 was evicted and counts as fresh again
    assert!(dedup.check_and_record("msg-0", "2026-03-01T00:00:01Z").unwrap());
    // A recent id is still recognized
    let recent = format!("msg-{}", super::SEEN_CAPACITY);
    assert!(!dedup.check_and_record(&recent, "2026-03-01T00:00:02Z").unwrap());
}
