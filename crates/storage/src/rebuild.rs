// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot rebuild: replay the journal into a fresh snapshot.

use crate::{apply_event, Journal, JournalError, Snapshot, StateDir};
use std::io;
use thiserror::Error;

/// Errors that can occur during a rebuild
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of a rebuild run.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub events_replayed: usize,
    pub tasks: usize,
    /// Event count after compaction, when `--compact` was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compacted_events: Option<usize>,
}

/// Replay the journal from empty and rewrite the snapshot.
///
/// With `compact`, also rewrites the journal deduplicated by `eventId`.
pub fn rebuild_snapshot(
    dirs: &StateDir,
    now_iso: &str,
    compact: bool,
) -> Result<RebuildReport, RebuildError> {
    let journal = Journal::new(dirs.journal_path());
    let events = journal.read_all()?;

    let mut snapshot = Snapshot::empty(now_iso);
    for event in &events {
        apply_event(&mut snapshot.tasks, event);
    }
    snapshot.save_with_timestamp(&dirs.snapshot_path(), now_iso)?;

    let compacted_events = if compact {
        Some(journal.compact()?)
    } else {
        None
    };

    Ok(RebuildReport {
        events_replayed: events.len(),
        tasks: snapshot.tasks.len(),
        compacted_events,
    })
}

#[cfg(test)]
#[path = "rebuild_tests.rs"]
mod tests;
