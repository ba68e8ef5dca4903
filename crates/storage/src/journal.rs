// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL event journal.
//!
//! One line of JSON per board event, append-only. Within a lock holder the
//! event append precedes the snapshot rewrite, so a reader that bypasses
//! the lock may observe an event whose effect is not yet in the snapshot.

use orc_core::BoardEvent;
use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only event journal at `state/tasks.jsonl`.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single JSON line.
    pub fn append(&self, event: &BoardEvent) -> Result<(), JournalError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(event)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Read all events, skipping unparseable lines with a warning.
    pub fn read_all(&self) -> Result<Vec<BoardEvent>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<BoardEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(path = %self.path.display(), line = idx + 1, error = %e, "skipping corrupt journal line");
                }
            }
        }
        Ok(events)
    }

    /// Rewrite the journal with events deduplicated by `eventId`,
    /// preserving first-seen order. Returns the compacted event count.
    pub fn compact(&self) -> Result<usize, JournalError> {
        let events = self.read_all()?;
        let mut seen = std::collections::HashSet::new();
        let mut kept = Vec::new();
        for event in events {
            if seen.insert(event.event_id.clone()) {
                kept.push(event);
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            for event in &kept {
                let line = serde_json::to_string(event)?;
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(kept.len())
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
