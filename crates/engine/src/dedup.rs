// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound message dedup registry.
//!
//! A second identical inbound payload with the same message id must not
//! cause a second board mutation. The registry is a capacity-capped FIFO of
//! seen ids persisted at `state/inbound.seen.json`.

use orc_storage::{load_json, save_json_pretty, StateDir};
use serde::{Deserialize, Serialize};
use std::io;

/// Oldest ids are evicted past this many entries.
const SEEN_CAPACITY: usize = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeenState {
    #[serde(default)]
    seen: Vec<String>,
    #[serde(default)]
    updated_at: String,
}

/// Seen-id registry for inbound chat payloads.
#[derive(Clone)]
pub struct InboundDedup {
    dirs: StateDir,
}

impl InboundDedup {
    pub fn new(dirs: StateDir) -> Self {
        Self { dirs }
    }

    /// Record `message_id` if fresh. Returns `true` for fresh ids and
    /// `false` for duplicates.
    pub fn check_and_record(&self, message_id: &str, now_iso: &str) -> io::Result<bool> {
        let message_id = message_id.trim();
        if message_id.is_empty() {
            return Ok(true);
        }

        let path = self.dirs.inbound_seen_path();
        let mut state: SeenState = load_json(&path).unwrap_or_default();
        if state.seen.iter().any(|id| id == message_id) {
            return Ok(false);
        }

        state.seen.push(message_id.to_string());
        if state.seen.len() > SEEN_CAPACITY {
            let excess = state.seen.len() - SEEN_CAPACITY;
            state.seen.drain(..excess);
        }
        state.updated_at = now_iso.to_string();
        save_json_pretty(&path, &state)?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
