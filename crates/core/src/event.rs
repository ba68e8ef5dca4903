// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Board events - the append-only record of every mutation.
//!
//! Events are the source of truth; the snapshot is a derived cache that can
//! be rebuilt by replaying the journal.

use serde::{Deserialize, Serialize};

/// Kind of a board mutation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    TaskClaimed,
    TaskDone,
    TaskBlocked,
    DiagTaskCreated,
}

/// Protocol message tags carried on events for easy filtering/search.
pub mod message_tag {
    pub const TASK: &str = "[TASK]";
    pub const CLAIM: &str = "[CLAIM]";
    pub const DONE: &str = "[DONE]";
    pub const BLOCKED: &str = "[BLOCKED]";
    pub const REVIEW: &str = "[REVIEW]";
    pub const DIAG: &str = "[DIAG]";
}

/// One journaled board event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardEvent {
    pub event_id: String,
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message_type: String,
    pub actor: String,
    pub at: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl BoardEvent {
    pub fn new(
        event_id: impl Into<String>,
        task_id: impl Into<String>,
        kind: EventKind,
        message_type: impl Into<String>,
        actor: impl Into<String>,
        at: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            task_id: task_id.into(),
            kind,
            message_type: message_type.into(),
            actor: actor.into(),
            at: at.into(),
            payload,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
