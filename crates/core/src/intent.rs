// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command router - turns one line of chat text into a board intent.
//!
//! Intents are matched case-insensitively; task ids are case-preserving.
//! An optional `@agent` prefix overrides the assignee for the intent.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static OVERRIDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*@([A-Za-z0-9_.-]+)\s+(.*)$").expect("constant regex pattern is valid")
});
static CREATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^create\s+task(?:\s+([A-Za-z0-9_-]+))?\s*:?\s*(.+)$")
        .expect("constant regex pattern is valid")
});
static CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^claim\s+task\s+([A-Za-z0-9_-]+)$").expect("constant regex pattern is valid")
});
static DONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^mark\s+done\s+([A-Za-z0-9_-]+)(?:\s*:?\s*(.*))?$")
        .expect("constant regex pattern is valid")
});
static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^block\s+task\s+([A-Za-z0-9_-]+)(?:\s*:?\s*(.*))?$")
        .expect("constant regex pattern is valid")
});
static ESCALATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^escalate\s+task\s+([A-Za-z0-9_-]+)(?:\s*:?\s*(.*))?$")
        .expect("constant regex pattern is valid")
});
static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^status(?:\s+([A-Za-z0-9_-]+))?$").expect("constant regex pattern is valid")
});
static SYNTHESIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^synthesize(?:\s+([A-Za-z0-9_-]+))?$")
        .expect("constant regex pattern is valid")
});

/// A routed board intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    CreateTask {
        #[serde(rename = "taskId", skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        title: String,
    },
    ClaimTask {
        #[serde(rename = "taskId")]
        task_id: String,
    },
    MarkDone {
        #[serde(rename = "taskId")]
        task_id: String,
        result: String,
    },
    BlockTask {
        #[serde(rename = "taskId")]
        task_id: String,
        reason: String,
    },
    EscalateTask {
        #[serde(rename = "taskId")]
        task_id: String,
        reason: String,
    },
    Status {
        #[serde(rename = "taskId", skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
    Synthesize {
        #[serde(rename = "taskId", skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
    Unknown {
        raw: String,
    },
}

impl Intent {
    /// Read-only intents never take the board lock.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Intent::Status { .. } | Intent::Synthesize { .. } | Intent::Unknown { .. }
        )
    }
}

/// A routed command: intent plus optional assignee override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(rename = "overrideAgent", skip_serializing_if = "Option::is_none")]
    pub override_agent: Option<String>,
    #[serde(flatten)]
    pub intent: Intent,
}

/// Strip a leading `@agent` override from the text.
fn parse_override(text: &str) -> (Option<String>, String) {
    if let Some(caps) = OVERRIDE_RE.captures(text) {
        let agent = caps[1].to_string();
        let rest = caps[2].trim().to_string();
        (Some(agent), rest)
    } else {
        (None, text.trim().to_string())
    }
}

fn group(caps: &regex::Captures<'_>, idx: usize) -> String {
    caps.get(idx).map(|m| m.as_str().trim().to_string()).unwrap_or_default()
}

fn opt_group(caps: &regex::Captures<'_>, idx: usize) -> Option<String> {
    caps.get(idx).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty())
}

/// Route one line of text into an intent.
pub fn parse_route(text: &str) -> Route {
    let (override_agent, body) = parse_override(text);

    let intent = if let Some(caps) = CREATE_RE.captures(&body) {
        Intent::CreateTask {
            task_id: opt_group(&caps, 1),
            title: group(&caps, 2),
        }
    } else if let Some(caps) = CLAIM_RE.captures(&body) {
        Intent::ClaimTask {
            task_id: group(&caps, 1),
        }
    } else if let Some(caps) = DONE_RE.captures(&body) {
        Intent::MarkDone {
            task_id: group(&caps, 1),
            result: group(&caps, 2),
        }
    } else if let Some(caps) = BLOCK_RE.captures(&body) {
        Intent::BlockTask {
            task_id: group(&caps, 1),
            reason: group(&caps, 2),
        }
    } else if let Some(caps) = ESCALATE_RE.captures(&body) {
        Intent::EscalateTask {
            task_id: group(&caps, 1),
            reason: group(&caps, 2),
        }
    } else if let Some(caps) = STATUS_RE.captures(&body) {
        Intent::Status {
            task_id: opt_group(&caps, 1),
        }
    } else if let Some(caps) = SYNTHESIZE_RE.captures(&body) {
        Intent::Synthesize {
            task_id: opt_group(&caps, 1),
        }
    } else {
        Intent::Unknown { raw: body }
    };

    Route {
        override_agent,
        intent,
    }
}

#[cfg(test)]
#[path = "intent_tests.rs"]
mod tests;
