// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and status state machine.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Status of a task on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Claimed,
    InProgress,
    Review,
    Done,
    Blocked,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Claimed => "claimed",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse a status string, tolerating case and surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "claimed" => Some(TaskStatus::Claimed),
            "in_progress" => Some(TaskStatus::InProgress),
            "review" => Some(TaskStatus::Review),
            "done" => Some(TaskStatus::Done),
            "blocked" => Some(TaskStatus::Blocked),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Check whether `from -> to` is a legal board transition.
///
/// Self-edges are always permitted as no-ops. `done` is terminal.
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    if from == to {
        return true;
    }
    match from {
        Pending => matches!(to, Claimed | Blocked),
        Claimed => matches!(to, InProgress | Done | Blocked),
        InProgress => matches!(to, Review | Done | Blocked | Failed),
        Review => matches!(to, Done | InProgress | Blocked),
        Blocked => matches!(to, InProgress | Claimed),
        Failed => matches!(to, InProgress),
        Done => false,
    }
}

/// A task on the board. Serialized with camelCase keys in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub assignee_hint: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub blocked_reason: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub review: Option<String>,
    #[serde(default)]
    pub related_to: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default, deserialize_with = "de_refs")]
    pub depends_on: Vec<String>,
    #[serde(default, deserialize_with = "de_refs")]
    pub blocked_by: Vec<String>,
    #[serde(default, deserialize_with = "de_number")]
    pub priority: f64,
    #[serde(default, deserialize_with = "de_number")]
    pub impact: f64,
    #[serde(default)]
    pub history: Vec<String>,
}

impl Task {
    /// Create a fresh pending task.
    pub fn new(
        task_id: impl Into<String>,
        title: impl Into<String>,
        created_by: impl Into<String>,
        assignee_hint: impl Into<String>,
        now_iso: &str,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            title: title.into(),
            status: TaskStatus::Pending,
            owner: None,
            assignee_hint: Some(assignee_hint.into()),
            created_by: created_by.into(),
            created_at: now_iso.to_string(),
            updated_at: now_iso.to_string(),
            blocked_reason: None,
            result: None,
            review: None,
            related_to: None,
            project_id: None,
            depends_on: Vec::new(),
            blocked_by: Vec::new(),
            priority: 0.0,
            impact: 0.0,
            history: Vec::new(),
        }
    }
}

/// Uppercase, trimmed task id form used for lookups and abort scoping.
pub fn normalize_task_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Allocate the next `T-###` id given the current task id set.
pub fn next_task_id<'a, I: IntoIterator<Item = &'a String>>(ids: I) -> String {
    let mut max = 0u64;
    for id in ids {
        if let Some(num) = id.strip_prefix("T-").and_then(|s| s.parse::<u64>().ok()) {
            max = max.max(num);
        }
    }
    format!("T-{:03}", max + 1)
}

/// Coerce an arbitrary JSON value to a finite number, defaulting to 0.
///
/// Accepts numbers, booleans, and numeric strings. Non-finite values
/// (NaN/inf, however they arrived) sanitize to the default.
pub fn to_number(value: &serde_json::Value, default: f64) -> f64 {
    let fallback = if default.is_finite() { default } else { 0.0 };
    match value {
        serde_json::Value::Null => fallback,
        serde_json::Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        serde_json::Value::Number(n) => {
            let num = n.as_f64().unwrap_or(fallback);
            if num.is_finite() {
                num
            } else {
                fallback
            }
        }
        serde_json::Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                return fallback;
            }
            match text.parse::<f64>() {
                Ok(num) if num.is_finite() => num,
                _ => fallback,
            }
        }
        _ => fallback,
    }
}

/// Normalize a dependsOn/blockedBy value into a deduplicated ordered list.
///
/// Accepts arrays, single strings (CSV/space separated for backwards
/// compatibility), JSON-encoded arrays inside strings, and objects holding
/// the ref under `taskId`/`id`/`ref`/`value`.
pub fn normalize_refs(raw: &serde_json::Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_refs(raw, &mut out);
    dedupe_keep_order(out)
}

fn collect_refs(raw: &serde_json::Value, out: &mut Vec<String>) {
    match raw {
        serde_json::Value::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for key in ["taskId", "id", "ref", "value"] {
                if let Some(value) = map.get(key) {
                    collect_refs(value, out);
                }
            }
        }
        serde_json::Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                return;
            }
            if text.starts_with('[') && text.ends_with(']') {
                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(text) {
                    collect_refs(&parsed, out);
                    return;
                }
            }
            for token in text.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
                let token = token.trim();
                if !token.is_empty() {
                    out.push(token.to_string());
                }
            }
        }
        serde_json::Value::Null => {}
        other => {
            let text = other.to_string();
            if !text.trim().is_empty() {
                out.push(text.trim().to_string());
            }
        }
    }
}

fn dedupe_keep_order(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim().to_string();
        if item.is_empty() || out.iter().any(|x| x == &item) {
            continue;
        }
        out.push(item);
    }
    out
}

fn de_refs<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(normalize_refs(&value))
}

fn de_number<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    Ok(to_number(&value, 0.0))
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
