// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker reply schema: parsing and tolerant normalization.
//!
//! Workers are external processes; their stdout is untrusted. Parsing
//! accepts a bare JSON object or the largest `{…}` substring, and
//! normalization clamps unknowns and coerces types at the edge.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const SUMMARY_CLIP: usize = 500;
const EVIDENCE_CLIP: usize = 400;

/// Errors from loose JSON parsing of worker output.
#[derive(Debug, Error)]
pub enum ReplyParseError {
    #[error("empty output")]
    Empty,
    #[error("no json object found")]
    NoObject,
    #[error("invalid json object: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Worker-reported task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Done,
    Blocked,
    Progress,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Done => "done",
            ReplyStatus::Blocked => "blocked",
            ReplyStatus::Progress => "progress",
        }
    }
}

/// A changed file reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Change {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub summary: String,
}

/// Token/time usage extracted from a worker reply.
///
/// `usage` objects carry alias fields (`prompt_tokens`/`input_tokens` and
/// `completion_tokens`/`output_tokens` name the same axes); summing takes
/// the max per axis so aliases never double-count. An explicit
/// `metrics.tokenUsage` wins over the alias sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyUsage {
    pub token_usage: u64,
    pub elapsed_ms: u64,
}

/// A normalized worker reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReply {
    pub status: ReplyStatus,
    pub summary: String,
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub usage: ReplyUsage,
    /// Raw parsed object, kept for evidence normalization.
    #[serde(skip)]
    pub raw: Value,
}

impl WorkerReply {
    /// Synthetic reply used when worker output cannot be parsed.
    pub fn invalid_output() -> Self {
        Self {
            status: ReplyStatus::Blocked,
            summary: "output is empty or invalid".to_string(),
            changes: Vec::new(),
            evidence: Vec::new(),
            risks: Vec::new(),
            next_actions: Vec::new(),
            usage: ReplyUsage::default(),
            raw: Value::Null,
        }
    }

    /// Normalize a parsed worker object: coerce status, clip fields, backfill
    /// evidence from result/output/message when empty.
    pub fn normalize(raw: Value, fallback_text: &str) -> Self {
        let obj = raw.as_object().cloned().unwrap_or_default();

        let status_text = str_field(&obj, "status")
            .or_else(|| str_field(&obj, "taskStatus"))
            .unwrap_or_default()
            .to_lowercase();
        let status = match status_text.trim() {
            "done" => ReplyStatus::Done,
            "blocked" => ReplyStatus::Blocked,
            _ => ReplyStatus::Progress,
        };

        let mut summary = str_field(&obj, "summary")
            .or_else(|| str_field(&obj, "message"))
            .unwrap_or_default();
        if summary.trim().is_empty() {
            summary = fallback_text.to_string();
        }
        if summary.trim().is_empty() {
            summary = "executed".to_string();
        }

        let mut evidence = str_list(obj.get("evidence"));
        if evidence.is_empty() {
            for key in ["result", "output", "message"] {
                if let Some(text) = str_field(&obj, key) {
                    if !text.trim().is_empty() {
                        evidence.push(clip(&text, 180));
                        break;
                    }
                }
            }
        }
        let evidence = evidence
            .into_iter()
            .map(|e| clip(&e, EVIDENCE_CLIP))
            .collect();

        let changes = obj
            .get("changes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(Change {
                            path: str_field(map, "path")
                                .or_else(|| str_field(map, "file"))
                                .unwrap_or_default(),
                            summary: str_field(map, "summary")
                                .or_else(|| str_field(map, "change"))
                                .unwrap_or_default(),
                        }),
                        Value::String(s) => Some(Change {
                            path: s.trim().to_string(),
                            summary: String::new(),
                        }),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            status,
            summary: clip(&summary, SUMMARY_CLIP),
            changes,
            evidence,
            risks: str_list(obj.get("risks")),
            next_actions: str_list(obj.get("nextActions")),
            usage: extract_usage(&Value::Object(obj.clone())),
            raw: Value::Object(obj),
        }
    }
}

/// Sum token usage from a reply without double-counting alias fields.
pub fn extract_usage(raw: &Value) -> ReplyUsage {
    let metrics = raw.get("metrics");
    let explicit_tokens = metrics
        .and_then(|m| m.get("tokenUsage"))
        .and_then(Value::as_u64);
    let elapsed_ms = metrics
        .and_then(|m| m.get("elapsedMs"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let token_usage = match explicit_tokens {
        Some(n) => n,
        None => {
            let usage = raw.get("usage");
            let axis = |a: &str, b: &str| -> u64 {
                let get = |key: &str| {
                    usage
                        .and_then(|u| u.get(key))
                        .and_then(Value::as_u64)
                        .unwrap_or(0)
                };
                get(a).max(get(b))
            };
            axis("prompt_tokens", "input_tokens") + axis("completion_tokens", "output_tokens")
        }
    };

    ReplyUsage {
        token_usage,
        elapsed_ms,
    }
}

/// Parse a bare JSON object or the largest `{…}` substring.
pub fn parse_json_loose(text: &str) -> Result<Value, ReplyParseError> {
    let s = text.trim();
    if s.is_empty() {
        return Err(ReplyParseError::Empty);
    }
    if let Ok(value) = serde_json::from_str::<Value>(s) {
        return Ok(value);
    }
    let start = s.find('{');
    let end = s.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            Ok(serde_json::from_str::<Value>(&s[start..=end])?)
        }
        _ => Err(ReplyParseError::NoObject),
    }
}

/// Collapse whitespace to one line and truncate to `limit` characters.
pub fn clip(text: &str, limit: usize) -> String {
    let one_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if one_line.chars().count() <= limit {
        return one_line;
    }
    let mut out: String = one_line.chars().take(limit.saturating_sub(1)).collect();
    out.push_str("...");
    out
}

fn str_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn str_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;
