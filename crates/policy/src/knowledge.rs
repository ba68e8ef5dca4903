// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only knowledge-hint provider.
//!
//! Looks up lessons/mistakes/patterns from configured source files and
//! returns at most `maxItems` hints. The adapter is soft-failing: any
//! degradation (timeout, unreadable source, readOnly misconfiguration)
//! skips hints without blocking dispatch.

use crate::merge::{as_bool, as_u64, merged_config};
use orc_storage::StateDir;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Instant;

pub const KNOWLEDGE_FEEDBACK_FILE: &str = "knowledge-feedback.json";

const MAX_HINT_ITEMS_LIMIT: u64 = 20;

/// Loaded knowledge-feedback configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeConfig {
    pub enabled: bool,
    pub read_only: bool,
    pub timeout_ms: u64,
    pub max_items: u64,
    pub source_candidates: Vec<String>,
}

impl KnowledgeConfig {
    /// Load `config/knowledge-feedback.json` (with `state/` override).
    pub fn load(dirs: &StateDir) -> Self {
        let merged = merged_config(
            dirs,
            KNOWLEDGE_FEEDBACK_FILE,
            json!({
                "enabled": false,
                "readOnly": true,
                "timeoutMs": 300,
                "maxItems": 3,
                "sourceCandidates": [
                    "state/knowledge-feedback.json",
                    "state/lessons-learned.json",
                ],
            }),
        );

        let source_candidates = match merged.get("sourceCandidates") {
            Some(Value::Array(items)) => {
                let mut out: Vec<String> = Vec::new();
                for item in items {
                    if let Some(path) = item.as_str() {
                        let path = path.trim().to_string();
                        if !path.is_empty() && !out.contains(&path) {
                            out.push(path);
                        }
                    }
                }
                if out.is_empty() {
                    default_sources()
                } else {
                    out
                }
            }
            _ => default_sources(),
        };

        Self {
            enabled: as_bool(merged.get("enabled"), false),
            read_only: as_bool(merged.get("readOnly"), true),
            timeout_ms: as_u64(merged.get("timeoutMs"), 300).max(50),
            max_items: as_u64(merged.get("maxItems"), 3)
                .max(1)
                .min(MAX_HINT_ITEMS_LIMIT),
            source_candidates,
        }
    }
}

fn default_sources() -> Vec<String> {
    vec![
        "state/knowledge-feedback.json".to_string(),
        "state/lessons-learned.json".to_string(),
    ]
}

/// Result of a hint lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeHints {
    pub enabled: bool,
    pub degraded: bool,
    pub degrade_reason: String,
    pub knowledge_tags: Vec<String>,
    pub hints: Vec<String>,
    pub source: String,
}

impl KnowledgeHints {
    fn disabled() -> Self {
        Self::default()
    }

    fn degraded(reason: impl Into<String>) -> Self {
        Self {
            enabled: true,
            degraded: true,
            degrade_reason: reason.into(),
            ..Self::default()
        }
    }
}

fn str_items(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn extract_hints(payload: &Value, max_items: usize) -> (Vec<String>, Vec<String>) {
    let mut hints: Vec<String> = Vec::new();
    let mut tags: Vec<String> = Vec::new();
    for tag in ["lessons", "mistakes", "patterns"] {
        let items = str_items(payload.get(tag));
        let mut used = false;
        for item in items {
            if hints.contains(&item) {
                continue;
            }
            hints.push(item);
            used = true;
            if hints.len() >= max_items {
                break;
            }
        }
        if used {
            tags.push(tag.to_string());
        }
        if hints.len() >= max_items {
            break;
        }
    }
    (hints, tags)
}

/// Fetch hints for a dispatch. Never blocks longer than the configured
/// timeout; degradation is reported, not raised.
pub fn fetch_knowledge_hints(dirs: &StateDir) -> KnowledgeHints {
    let conf = KnowledgeConfig::load(dirs);
    if !conf.enabled {
        return KnowledgeHints::disabled();
    }
    if !conf.read_only {
        return KnowledgeHints::degraded("knowledge adapter requires readOnly=true");
    }

    let start = Instant::now();
    let max_items = conf.max_items as usize;

    for candidate in &conf.source_candidates {
        if start.elapsed().as_millis() as u64 > conf.timeout_ms {
            return KnowledgeHints::degraded("knowledge adapter timeout");
        }
        let path = PathBuf::from(candidate);
        let path = if path.is_absolute() {
            path
        } else {
            dirs.root().join(candidate)
        };
        if !path.exists() {
            continue;
        }
        let loaded: Option<Value> = orc_storage::load_json(&path);
        let Some(loaded) = loaded else {
            return KnowledgeHints::degraded(format!(
                "failed to read knowledge source {}",
                path.display()
            ));
        };
        if !loaded.is_object() {
            continue;
        }
        let (hints, knowledge_tags) = extract_hints(&loaded, max_items);
        if !hints.is_empty() {
            return KnowledgeHints {
                enabled: true,
                degraded: false,
                degrade_reason: String::new(),
                knowledge_tags,
                hints,
                source: path.display().to_string(),
            };
        }
    }

    KnowledgeHints {
        enabled: true,
        ..KnowledgeHints::default()
    }
}

#[cfg(test)]
#[path = "knowledge_tests.rs"]
mod tests;
