// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime policy: agent roster and orchestrator guardrails.

use crate::merge::{as_text, as_u64, merged_config};
use orc_storage::StateDir;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const RUNTIME_POLICY_FILE: &str = "runtime-policy.json";
pub const LEGACY_BUDGET_FILE: &str = "budget-policy.json";

/// Backoff growth mode between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    Fixed,
    Linear,
    Exponential,
}

impl BackoffMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "fixed" => Some(BackoffMode::Fixed),
            "linear" => Some(BackoffMode::Linear),
            "exponential" => Some(BackoffMode::Exponential),
            _ => None,
        }
    }
}

/// Retry backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    pub mode: BackoffMode,
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_pct: u64,
}

impl Backoff {
    /// Deterministic delay for the given 1-based attempt, before jitter.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        let raw = match self.mode {
            BackoffMode::Fixed => self.base_ms as f64,
            BackoffMode::Linear => self.base_ms as f64 * attempt as f64,
            BackoffMode::Exponential => {
                self.base_ms as f64 * self.multiplier.powi(attempt as i32 - 1)
            }
        };
        (raw as u64).min(self.max_ms)
    }
}

/// Retry policy for worker spawns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u64,
    pub backoff: Backoff,
}

/// One agent in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Budget guardrails mirrored from the budget policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guardrails {
    pub max_task_tokens: u64,
    pub max_task_wall_time_sec: u64,
    pub max_task_retries: u64,
}

/// The loaded runtime policy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimePolicy {
    pub agents: Vec<AgentSpec>,
    pub max_concurrent_spawns: u64,
    pub retry_policy: RetryPolicy,
    pub guardrails: Guardrails,
}

fn default_policy_json() -> Value {
    json!({
        "agents": [],
        "orchestrator": {
            "maxConcurrentSpawns": 3,
            "retryPolicy": {
                "maxAttempts": 2,
                "backoff": {
                    "mode": "exponential",
                    "baseMs": 500,
                    "maxMs": 8000,
                    "multiplier": 2.0,
                    "jitterPct": 20,
                },
            },
            "budgetPolicy": {
                "guardrails": {
                    "maxTaskTokens": 12000,
                    "maxTaskWallTimeSec": 1200,
                    "maxTaskRetries": 3,
                }
            },
        },
    })
}

fn normalize_agents(raw: Option<&Value>) -> Vec<AgentSpec> {
    let mut out: Vec<AgentSpec> = Vec::new();

    let rows: Vec<Value> = match raw {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| match value {
                Value::Object(inner) => {
                    let mut row = inner.clone();
                    row.entry("id".to_string()).or_insert(json!(key));
                    Value::Object(row)
                }
                other => json!({"id": key, "capabilities": other}),
            })
            .collect(),
        _ => Vec::new(),
    };

    for row in rows {
        let (id, capabilities) = match &row {
            Value::String(s) => (s.trim().to_string(), Vec::new()),
            Value::Object(map) => {
                let id = as_text(map.get("id"));
                let id = if id.is_empty() {
                    as_text(map.get("name"))
                } else {
                    id
                };
                let capabilities = match map.get("capabilities") {
                    Some(Value::Array(items)) => {
                        let mut caps: Vec<String> = Vec::new();
                        for item in items {
                            let cap = as_text(Some(item));
                            if !cap.is_empty() && !caps.contains(&cap) {
                                caps.push(cap);
                            }
                        }
                        caps
                    }
                    Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
                    _ => Vec::new(),
                };
                (id, capabilities)
            }
            _ => continue,
        };
        if id.is_empty() || out.iter().any(|a| a.id == id) {
            continue;
        }
        out.push(AgentSpec { id, capabilities });
    }
    out
}

fn normalize_backoff(raw: Option<&Value>) -> Backoff {
    let raw = raw.cloned().unwrap_or(Value::Null);
    let mode = raw
        .get("mode")
        .and_then(Value::as_str)
        .and_then(BackoffMode::parse)
        .unwrap_or(BackoffMode::Exponential);
    let base_ms = as_u64(raw.get("baseMs"), 500).max(1);
    let max_ms = as_u64(raw.get("maxMs"), 8_000).max(base_ms);
    let multiplier = raw
        .get("multiplier")
        .and_then(Value::as_f64)
        .unwrap_or(2.0)
        .max(1.0);
    let jitter_pct = as_u64(raw.get("jitterPct"), 20).min(100);
    Backoff {
        mode,
        base_ms,
        max_ms,
        multiplier,
        jitter_pct,
    }
}

/// Legacy guardrail fallback from the budget policy's global block.
fn legacy_guardrails(dirs: &StateDir) -> Value {
    let mut merged = Value::Object(serde_json::Map::new());
    for path in dirs.config_candidates(LEGACY_BUDGET_FILE) {
        if let Some(loaded) = orc_storage::load_json::<Value>(&path) {
            if loaded.is_object() {
                crate::merge::deep_merge(&mut merged, &loaded);
            }
        }
    }
    merged.get("global").cloned().unwrap_or(merged)
}

impl RuntimePolicy {
    /// Load `config/runtime-policy.json` (with `state/` override) over the
    /// built-in defaults. Missing guardrails fall back to the legacy budget
    /// policy's global block before the built-ins. Never fails.
    pub fn load(dirs: &StateDir) -> Self {
        let merged = merged_config(dirs, RUNTIME_POLICY_FILE, default_policy_json());
        let orchestrator = merged.get("orchestrator").cloned().unwrap_or(Value::Null);

        let retry_raw = orchestrator.get("retryPolicy").cloned().unwrap_or(Value::Null);
        let retry_policy = RetryPolicy {
            max_attempts: as_u64(retry_raw.get("maxAttempts"), 2).max(1),
            backoff: normalize_backoff(retry_raw.get("backoff")),
        };

        // Only guardrails the files actually wrote win over the legacy
        // budget fallback; the built-in defaults rank last.
        let files_only = merged_config(dirs, RUNTIME_POLICY_FILE, Value::Object(Default::default()));
        let explicit = files_only
            .get("orchestrator")
            .and_then(|o| o.get("budgetPolicy"))
            .and_then(|b| b.get("guardrails"))
            .cloned()
            .unwrap_or(Value::Null);
        let legacy = legacy_guardrails(dirs);
        let pick = |key: &str, default: u64| -> u64 {
            if explicit.get(key).is_some() {
                as_u64(explicit.get(key), default).max(1)
            } else if legacy.get(key).is_some() {
                as_u64(legacy.get(key), default).max(1)
            } else {
                default.max(1)
            }
        };
        let guardrails = Guardrails {
            max_task_tokens: pick("maxTaskTokens", 12_000),
            max_task_wall_time_sec: pick("maxTaskWallTimeSec", 1_200),
            max_task_retries: pick("maxTaskRetries", 3),
        };

        Self {
            agents: normalize_agents(merged.get("agents")),
            max_concurrent_spawns: as_u64(orchestrator.get("maxConcurrentSpawns"), 3).max(1),
            retry_policy,
            guardrails,
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
