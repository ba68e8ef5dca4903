// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Role strategy library with stable rollout gating.
//!
//! A strategy is a prompt block keyed by task kind and agent. Rollout
//! gating derives `bucket = sha256(taskId)[0:8] as u32 mod 100`; the
//! strategy is active iff `bucket < rolloutPercent`, giving a stable,
//! portable A/B split.

use crate::merge::{as_bool, as_text, as_u64};
use indexmap::IndexMap;
use orc_storage::StateDir;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const ROLE_STRATEGY_FILE: &str = "role-strategies.json";

/// One strategy template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StrategyEntry {
    pub strategy_id: String,
    pub content: String,
    pub enabled: bool,
    pub rollout_percent: u64,
    #[serde(default)]
    pub source: String,
}

/// Strategy templates keyed by task kind and agent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyLibrary {
    pub task_kinds: IndexMap<String, IndexMap<String, StrategyEntry>>,
    pub agents: IndexMap<String, StrategyEntry>,
    pub default: Option<StrategyEntry>,
}

/// A strategy resolved for a concrete (agent, task kind, task id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStrategy {
    pub strategy_id: String,
    pub content: String,
    pub source: String,
    pub matched_by: &'static str,
    pub enabled: bool,
}

impl ResolvedStrategy {
    fn none() -> Self {
        Self {
            strategy_id: String::new(),
            content: String::new(),
            source: String::new(),
            matched_by: "none",
            enabled: false,
        }
    }
}

fn normalize_entry(raw: &Value, fallback_id: &str, source: &str) -> StrategyEntry {
    let strategy_id = {
        let id = as_text(raw.get("strategyId"));
        let id = if id.is_empty() { as_text(raw.get("id")) } else { id };
        if id.is_empty() {
            fallback_id.to_string()
        } else {
            id
        }
    };
    let content = {
        let c = as_text(raw.get("content"));
        if c.is_empty() {
            as_text(raw.get("prompt"))
        } else {
            c
        }
    };
    StrategyEntry {
        strategy_id,
        content,
        enabled: as_bool(raw.get("enabled"), true),
        rollout_percent: as_u64(raw.get("rolloutPercent"), 100).min(100),
        source: source.to_string(),
    }
}

/// Stable rollout bucket for a task id.
pub fn rollout_bucket(task_id: &str) -> u64 {
    let digest = Sha256::digest(task_id.as_bytes());
    let hex = format!("{:x}", digest);
    u64::from_str_radix(&hex[..8], 16).unwrap_or(0) % 100
}

fn rollout_hit(task_id: &str, rollout_percent: u64) -> bool {
    if rollout_percent == 0 {
        return false;
    }
    if rollout_percent >= 100 {
        return true;
    }
    rollout_bucket(task_id) < rollout_percent
}

impl StrategyLibrary {
    /// Load `config/role-strategies.json` (with `state/` override).
    pub fn load(dirs: &StateDir) -> Self {
        let mut out = StrategyLibrary::default();
        for path in dirs.config_candidates(ROLE_STRATEGY_FILE) {
            let Some(loaded) = orc_storage::load_json::<Value>(&path) else {
                continue;
            };
            if !loaded.is_object() {
                continue;
            }
            let source = path.display().to_string();
            out.merge_from(&loaded, &source);
        }
        out
    }

    fn merge_from(&mut self, loaded: &Value, source: &str) {
        if let Some(Value::Object(task_kinds)) = loaded.get("taskKinds") {
            for (kind, block) in task_kinds {
                let kind_key = kind.trim().to_lowercase();
                if kind_key.is_empty() {
                    continue;
                }
                let slot = self.task_kinds.entry(kind_key.clone()).or_default();
                if let Value::Object(block_map) = block {
                    // Agent entries may sit under "agents" or inline
                    if let Some(Value::Object(agents)) = block_map.get("agents") {
                        for (agent, entry) in agents {
                            let agent_key = agent.trim().to_lowercase();
                            if agent_key.is_empty() {
                                continue;
                            }
                            let fallback = format!("{kind_key}:{agent_key}");
                            slot.insert(agent_key, normalize_entry(entry, &fallback, source));
                        }
                    }
                    for (agent, entry) in block_map {
                        let agent_key = agent.trim().to_lowercase();
                        if agent_key.is_empty() || agent_key == "agents" {
                            continue;
                        }
                        let fallback = format!("{kind_key}:{agent_key}");
                        slot.insert(agent_key, normalize_entry(entry, &fallback, source));
                    }
                }
            }
        }

        if let Some(Value::Object(agents)) = loaded.get("agents") {
            for (agent, conf) in agents {
                let agent_key = agent.trim().to_lowercase();
                if agent_key.is_empty() {
                    continue;
                }
                let entry_raw = match conf {
                    Value::Object(map) if map.contains_key("default") => {
                        map.get("default").cloned().unwrap_or(Value::Null)
                    }
                    other => other.clone(),
                };
                let fallback = format!("{agent_key}:default");
                self.agents
                    .insert(agent_key, normalize_entry(&entry_raw, &fallback, source));
            }
        }

        if let Some(default) = loaded.get("default") {
            self.default = Some(normalize_entry(default, "global:default", source));
        }
    }

    /// Resolve the strategy for (agent, task kind), gating by rollout on the
    /// task id. Match precedence: taskKind+agent, taskKind default, agent
    /// default, global default.
    pub fn resolve(&self, agent: &str, task_kind: &str, task_id: &str) -> ResolvedStrategy {
        let agent_key = agent.trim().to_lowercase();
        let kind_key = task_kind.trim().to_lowercase();

        let kind_block = self.task_kinds.get(&kind_key);
        let candidates: [(Option<&StrategyEntry>, &'static str); 4] = [
            (kind_block.and_then(|b| b.get(&agent_key)), "taskKind+agent"),
            (kind_block.and_then(|b| b.get("default")), "taskKind default"),
            (self.agents.get(&agent_key), "agent default"),
            (self.default.as_ref(), "global default"),
        ];

        for (entry, matched_by) in candidates {
            let Some(entry) = entry else { continue };
            if entry.strategy_id.is_empty() && entry.content.is_empty() {
                continue;
            }
            let enabled = entry.enabled && rollout_hit(task_id, entry.rollout_percent);
            return ResolvedStrategy {
                strategy_id: entry.strategy_id.clone(),
                content: entry.content.clone(),
                source: entry.source.clone(),
                matched_by,
                enabled,
            };
        }
        ResolvedStrategy::none()
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
