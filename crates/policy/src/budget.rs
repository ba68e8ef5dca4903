// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Budget policy: per-agent token / wall-time / retry limits with a global
//! fallback and degrade actions.

use crate::merge::{as_u64, merged_config};
use indexmap::IndexMap;
use orc_storage::StateDir;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const BUDGET_POLICY_FILE: &str = "budget-policy.json";

/// What to do when a budget axis is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeAction {
    ReducedContext,
    ManualHandoff,
    StopRun,
}

impl DegradeAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "reduced_context" => Some(DegradeAction::ReducedContext),
            "manual_handoff" => Some(DegradeAction::ManualHandoff),
            "stop_run" => Some(DegradeAction::StopRun),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DegradeAction::ReducedContext => "reduced_context",
            DegradeAction::ManualHandoff => "manual_handoff",
            DegradeAction::StopRun => "stop_run",
        }
    }
}

/// Normalized limits for one agent (or the global fallback).
/// All limits are clamped to ≥ 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLimits {
    pub max_task_tokens: u64,
    pub max_task_wall_time_sec: u64,
    pub max_task_retries: u64,
    pub degrade_policy: Vec<DegradeAction>,
    pub on_exceeded: DegradeAction,
}

impl BudgetLimits {
    pub fn max_task_wall_time_ms(&self) -> u64 {
        self.max_task_wall_time_sec.saturating_mul(1000)
    }
}

/// The loaded, normalized budget policy.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetPolicy {
    pub global: BudgetLimits,
    pub agents: IndexMap<String, BudgetLimits>,
}

fn default_policy_json() -> Value {
    json!({
        "global": {
            "maxTaskTokens": 12000,
            "maxTaskWallTimeSec": 1200,
            "maxTaskRetries": 3,
            "degradePolicy": ["reduced_context", "manual_handoff", "stop_run"],
            "onExceeded": "manual_handoff",
        },
        "agents": {
            "coder": {
                "maxTaskTokens": 8000,
                "maxTaskWallTimeSec": 900,
                "maxTaskRetries": 2,
                "degradePolicy": ["reduced_context", "manual_handoff", "stop_run"],
                "onExceeded": "manual_handoff",
            }
        },
    })
}

fn normalize_degrade_policy(raw: Option<&Value>, fallback: &[DegradeAction]) -> Vec<DegradeAction> {
    let mut out: Vec<DegradeAction> = Vec::new();
    if let Some(Value::Array(items)) = raw {
        for item in items {
            if let Some(action) = item.as_str().and_then(DegradeAction::parse) {
                if !out.contains(&action) {
                    out.push(action);
                }
            }
        }
    }
    if !out.is_empty() {
        return out;
    }
    if !fallback.is_empty() {
        return fallback.to_vec();
    }
    vec![DegradeAction::ManualHandoff]
}

fn normalize_on_exceeded(raw: Option<&Value>, degrade_policy: &[DegradeAction]) -> DegradeAction {
    if let Some(action) = raw.and_then(Value::as_str).and_then(DegradeAction::parse) {
        return action;
    }
    degrade_policy
        .first()
        .copied()
        .unwrap_or(DegradeAction::ManualHandoff)
}

fn normalize_limits(raw: &Value, fallback: &BudgetLimits) -> BudgetLimits {
    let degrade_policy = normalize_degrade_policy(raw.get("degradePolicy"), &fallback.degrade_policy);
    let on_exceeded = normalize_on_exceeded(raw.get("onExceeded"), &degrade_policy);
    BudgetLimits {
        max_task_tokens: as_u64(raw.get("maxTaskTokens"), fallback.max_task_tokens).max(1),
        max_task_wall_time_sec: as_u64(raw.get("maxTaskWallTimeSec"), fallback.max_task_wall_time_sec)
            .max(1),
        max_task_retries: as_u64(raw.get("maxTaskRetries"), fallback.max_task_retries).max(1),
        degrade_policy,
        on_exceeded,
    }
}

fn builtin_global() -> BudgetLimits {
    BudgetLimits {
        max_task_tokens: 12_000,
        max_task_wall_time_sec: 1_200,
        max_task_retries: 3,
        degrade_policy: vec![
            DegradeAction::ReducedContext,
            DegradeAction::ManualHandoff,
            DegradeAction::StopRun,
        ],
        on_exceeded: DegradeAction::ManualHandoff,
    }
}

impl BudgetPolicy {
    /// Load `config/budget-policy.json` (with `state/` override) over the
    /// built-in defaults. Never fails.
    pub fn load(dirs: &StateDir) -> Self {
        let merged = merged_config(dirs, BUDGET_POLICY_FILE, default_policy_json());

        let global_raw = merged.get("global").cloned().unwrap_or(Value::Null);
        let global = normalize_limits(&global_raw, &builtin_global());

        let mut agents = IndexMap::new();
        if let Some(Value::Object(map)) = merged.get("agents") {
            for (agent, conf) in map {
                let key = agent.trim().to_lowercase();
                if key.is_empty() || !conf.is_object() {
                    continue;
                }
                agents.insert(key, normalize_limits(conf, &global));
            }
        }

        Self { global, agents }
    }

    /// Limits for an agent, with global fallback. Agent keys are lowercase.
    pub fn limits_for(&self, agent: &str) -> &BudgetLimits {
        let key = agent.trim().to_lowercase();
        self.agents.get(&key).unwrap_or(&self.global)
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
