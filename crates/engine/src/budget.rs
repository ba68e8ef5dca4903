// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Budget tracking: per `(taskId, agent)` usage counters checked before
//! and after each dispatch.
//!
//! Precheck blocks when `usage >= limit` on any axis; postcheck blocks
//! when `usage > limit` after accumulating the attempt. Counters only grow.

use orc_core::{time_fmt, Clock};
use orc_policy::{BudgetLimits, BudgetPolicy, DegradeAction};
use orc_storage::{load_json, save_json_pretty, StateDir};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

/// Persisted usage for one `(taskId, agent)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetEntry {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub token_usage: u64,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub retry_count: u64,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BudgetState {
    #[serde(default)]
    entries: BTreeMap<String, BudgetEntry>,
    #[serde(default)]
    updated_at: String,
}

/// Usage and remaining headroom, embedded for observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub task_id: String,
    pub agent: String,
    pub limits: SnapshotLimits,
    pub usage: SnapshotUsage,
    pub remaining: SnapshotRemaining,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLimits {
    pub max_task_tokens: u64,
    pub max_task_wall_time_sec: u64,
    pub max_task_retries: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotUsage {
    pub token_usage: u64,
    pub elapsed_ms: u64,
    pub retry_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRemaining {
    pub tokens: i64,
    pub wall_time_ms: i64,
    pub retries: i64,
}

/// Budget verdict for one dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetDecision {
    pub allowed: bool,
    pub reason_code: String,
    pub exceeded_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrade_action: Option<DegradeAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_assignee: Option<String>,
    pub budget_snapshot: BudgetSnapshot,
}

/// Budget subsystem bound to one state root.
#[derive(Clone)]
pub struct BudgetTracker {
    dirs: StateDir,
    clock: Arc<dyn Clock>,
}

fn entry_key(task_id: &str, agent: &str) -> String {
    format!("{}|{}", task_id.trim(), agent.trim().to_lowercase())
}

fn exceeded_keys(limits: &BudgetLimits, usage: &BudgetEntry, strict: bool) -> Vec<String> {
    let over = |value: u64, limit: u64| -> bool {
        if strict {
            value > limit
        } else {
            value >= limit
        }
    };
    let mut keys = Vec::new();
    if over(usage.token_usage, limits.max_task_tokens) {
        keys.push("maxTaskTokens".to_string());
    }
    if over(usage.elapsed_ms, limits.max_task_wall_time_ms()) {
        keys.push("maxTaskWallTimeSec".to_string());
    }
    if over(usage.retry_count, limits.max_task_retries) {
        keys.push("maxTaskRetries".to_string());
    }
    keys
}

fn snapshot(task_id: &str, agent: &str, limits: &BudgetLimits, usage: &BudgetEntry) -> BudgetSnapshot {
    BudgetSnapshot {
        task_id: task_id.trim().to_string(),
        agent: agent.trim().to_lowercase(),
        limits: SnapshotLimits {
            max_task_tokens: limits.max_task_tokens,
            max_task_wall_time_sec: limits.max_task_wall_time_sec,
            max_task_retries: limits.max_task_retries,
        },
        usage: SnapshotUsage {
            token_usage: usage.token_usage,
            elapsed_ms: usage.elapsed_ms,
            retry_count: usage.retry_count,
        },
        remaining: SnapshotRemaining {
            tokens: limits.max_task_tokens as i64 - usage.token_usage as i64,
            wall_time_ms: limits.max_task_wall_time_ms() as i64 - usage.elapsed_ms as i64,
            retries: limits.max_task_retries as i64 - usage.retry_count as i64,
        },
    }
}

fn decision(
    task_id: &str,
    agent: &str,
    limits: &BudgetLimits,
    usage: &BudgetEntry,
    exceeded: Vec<String>,
) -> BudgetDecision {
    let allowed = exceeded.is_empty();
    BudgetDecision {
        allowed,
        reason_code: if allowed {
            String::new()
        } else {
            "budget_exceeded".to_string()
        },
        exceeded_keys: exceeded,
        degrade_action: if allowed { None } else { Some(limits.on_exceeded) },
        next_assignee: if allowed {
            None
        } else {
            Some("human".to_string())
        },
        budget_snapshot: snapshot(task_id, agent, limits, usage),
    }
}

impl BudgetTracker {
    pub fn new(dirs: StateDir, clock: Arc<dyn Clock>) -> Self {
        Self { dirs, clock }
    }

    fn load_state(&self) -> BudgetState {
        load_json(&self.dirs.budget_state_path()).unwrap_or_default()
    }

    fn usage_for(&self, task_id: &str, agent: &str) -> BudgetEntry {
        self.load_state()
            .entries
            .get(&entry_key(task_id, agent))
            .cloned()
            .unwrap_or_default()
    }

    /// Check limits before a worker spawn. Exceeded at `usage >= limit`.
    pub fn precheck(&self, task_id: &str, agent: &str) -> BudgetDecision {
        let policy = BudgetPolicy::load(&self.dirs);
        let limits = policy.limits_for(agent);
        let usage = self.usage_for(task_id, agent);
        let exceeded = exceeded_keys(limits, &usage, false);
        decision(task_id, agent, limits, &usage, exceeded)
    }

    /// Accumulate one attempt's usage and re-check. Exceeded at
    /// `usage > limit`.
    pub fn record_and_check(
        &self,
        task_id: &str,
        agent: &str,
        token_usage: u64,
        elapsed_ms: u64,
        retry_increment: u64,
    ) -> io::Result<BudgetDecision> {
        let policy = BudgetPolicy::load(&self.dirs);
        let limits = policy.limits_for(agent);

        let mut state = self.load_state();
        let key = entry_key(task_id, agent);
        let entry = state.entries.entry(key).or_default();
        entry.task_id = task_id.trim().to_string();
        entry.agent = agent.trim().to_lowercase();
        entry.token_usage = entry.token_usage.saturating_add(token_usage);
        entry.elapsed_ms = entry.elapsed_ms.saturating_add(elapsed_ms);
        entry.retry_count = entry.retry_count.saturating_add(retry_increment);
        entry.updated_at = time_fmt::iso(self.clock.now());
        let usage = entry.clone();

        state.updated_at = time_fmt::iso(self.clock.now());
        save_json_pretty(&self.dirs.budget_state_path(), &state)?;

        let exceeded = exceeded_keys(limits, &usage, true);
        Ok(decision(task_id, agent, limits, &usage, exceeded))
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
