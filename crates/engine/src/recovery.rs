// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery loop: advances an assignee chain on qualifying failure reason
//! codes, with per-reason attempt caps and cooldowns.

use orc_core::{time_fmt, Clock};
use orc_policy::{RecoveryPolicy, RecoveryReason};
use orc_storage::{load_json, save_json_pretty, StateDir};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

/// Persisted recovery entry, keyed by `taskId|reason`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryEntry {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub reason_code: String,
    #[serde(default)]
    pub attempt: u64,
    #[serde(default)]
    pub next_assignee: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub recovery_state: String,
    #[serde(default)]
    pub cooldown_until_ts: i64,
    #[serde(default)]
    pub cooldown_until: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecoveryState {
    #[serde(default)]
    entries: BTreeMap<String, RecoveryEntry>,
    #[serde(default)]
    updated_at: String,
}

/// Decision for one (taskId, reason) failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryDecision {
    pub reason_code: String,
    pub attempt: u64,
    pub next_assignee: String,
    pub action: String,
    pub recovery_state: String,
    pub cooldown_active: bool,
    pub cooldown_until_ts: i64,
    pub cooldown_until: String,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u64>,
}

/// The recovery subsystem bound to one state root.
#[derive(Clone)]
pub struct RecoveryLoop {
    dirs: StateDir,
    clock: Arc<dyn Clock>,
}

fn entry_key(task_id: &str, reason: RecoveryReason) -> String {
    format!("{}|{}", task_id.trim(), reason.as_str())
}

impl RecoveryLoop {
    pub fn new(dirs: StateDir, clock: Arc<dyn Clock>) -> Self {
        Self { dirs, clock }
    }

    fn load_state(&self) -> RecoveryState {
        load_json(&self.dirs.recovery_state_path()).unwrap_or_default()
    }

    /// Decide the next step for a failed (taskId, reason, currentAssignee).
    ///
    /// Reason codes outside the recovery set escalate to human without
    /// consuming the chain. An active cooldown returns the previous
    /// decision unchanged.
    pub fn decide(
        &self,
        task_id: &str,
        current_assignee: &str,
        reason_code: &str,
    ) -> io::Result<RecoveryDecision> {
        let Some(reason) = RecoveryReason::parse(reason_code) else {
            return Ok(RecoveryDecision {
                reason_code: reason_code.trim().to_lowercase(),
                attempt: 0,
                next_assignee: "human".to_string(),
                action: "escalate".to_string(),
                recovery_state: "escalated_to_human".to_string(),
                cooldown_active: false,
                cooldown_until_ts: 0,
                cooldown_until: time_fmt::iso_from_ts(0),
                recoverable: false,
                max_attempts: None,
            });
        };

        let now_ts = self.clock.now_ts();
        let policy = RecoveryPolicy::load(&self.dirs);
        let reason_conf = policy.policy_for(reason);

        let mut state = self.load_state();
        let key = entry_key(task_id, reason);
        let prev = state.entries.get(&key).cloned().unwrap_or_default();

        if prev.cooldown_until_ts > 0 && now_ts < prev.cooldown_until_ts {
            let next_assignee = if prev.next_assignee.is_empty() {
                policy.next_assignee_for(current_assignee)
            } else {
                prev.next_assignee.clone()
            };
            let action = match prev.action.as_str() {
                "retry" | "escalate" | "human" => prev.action.clone(),
                _ if next_assignee == "human" => "human".to_string(),
                _ => "retry".to_string(),
            };
            let recovery_state = if prev.recovery_state.is_empty() {
                if action == "human" {
                    "human_handoff".to_string()
                } else {
                    "recovery_scheduled".to_string()
                }
            } else {
                prev.recovery_state.clone()
            };
            let recoverable = action == "retry" || action == "human";
            return Ok(RecoveryDecision {
                reason_code: reason.as_str().to_string(),
                attempt: prev.attempt,
                next_assignee,
                action,
                recovery_state,
                cooldown_active: true,
                cooldown_until_ts: prev.cooldown_until_ts,
                cooldown_until: time_fmt::iso_from_ts(prev.cooldown_until_ts),
                recoverable,
                max_attempts: Some(reason_conf.max_attempts),
            });
        }

        let attempt = prev.attempt + 1;
        let mut next_assignee = policy.next_assignee_for(current_assignee);
        let (action, recovery_state) = if attempt > reason_conf.max_attempts {
            next_assignee = "human".to_string();
            ("escalate", "escalated_to_human")
        } else if next_assignee == "human" {
            ("human", "human_handoff")
        } else {
            ("retry", "recovery_scheduled")
        };

        let cooldown_until_ts = if reason_conf.cooldown_sec > 0 {
            now_ts + reason_conf.cooldown_sec as i64
        } else {
            0
        };
        let entry = RecoveryEntry {
            task_id: task_id.trim().to_string(),
            reason_code: reason.as_str().to_string(),
            attempt,
            next_assignee: next_assignee.clone(),
            action: action.to_string(),
            recovery_state: recovery_state.to_string(),
            cooldown_until_ts,
            cooldown_until: time_fmt::iso_from_ts(cooldown_until_ts),
            updated_at: time_fmt::iso(self.clock.now()),
        };
        state.entries.insert(key, entry);
        state.updated_at = time_fmt::iso(self.clock.now());
        save_json_pretty(&self.dirs.recovery_state_path(), &state)?;

        Ok(RecoveryDecision {
            reason_code: reason.as_str().to_string(),
            attempt,
            next_assignee,
            action: action.to_string(),
            recovery_state: recovery_state.to_string(),
            cooldown_active: false,
            cooldown_until_ts,
            cooldown_until: time_fmt::iso_from_ts(cooldown_until_ts),
            recoverable: action == "retry" || action == "human",
            max_attempts: Some(reason_conf.max_attempts),
        })
    }

    /// The freshest live cooldown for a task, across reason codes.
    pub fn active_cooldown(&self, task_id: &str) -> Option<RecoveryDecision> {
        let now_ts = self.clock.now_ts();
        let state = self.load_state();
        let mut best: Option<RecoveryDecision> = None;

        for (key, entry) in &state.entries {
            if entry.task_id != task_id.trim() {
                continue;
            }
            if entry.cooldown_until_ts <= now_ts {
                continue;
            }
            let reason = RecoveryReason::parse(&entry.reason_code).or_else(|| {
                key.split_once('|')
                    .and_then(|(_, reason)| RecoveryReason::parse(reason))
            });
            let Some(reason) = reason else { continue };

            let next_assignee = if entry.next_assignee.is_empty() {
                "human".to_string()
            } else {
                entry.next_assignee.clone()
            };
            let action = match entry.action.as_str() {
                "retry" | "escalate" | "human" => entry.action.clone(),
                _ if next_assignee == "human" => "human".to_string(),
                _ => "retry".to_string(),
            };
            let recovery_state = if entry.recovery_state.is_empty() {
                if action == "human" {
                    "human_handoff".to_string()
                } else {
                    "recovery_scheduled".to_string()
                }
            } else {
                entry.recovery_state.clone()
            };
            let candidate = RecoveryDecision {
                reason_code: reason.as_str().to_string(),
                attempt: entry.attempt,
                next_assignee,
                action: action.clone(),
                recovery_state,
                cooldown_active: true,
                cooldown_until_ts: entry.cooldown_until_ts,
                cooldown_until: time_fmt::iso_from_ts(entry.cooldown_until_ts),
                recoverable: action == "retry" || action == "human",
                max_attempts: None,
            };
            let fresher = best
                .as_ref()
                .map(|b| entry.cooldown_until_ts > b.cooldown_until_ts)
                .unwrap_or(true);
            if fresher {
                best = Some(candidate);
            }
        }
        best
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
