// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery policy: assignee chain plus per-reason attempt/cooldown caps.

use crate::merge::{as_u64, merged_config};
use orc_storage::StateDir;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const RECOVERY_POLICY_FILE: &str = "recovery-policy.json";

/// Failure reason codes that trigger the recovery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    SpawnFailed,
    IncompleteOutput,
    BlockedSignal,
}

impl RecoveryReason {
    pub const ALL: [RecoveryReason; 3] = [
        RecoveryReason::SpawnFailed,
        RecoveryReason::IncompleteOutput,
        RecoveryReason::BlockedSignal,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "spawn_failed" => Some(RecoveryReason::SpawnFailed),
            "incomplete_output" => Some(RecoveryReason::IncompleteOutput),
            "blocked_signal" => Some(RecoveryReason::BlockedSignal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryReason::SpawnFailed => "spawn_failed",
            RecoveryReason::IncompleteOutput => "incomplete_output",
            RecoveryReason::BlockedSignal => "blocked_signal",
        }
    }
}

/// Attempt/cooldown limits for one reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonPolicy {
    pub max_attempts: u64,
    pub cooldown_sec: u64,
}

/// The loaded, normalized recovery policy. The chain is always terminated
/// with `human`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPolicy {
    pub recovery_chain: Vec<String>,
    pub default: ReasonPolicy,
    pub reason_policies: BTreeMap<RecoveryReason, ReasonPolicy>,
}

fn default_policy_json() -> Value {
    json!({
        "recoveryChain": ["coder", "debugger", "invest-analyst", "human"],
        "default": {"maxAttempts": 2, "cooldownSec": 180},
        "reasonPolicies": {
            "spawn_failed": {"maxAttempts": 2, "cooldownSec": 180},
            "incomplete_output": {"maxAttempts": 2, "cooldownSec": 120},
            "blocked_signal": {"maxAttempts": 2, "cooldownSec": 180},
        },
    })
}

/// Lowercase, dedupe, and guarantee the `human` terminator.
pub fn normalize_chain(raw: Option<&Value>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(Value::Array(items)) = raw {
        for item in items {
            let role = match item {
                Value::String(s) => s.trim().to_lowercase(),
                _ => continue,
            };
            if !role.is_empty() && !out.contains(&role) {
                out.push(role);
            }
        }
    }
    if !out.iter().any(|r| r == "human") {
        out.push("human".to_string());
    }
    out
}

impl RecoveryPolicy {
    /// Load `config/recovery-policy.json` (with `state/` override) over the
    /// built-in defaults. Never fails.
    pub fn load(dirs: &StateDir) -> Self {
        let merged = merged_config(dirs, RECOVERY_POLICY_FILE, default_policy_json());

        let recovery_chain = normalize_chain(merged.get("recoveryChain"));
        let default_raw = merged.get("default").cloned().unwrap_or(Value::Null);
        let default = ReasonPolicy {
            max_attempts: as_u64(default_raw.get("maxAttempts"), 2).max(1),
            cooldown_sec: as_u64(default_raw.get("cooldownSec"), 180),
        };

        let reasons_raw = merged.get("reasonPolicies").cloned().unwrap_or(Value::Null);
        let mut reason_policies = BTreeMap::new();
        for reason in RecoveryReason::ALL {
            let raw = reasons_raw.get(reason.as_str()).cloned().unwrap_or(Value::Null);
            reason_policies.insert(
                reason,
                ReasonPolicy {
                    max_attempts: as_u64(raw.get("maxAttempts"), default.max_attempts).max(1),
                    cooldown_sec: as_u64(raw.get("cooldownSec"), default.cooldown_sec),
                },
            );
        }

        Self {
            recovery_chain,
            default,
            reason_policies,
        }
    }

    pub fn policy_for(&self, reason: RecoveryReason) -> ReasonPolicy {
        self.reason_policies
            .get(&reason)
            .copied()
            .unwrap_or(self.default)
    }

    /// The element strictly after `current` in the chain; the head when
    /// `current` is absent; the tail (`human`) when `current` is last.
    pub fn next_assignee_for(&self, current: &str) -> String {
        let current = current.trim().to_lowercase();
        let chain = &self.recovery_chain;
        match chain.iter().position(|role| role == &current) {
            Some(idx) if idx + 1 < chain.len() => chain[idx + 1].clone(),
            Some(_) => chain
                .last()
                .cloned()
                .unwrap_or_else(|| "human".to_string()),
            None => chain
                .first()
                .cloned()
                .unwrap_or_else(|| "human".to_string()),
        }
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
