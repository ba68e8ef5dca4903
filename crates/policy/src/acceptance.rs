// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Acceptance policy: evidence requirement plus verify commands, global and
//! per-role.

use crate::merge::{as_bool, as_u64, merged_config};
use indexmap::IndexMap;
use orc_storage::StateDir;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ACCEPTANCE_POLICY_FILE: &str = "acceptance-policy.json";

const DEFAULT_VERIFY_TIMEOUT_SEC: u64 = 10;

/// One verify command. Accepts a bare string (`"make check"`) or an object
/// with explicit expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCommand {
    pub cmd: String,
    pub expect_exit_code: i32,
    pub timeout_sec: u64,
}

impl VerifyCommand {
    fn from_value(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(s) => {
                let cmd = s.trim().to_string();
                if cmd.is_empty() {
                    return None;
                }
                Some(Self {
                    cmd,
                    expect_exit_code: 0,
                    timeout_sec: DEFAULT_VERIFY_TIMEOUT_SEC,
                })
            }
            Value::Object(map) => {
                let cmd = map.get("cmd").and_then(Value::as_str).unwrap_or("").trim().to_string();
                if cmd.is_empty() {
                    return None;
                }
                let expect_exit_code = map
                    .get("expectExitCode")
                    .and_then(Value::as_i64)
                    .unwrap_or(0) as i32;
                let timeout_sec =
                    as_u64(map.get("timeoutSec"), DEFAULT_VERIFY_TIMEOUT_SEC).max(1);
                Some(Self {
                    cmd,
                    expect_exit_code,
                    timeout_sec,
                })
            }
            _ => None,
        }
    }
}

/// Acceptance rules for one scope (global or a role).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceRules {
    pub require_evidence: bool,
    pub verify_commands: Vec<VerifyCommand>,
}

/// The loaded acceptance policy.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptancePolicy {
    pub global: AcceptanceRules,
    pub roles: IndexMap<String, AcceptanceRules>,
}

fn default_policy_json() -> Value {
    json!({
        "global": {"requireEvidence": true, "verifyCommands": []},
        "roles": {},
    })
}

fn normalize_commands(raw: Option<&Value>) -> Vec<VerifyCommand> {
    match raw {
        Some(Value::Array(items)) => items.iter().filter_map(VerifyCommand::from_value).collect(),
        _ => Vec::new(),
    }
}

impl AcceptancePolicy {
    /// Load `config/acceptance-policy.json` (with `state/` override) over
    /// the built-in defaults. Never fails.
    pub fn load(dirs: &StateDir) -> Self {
        let merged = merged_config(dirs, ACCEPTANCE_POLICY_FILE, default_policy_json());

        let global_raw = merged.get("global").cloned().unwrap_or(Value::Null);
        let global = AcceptanceRules {
            require_evidence: as_bool(global_raw.get("requireEvidence"), true),
            verify_commands: normalize_commands(global_raw.get("verifyCommands")),
        };

        let mut roles = IndexMap::new();
        if let Some(Value::Object(map)) = merged.get("roles") {
            for (role, conf) in map {
                let key = role.trim().to_lowercase();
                if key.is_empty() || !conf.is_object() {
                    continue;
                }
                roles.insert(
                    key,
                    AcceptanceRules {
                        require_evidence: as_bool(
                            conf.get("requireEvidence"),
                            global.require_evidence,
                        ),
                        verify_commands: normalize_commands(conf.get("verifyCommands")),
                    },
                );
            }
        }

        Self { global, roles }
    }

    /// Whether hard evidence is required for this role.
    pub fn require_evidence(&self, role: &str) -> bool {
        let key = role.trim().to_lowercase();
        self.roles
            .get(&key)
            .map(|r| r.require_evidence)
            .unwrap_or(self.global.require_evidence)
    }

    /// Verify commands to run for this role: role-scoped first, then global.
    pub fn verify_commands(&self, role: &str) -> Vec<VerifyCommand> {
        let key = role.trim().to_lowercase();
        let mut out = Vec::new();
        if let Some(rules) = self.roles.get(&key) {
            out.extend(rules.verify_commands.iter().cloned());
        }
        out.extend(self.global.verify_commands.iter().cloned());
        out
    }
}

#[cfg(test)]
#[path = "acceptance_tests.rs"]
mod tests;
