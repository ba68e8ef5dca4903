// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Governance: pause/freeze/abort/approval control plane with a
//! hash-chained audit log.
//!
//! Three checkpoint flavors gate the core operations. Abort credits are
//! one-shot: the next checkpoint crossing on the targeted scope consumes
//! one and denies once. Every checkpoint crossing - allowed or denied -
//! appends an audit row.

use crate::canonical_json;
use orc_core::{normalize_task_id, time_fmt, Clock};
use orc_storage::{append_jsonl, load_json, read_jsonl_values, save_json_pretty, StateDir};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::LazyLock;
use thiserror::Error;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:治理|governance)(?:\s+(.*))?$").expect("constant regex pattern is valid")
});
static ABORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:中止|abort)\s+(.+)$").expect("constant regex pattern is valid")
});
static APPROVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:审批\s+(通过|拒绝)|(approve|reject))\s+([A-Za-z0-9_.:-]+)$")
        .expect("constant regex pattern is valid")
});

/// Errors surfaced by governance operations.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("approval not found: {0}")]
    ApprovalNotFound(String),
    #[error("abort target is required")]
    AbortTargetRequired,
    #[error("unsupported governance command: {0}")]
    Unsupported(String),
}

/// One-shot abort counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aborts {
    #[serde(default)]
    pub global: u64,
    #[serde(default)]
    pub autopilot: u64,
    #[serde(default)]
    pub scheduler: u64,
    #[serde(default)]
    pub tasks: BTreeMap<String, u64>,
}

/// Approval lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Restricts an approval to a dispatch scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalTarget {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// One approval record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: String,
    #[serde(default)]
    pub status: ApprovalStatus,
    #[serde(default)]
    pub target: ApprovalTarget,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub decided_at: String,
    #[serde(default)]
    pub decided_by: String,
}

/// Persisted control state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub aborts: Aborts,
    #[serde(default)]
    pub approvals: BTreeMap<String, Approval>,
    #[serde(default)]
    pub updated_at: String,
}

fn default_version() -> u32 {
    1
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            version: 1,
            paused: false,
            frozen: false,
            aborts: Aborts::default(),
            approvals: BTreeMap::new(),
            updated_at: String::new(),
        }
    }
}

impl ControlState {
    /// Clamp counters, uppercase task-abort keys, drop empty entries, and
    /// repair approval ids.
    fn normalize(mut self) -> Self {
        let mut tasks = BTreeMap::new();
        for (key, count) in std::mem::take(&mut self.aborts.tasks) {
            let task_id = normalize_task_id(&key);
            if !task_id.is_empty() && count > 0 {
                tasks.insert(task_id, count);
            }
        }
        self.aborts.tasks = tasks;

        let mut approvals = BTreeMap::new();
        for (key, mut approval) in std::mem::take(&mut self.approvals) {
            if approval.id.trim().is_empty() {
                approval.id = key.trim().to_string();
            }
            if approval.id.is_empty() {
                continue;
            }
            approvals.insert(approval.id.clone(), approval);
        }
        self.approvals = approvals;
        self
    }
}

/// Compact state summary carried on checkpoint and command envelopes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummary {
    pub paused: bool,
    pub frozen: bool,
    pub aborts: Aborts,
    pub approval_counts: BTreeMap<String, usize>,
    pub updated_at: String,
}

impl StateSummary {
    fn of(state: &ControlState) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for status in ["pending", "approved", "rejected"] {
            counts.insert(status.to_string(), 0);
        }
        for approval in state.approvals.values() {
            let key = match approval.status {
                ApprovalStatus::Pending => "pending",
                ApprovalStatus::Approved => "approved",
                ApprovalStatus::Rejected => "rejected",
            };
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }
        Self {
            paused: state.paused,
            frozen: state.frozen,
            aborts: state.aborts.clone(),
            approval_counts: counts,
            updated_at: state.updated_at.clone(),
        }
    }

    /// One-line operator summary.
    pub fn format_line(&self) -> String {
        format!(
            "governance | paused={} frozen={} | aborts(global={},autopilot={},scheduler={},tasks={}) | approvals(pending={},approved={},rejected={})",
            self.paused,
            self.frozen,
            self.aborts.global,
            self.aborts.autopilot,
            self.aborts.scheduler,
            self.aborts.tasks.len(),
            self.approval_counts.get("pending").copied().unwrap_or(0),
            self.approval_counts.get("approved").copied().unwrap_or(0),
            self.approval_counts.get("rejected").copied().unwrap_or(0),
        )
    }
}

/// Which abort credit a checkpoint consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedAbort {
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Checkpoint verdict.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointResult {
    pub allowed: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed: Option<ConsumedAbort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    pub state: StateSummary,
}

/// Abort scope named by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortTarget {
    Global,
    Autopilot,
    Scheduler,
    Task(String),
}

impl AbortTarget {
    fn label(&self) -> String {
        match self {
            AbortTarget::Global => "all".to_string(),
            AbortTarget::Autopilot => "autopilot".to_string(),
            AbortTarget::Scheduler => "scheduler".to_string(),
            AbortTarget::Task(task_id) => task_id.clone(),
        }
    }
}

/// A parsed governance command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceCommand {
    Status,
    Pause,
    Resume,
    Freeze,
    Unfreeze,
    Abort(AbortTarget),
    Approve(String),
    Reject(String),
    Invalid(String),
}

/// A governance action name used on audit rows and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceAction {
    Status,
    Pause,
    Resume,
    Freeze,
    Unfreeze,
    Abort,
    Approve,
    Reject,
}

/// Command execution envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceOutcome {
    pub ok: bool,
    pub action: GovernanceAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApprovalStatus>,
    pub state: StateSummary,
}

/// One audit row. `hash = SHA-256(canonical-JSON(row without hash))`, and
/// rows chain through `prevHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRow {
    pub at: String,
    pub actor: String,
    pub action: String,
    pub target: Value,
    pub result: Value,
    pub prev_hash: String,
    pub hash: String,
}

/// Audit chain verification report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub ok: bool,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The governance subsystem.
#[derive(Clone)]
pub struct Governance {
    dirs: StateDir,
    clock: Arc<dyn Clock>,
}

impl Governance {
    pub fn new(dirs: StateDir, clock: Arc<dyn Clock>) -> Self {
        Self { dirs, clock }
    }

    fn now_iso(&self) -> String {
        time_fmt::iso(self.clock.now())
    }

    /// Load the control state, tolerating a missing or corrupt file.
    pub fn load_control(&self) -> ControlState {
        load_json::<ControlState>(&self.dirs.governance_control_path())
            .unwrap_or_default()
            .normalize()
    }

    fn save_control(&self, state: ControlState) -> Result<ControlState, GovernanceError> {
        let mut state = state.normalize();
        state.updated_at = self.now_iso();
        save_json_pretty(&self.dirs.governance_control_path(), &state)?;
        Ok(state)
    }

    // -- audit ------------------------------------------------------------

    fn last_audit_hash(&self) -> String {
        let rows = read_jsonl_values(&self.dirs.governance_audit_path()).unwrap_or_default();
        for row in rows.iter().rev() {
            if let Some(hash) = row.get("hash").and_then(Value::as_str) {
                if !hash.trim().is_empty() {
                    return hash.trim().to_string();
                }
            }
        }
        String::new()
    }

    /// Append one audit row, chaining on the last row's hash.
    pub fn append_audit(
        &self,
        actor: &str,
        action: &str,
        target: Value,
        result: Value,
    ) -> Result<AuditRow, GovernanceError> {
        let prev_hash = self.last_audit_hash();
        let core = json!({
            "at": self.now_iso(),
            "actor": if actor.is_empty() { "unknown" } else { actor },
            "action": action,
            "target": target,
            "result": result,
            "prevHash": prev_hash,
        });
        let hash = format!("{:x}", Sha256::digest(canonical_json(&core).as_bytes()));

        let mut row_value = core.clone();
        row_value["hash"] = json!(hash);
        append_jsonl(&self.dirs.governance_audit_path(), &row_value)?;

        Ok(AuditRow {
            at: core["at"].as_str().unwrap_or_default().to_string(),
            actor: core["actor"].as_str().unwrap_or_default().to_string(),
            action: action.to_string(),
            target: core["target"].clone(),
            result: core["result"].clone(),
            prev_hash: core["prevHash"].as_str().unwrap_or_default().to_string(),
            hash,
        })
    }

    /// Walk the audit log and verify the hash chain.
    pub fn verify_audit_chain(&self) -> ChainReport {
        let rows = read_jsonl_values(&self.dirs.governance_audit_path()).unwrap_or_default();
        let mut prev_hash = String::new();
        for (idx, row) in rows.iter().enumerate() {
            let recorded_prev = row.get("prevHash").and_then(Value::as_str).unwrap_or("");
            if recorded_prev != prev_hash {
                return ChainReport {
                    ok: false,
                    rows: rows.len(),
                    break_at: Some(idx),
                    detail: Some("prevHash does not match previous row".to_string()),
                };
            }
            let recorded_hash = row.get("hash").and_then(Value::as_str).unwrap_or("");
            let mut core = row.clone();
            if let Some(map) = core.as_object_mut() {
                map.remove("hash");
            }
            let computed = format!("{:x}", Sha256::digest(canonical_json(&core).as_bytes()));
            if computed != recorded_hash {
                return ChainReport {
                    ok: false,
                    rows: rows.len(),
                    break_at: Some(idx),
                    detail: Some("row hash does not match canonical content".to_string()),
                };
            }
            prev_hash = recorded_hash.to_string();
        }
        ChainReport {
            ok: true,
            rows: rows.len(),
            break_at: None,
            detail: None,
        }
    }

    // -- checkpoints ------------------------------------------------------

    fn consume_scope(counter: &mut u64) -> bool {
        if *counter == 0 {
            return false;
        }
        *counter -= 1;
        true
    }

    fn consume_task_abort(aborts: &mut Aborts, task_id: &str) -> bool {
        let key = normalize_task_id(task_id);
        if key.is_empty() {
            return false;
        }
        match aborts.tasks.get_mut(&key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    aborts.tasks.remove(&key);
                }
                true
            }
            _ => false,
        }
    }

    /// Gate one dispatch for `(taskId, agent)`.
    pub fn checkpoint_dispatch(
        &self,
        actor: &str,
        task_id: &str,
        agent: &str,
    ) -> Result<CheckpointResult, GovernanceError> {
        let task_norm = normalize_task_id(task_id);
        let agent_norm = agent.trim().to_lowercase();
        let target = json!({"taskId": task_norm, "agent": agent_norm});
        let mut state = self.load_control();

        if state.frozen {
            return self.finish_checkpoint(
                actor,
                "checkpoint.dispatch",
                target,
                CheckpointResult {
                    allowed: false,
                    reason: "governance_frozen".to_string(),
                    consumed: None,
                    approval_id: None,
                    state: StateSummary::of(&state),
                },
            );
        }

        let consumed = if Self::consume_task_abort(&mut state.aborts, &task_norm) {
            Some(ConsumedAbort {
                scope: "task".to_string(),
                task_id: Some(task_norm.clone()),
            })
        } else if Self::consume_scope(&mut state.aborts.global) {
            Some(ConsumedAbort {
                scope: "global".to_string(),
                task_id: None,
            })
        } else {
            None
        };
        if let Some(consumed) = consumed {
            let state = self.save_control(state)?;
            return self.finish_checkpoint(
                actor,
                "checkpoint.dispatch",
                target,
                CheckpointResult {
                    allowed: false,
                    reason: "governance_aborted".to_string(),
                    consumed: Some(consumed),
                    approval_id: None,
                    state: StateSummary::of(&state),
                },
            );
        }

        // Approvals scanned in ascending id order for determinism
        for (approval_id, approval) in &state.approvals {
            if !approval.target.kind.trim().eq_ignore_ascii_case("dispatch") {
                continue;
            }
            if let Some(target_task) = approval.target.task_id.as_deref() {
                let target_task = normalize_task_id(target_task);
                if !target_task.is_empty() && target_task != task_norm {
                    continue;
                }
            }
            if let Some(target_agent) = approval.target.agent.as_deref() {
                let target_agent = target_agent.trim().to_lowercase();
                if !target_agent.is_empty() && target_agent != agent_norm {
                    continue;
                }
            }
            let reason = match approval.status {
                ApprovalStatus::Pending => "approval_required",
                ApprovalStatus::Rejected => "approval_rejected",
                ApprovalStatus::Approved => continue,
            };
            return self.finish_checkpoint(
                actor,
                "checkpoint.dispatch",
                target,
                CheckpointResult {
                    allowed: false,
                    reason: reason.to_string(),
                    consumed: None,
                    approval_id: Some(approval_id.clone()),
                    state: StateSummary::of(&state),
                },
            );
        }

        self.finish_checkpoint(
            actor,
            "checkpoint.dispatch",
            target,
            CheckpointResult {
                allowed: true,
                reason: "allowed".to_string(),
                consumed: None,
                approval_id: None,
                state: StateSummary::of(&state),
            },
        )
    }

    pub fn checkpoint_autopilot(&self, actor: &str) -> Result<CheckpointResult, GovernanceError> {
        self.checkpoint_loop_scope(actor, "checkpoint.autopilot", |aborts| {
            Self::consume_scope(&mut aborts.autopilot)
        })
    }

    pub fn checkpoint_scheduler(&self, actor: &str) -> Result<CheckpointResult, GovernanceError> {
        self.checkpoint_loop_scope(actor, "checkpoint.scheduler", |aborts| {
            Self::consume_scope(&mut aborts.scheduler)
        })
    }

    fn checkpoint_loop_scope(
        &self,
        actor: &str,
        action: &str,
        consume: impl FnOnce(&mut Aborts) -> bool,
    ) -> Result<CheckpointResult, GovernanceError> {
        let mut state = self.load_control();
        let scope = action.trim_start_matches("checkpoint.");

        if state.frozen {
            return self.finish_checkpoint(
                actor,
                action,
                json!({}),
                CheckpointResult {
                    allowed: false,
                    reason: "governance_frozen".to_string(),
                    consumed: None,
                    approval_id: None,
                    state: StateSummary::of(&state),
                },
            );
        }
        if state.paused {
            return self.finish_checkpoint(
                actor,
                action,
                json!({}),
                CheckpointResult {
                    allowed: false,
                    reason: "governance_paused".to_string(),
                    consumed: None,
                    approval_id: None,
                    state: StateSummary::of(&state),
                },
            );
        }

        let consumed = if consume(&mut state.aborts) {
            Some(ConsumedAbort {
                scope: scope.to_string(),
                task_id: None,
            })
        } else if Self::consume_scope(&mut state.aborts.global) {
            Some(ConsumedAbort {
                scope: "global".to_string(),
                task_id: None,
            })
        } else {
            None
        };
        if let Some(consumed) = consumed {
            let state = self.save_control(state)?;
            return self.finish_checkpoint(
                actor,
                action,
                json!({}),
                CheckpointResult {
                    allowed: false,
                    reason: "governance_aborted".to_string(),
                    consumed: Some(consumed),
                    approval_id: None,
                    state: StateSummary::of(&state),
                },
            );
        }

        self.finish_checkpoint(
            actor,
            action,
            json!({}),
            CheckpointResult {
                allowed: true,
                reason: "allowed".to_string(),
                consumed: None,
                approval_id: None,
                state: StateSummary::of(&state),
            },
        )
    }

    fn finish_checkpoint(
        &self,
        actor: &str,
        action: &str,
        target: Value,
        result: CheckpointResult,
    ) -> Result<CheckpointResult, GovernanceError> {
        let mut audit_result = json!({
            "allowed": result.allowed,
            "reason": result.reason,
        });
        if let Some(consumed) = &result.consumed {
            audit_result["consumed"] = serde_json::to_value(consumed).unwrap_or(Value::Null);
        }
        if let Some(approval_id) = &result.approval_id {
            audit_result["approvalId"] = json!(approval_id);
        }
        self.append_audit(actor, action, target, audit_result)?;
        Ok(result)
    }

    // -- commands ---------------------------------------------------------

    /// Parse a governance command, Chinese or English form. Returns `None`
    /// when the text is not a governance command at all.
    pub fn parse_command(text: &str) -> Option<GovernanceCommand> {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let caps = COMMAND_RE.captures(collapsed.trim())?;
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");

        let command = match body {
            "" | "状态" => GovernanceCommand::Status,
            "暂停" => GovernanceCommand::Pause,
            "恢复" => GovernanceCommand::Resume,
            "冻结" => GovernanceCommand::Freeze,
            "解冻" => GovernanceCommand::Unfreeze,
            _ => {
                let lowered = body.to_lowercase();
                match lowered.as_str() {
                    "status" => GovernanceCommand::Status,
                    "pause" => GovernanceCommand::Pause,
                    "resume" => GovernanceCommand::Resume,
                    "freeze" => GovernanceCommand::Freeze,
                    "unfreeze" => GovernanceCommand::Unfreeze,
                    _ => {
                        if let Some(caps) = ABORT_RE.captures(body) {
                            let raw_target = caps[1].trim();
                            let target = match raw_target {
                                "全部" | "all" | "global" => AbortTarget::Global,
                                "自动推进" | "autopilot" => AbortTarget::Autopilot,
                                "调度" | "scheduler" => AbortTarget::Scheduler,
                                other => AbortTarget::Task(normalize_task_id(other)),
                            };
                            GovernanceCommand::Abort(target)
                        } else if let Some(caps) = APPROVAL_RE.captures(body) {
                            let approval_id = caps[3].to_string();
                            let approve = caps
                                .get(1)
                                .map(|m| m.as_str() == "通过")
                                .or_else(|| {
                                    caps.get(2).map(|m| m.as_str().eq_ignore_ascii_case("approve"))
                                })
                                .unwrap_or(false);
                            if approve {
                                GovernanceCommand::Approve(approval_id)
                            } else {
                                GovernanceCommand::Reject(approval_id)
                            }
                        } else {
                            GovernanceCommand::Invalid(format!(
                                "unsupported governance command: {body}"
                            ))
                        }
                    }
                }
            }
        };
        Some(command)
    }

    /// Execute one governance command, auditing the result.
    pub fn execute(
        &self,
        actor: &str,
        command: &GovernanceCommand,
    ) -> Result<GovernanceOutcome, GovernanceError> {
        let mut state = self.load_control();
        match command {
            GovernanceCommand::Invalid(error) => {
                self.append_audit(
                    actor,
                    "invalid",
                    json!({}),
                    json!({"ok": false, "error": error}),
                )?;
                Err(GovernanceError::Unsupported(error.clone()))
            }
            GovernanceCommand::Status => {
                let summary = StateSummary::of(&state);
                self.append_audit(
                    actor,
                    "status",
                    json!({}),
                    json!({"ok": true, "state": serde_json::to_value(&summary).unwrap_or(Value::Null)}),
                )?;
                Ok(GovernanceOutcome {
                    ok: true,
                    action: GovernanceAction::Status,
                    target: None,
                    approval_id: None,
                    status: None,
                    state: summary,
                })
            }
            GovernanceCommand::Pause => {
                state.paused = true;
                self.flag_outcome(actor, GovernanceAction::Pause, state, json!({"paused": true}))
            }
            GovernanceCommand::Resume => {
                state.paused = false;
                self.flag_outcome(actor, GovernanceAction::Resume, state, json!({"paused": false}))
            }
            GovernanceCommand::Freeze => {
                state.frozen = true;
                self.flag_outcome(actor, GovernanceAction::Freeze, state, json!({"frozen": true}))
            }
            GovernanceCommand::Unfreeze => {
                state.frozen = false;
                self.flag_outcome(actor, GovernanceAction::Unfreeze, state, json!({"frozen": false}))
            }
            GovernanceCommand::Abort(target) => {
                match target {
                    AbortTarget::Global => state.aborts.global += 1,
                    AbortTarget::Autopilot => state.aborts.autopilot += 1,
                    AbortTarget::Scheduler => state.aborts.scheduler += 1,
                    AbortTarget::Task(task_id) => {
                        let task_id = normalize_task_id(task_id);
                        if task_id.is_empty() {
                            return Err(GovernanceError::AbortTargetRequired);
                        }
                        *state.aborts.tasks.entry(task_id).or_insert(0) += 1;
                    }
                }
                let label = target.label();
                let saved = self.save_control(state)?;
                self.append_audit(
                    actor,
                    "abort",
                    json!({"target": label}),
                    json!({"ok": true, "target": label}),
                )?;
                Ok(GovernanceOutcome {
                    ok: true,
                    action: GovernanceAction::Abort,
                    target: Some(label),
                    approval_id: None,
                    status: None,
                    state: StateSummary::of(&saved),
                })
            }
            GovernanceCommand::Approve(approval_id) | GovernanceCommand::Reject(approval_id) => {
                let approve = matches!(command, GovernanceCommand::Approve(_));
                let approval_id = approval_id.trim().to_string();
                let Some(approval) = state.approvals.get_mut(&approval_id) else {
                    return Err(GovernanceError::ApprovalNotFound(approval_id));
                };
                let final_status = if approve {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Rejected
                };
                approval.status = final_status;
                approval.decided_at = self.now_iso();
                approval.decided_by = actor.to_string();
                approval.updated_at = self.now_iso();

                let action = if approve {
                    GovernanceAction::Approve
                } else {
                    GovernanceAction::Reject
                };
                let action_name = if approve { "approve" } else { "reject" };
                let status_name = if approve { "approved" } else { "rejected" };
                let saved = self.save_control(state)?;
                self.append_audit(
                    actor,
                    action_name,
                    json!({"approvalId": approval_id}),
                    json!({"ok": true, "approvalId": approval_id, "status": status_name}),
                )?;
                Ok(GovernanceOutcome {
                    ok: true,
                    action,
                    target: None,
                    approval_id: Some(approval_id),
                    status: Some(final_status),
                    state: StateSummary::of(&saved),
                })
            }
        }
    }

    fn flag_outcome(
        &self,
        actor: &str,
        action: GovernanceAction,
        state: ControlState,
        result: Value,
    ) -> Result<GovernanceOutcome, GovernanceError> {
        let action_name = match action {
            GovernanceAction::Pause => "pause",
            GovernanceAction::Resume => "resume",
            GovernanceAction::Freeze => "freeze",
            GovernanceAction::Unfreeze => "unfreeze",
            _ => "status",
        };
        let scope = match action {
            GovernanceAction::Pause | GovernanceAction::Resume => "runtime",
            _ => "dispatch/autopilot/scheduler",
        };
        let saved = self.save_control(state)?;
        let mut audit_result = json!({"ok": true});
        if let Some(map) = audit_result.as_object_mut() {
            if let Some(extra) = result.as_object() {
                for (key, value) in extra {
                    map.insert(key.clone(), value.clone());
                }
            }
        }
        self.append_audit(actor, action_name, json!({"scope": scope}), audit_result)?;
        Ok(GovernanceOutcome {
            ok: true,
            action,
            target: None,
            approval_id: None,
            status: None,
            state: StateSummary::of(&saved),
        })
    }

    /// Seed or overwrite an approval record (used by operators and tests).
    pub fn put_approval(&self, approval: Approval) -> Result<ControlState, GovernanceError> {
        let mut state = self.load_control();
        let mut approval = approval;
        approval.id = approval.id.trim().to_string();
        if approval.created_at.is_empty() {
            approval.created_at = self.now_iso();
        }
        approval.updated_at = self.now_iso();
        state.approvals.insert(approval.id.clone(), approval);
        self.save_control(state)
    }
}

#[cfg(test)]
#[path = "governance_tests.rs"]
mod tests;
