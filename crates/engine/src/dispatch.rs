// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher: sends one task to a worker and grades the result.
//!
//! One iteration runs governance, selection, prompt composition, budget
//! precheck, the worker subprocess, reply normalization, the acceptance
//! gate, budget postcheck, and the recovery loop, emitting metrics and
//! audit rows along the way. Every outcome is a structured envelope;
//! nothing is thrown out of band.

use crate::acceptance::{AcceptanceGate, AcceptanceReason};
use crate::board::{BoardError, TaskBoard};
use crate::budget::BudgetTracker;
use crate::governance::{Governance, GovernanceError};
use crate::metrics::{
    MetricsLog, EVENT_DISPATCH_BLOCKED, EVENT_DISPATCH_DONE, EVENT_RECOVERY_ESCALATED,
    EVENT_RECOVERY_SCHEDULED,
};
use crate::priority::{select_task, SelectionRow};
use crate::prompt::{build_prompt, PromptInputs};
use crate::recovery::{RecoveryDecision, RecoveryLoop};
use orc_adapters::worker::bridge::SubWorkerBridge;
use orc_adapters::worker::cli::AgentCliExecutor;
use orc_adapters::{WorkerError, WorkerExecutor, WorkerRequest};
use orc_core::{parse_json_loose, Clock, IdGen, ReplyStatus, WorkerReply};
use orc_policy::{fetch_knowledge_hints, BudgetPolicy, DegradeAction, StrategyLibrary};
use orc_storage::{Journal, StateDir};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the dispatch pipeline itself (not worker failures, which
/// are graded into the outcome).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("board error: {0}")]
    Board(#[from] BoardError),
    #[error("governance error: {0}")]
    Governance(#[from] GovernanceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Final decision of one dispatch iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchDecision {
    Done,
    Blocked,
    Progress,
    Denied,
}

impl DispatchDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchDecision::Done => "done",
            DispatchDecision::Blocked => "blocked",
            DispatchDecision::Progress => "progress",
            DispatchDecision::Denied => "denied",
        }
    }
}

/// One dispatch request.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    /// Empty means "select via the priority engine".
    pub task_id: Option<String>,
    pub agent: String,
    pub actor: String,
    /// Worker timeout override; defaults to the agent's wall-time budget.
    pub timeout_sec: Option<u64>,
    /// Test mode: grade this text instead of spawning the worker.
    pub fake_output: Option<String>,
    /// Task ids the caller already touched this run (autopilot loop).
    pub excluded_task_ids: HashSet<String>,
}

/// Usage metrics carried on the outcome.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMetrics {
    pub token_usage: u64,
    pub elapsed_ms: u64,
}

/// The dispatch envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub ok: bool,
    pub decision: DispatchDecision,
    pub task_id: String,
    pub agent: String,
    pub reason_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exceeded_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degrade_action: Option<DegradeAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub metrics: DispatchMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_prompt: Option<String>,
    pub auto_close: bool,
}

impl DispatchOutcome {
    fn denied(task_id: &str, agent: &str, reason_code: &str) -> Self {
        Self {
            ok: true,
            decision: DispatchDecision::Denied,
            task_id: task_id.to_string(),
            agent: agent.to_string(),
            reason_code: reason_code.to_string(),
            acceptance_reason_code: None,
            detail: None,
            exceeded_keys: None,
            next_assignee: None,
            degrade_action: None,
            action: None,
            metrics: DispatchMetrics::default(),
            selection: None,
            recovery: None,
            agent_prompt: None,
            auto_close: false,
        }
    }
}

/// The dispatcher, wired to one run root.
#[derive(Clone)]
pub struct Dispatcher {
    dirs: StateDir,
    board: TaskBoard,
    governance: Governance,
    budget: BudgetTracker,
    recovery: RecoveryLoop,
    gate: AcceptanceGate,
    metrics: MetricsLog,
    /// Test seam: overrides per-agent executor selection when set.
    executor_override: Option<Arc<dyn WorkerExecutor>>,
}

impl Dispatcher {
    pub fn new(dirs: StateDir, clock: Arc<dyn Clock>, ids: Arc<dyn IdGen>) -> Self {
        Self {
            board: TaskBoard::new(dirs.clone(), Arc::clone(&clock), ids),
            governance: Governance::new(dirs.clone(), Arc::clone(&clock)),
            budget: BudgetTracker::new(dirs.clone(), Arc::clone(&clock)),
            recovery: RecoveryLoop::new(dirs.clone(), Arc::clone(&clock)),
            gate: AcceptanceGate::new(dirs.clone()),
            metrics: MetricsLog::new(dirs.clone(), clock),
            dirs,
            executor_override: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn WorkerExecutor>) -> Self {
        self.executor_override = Some(executor);
        self
    }

    pub fn board(&self) -> &TaskBoard {
        &self.board
    }

    pub fn governance(&self) -> &Governance {
        &self.governance
    }

    pub fn metrics(&self) -> &MetricsLog {
        &self.metrics
    }

    /// The structured sub-worker bridge handles the coder role; everything
    /// else goes through the generic agent CLI.
    fn executor_for(&self, agent: &str) -> Arc<dyn WorkerExecutor> {
        if let Some(executor) = &self.executor_override {
            return Arc::clone(executor);
        }
        if agent.trim().eq_ignore_ascii_case("coder") {
            Arc::new(SubWorkerBridge::default())
        } else {
            Arc::new(AgentCliExecutor::default())
        }
    }

    /// Run one dispatch iteration.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let started = Instant::now();
        let agent = request.agent.trim().to_lowercase();
        let requested_id = request
            .task_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        // 1. Governance checkpoint
        let checkpoint =
            self.governance
                .checkpoint_dispatch(&request.actor, requested_id.unwrap_or(""), &agent)?;
        if !checkpoint.allowed {
            self.emit_blocked(requested_id.unwrap_or(""), &agent, &checkpoint.reason, started)?;
            let mut outcome =
                DispatchOutcome::denied(requested_id.unwrap_or(""), &agent, &checkpoint.reason);
            outcome.detail = checkpoint.approval_id.map(|id| format!("approvalId={id}"));
            return Ok(outcome);
        }

        // 2–3. Selection / readiness
        let snapshot = self.board.load_snapshot()?;
        let selection = select_task(&snapshot.tasks, requested_id, &request.excluded_task_ids);
        let Some(task_id) = selection.selected().map(str::to_string) else {
            self.emit_blocked(requested_id.unwrap_or(""), &agent, &selection.reason_code, started)?;
            let mut outcome = DispatchOutcome::denied(
                requested_id.unwrap_or(""),
                &agent,
                &selection.reason_code,
            );
            outcome.detail = Some(selection.reason.clone());
            outcome.selection = Some(selection.selection);
            return Ok(outcome);
        };
        // Selection reports normalized ids; board keys are case-preserving
        let task = snapshot
            .tasks
            .values()
            .find(|t| orc_core::normalize_task_id(&t.task_id) == task_id)
            .cloned()
            .ok_or_else(|| BoardError::TaskNotFound(task_id.clone()))?;
        let task_id = task.task_id.clone();

        // 4. Prompt composition
        let strategy = StrategyLibrary::load(&self.dirs).resolve(&agent, &task_kind(&task.title), &task_id);
        let hints = fetch_knowledge_hints(&self.dirs);
        let recent_events = Journal::new(self.dirs.journal_path())
            .read_all()
            .unwrap_or_default();
        let task_text = format!("{}: {}", task.task_id, task.title);
        let prompt = build_prompt(&PromptInputs {
            strategy: Some(&strategy),
            hints: &hints,
            snapshot: &snapshot,
            task_id: &task_id,
            task_text: &task_text,
            recent_events: &recent_events,
        });

        // 5. Budget precheck
        let precheck = self.budget.precheck(&task_id, &agent);
        if !precheck.allowed {
            self.board
                .block_task(&request.actor, &task_id, "budget_exceeded")
                .ok();
            self.emit_blocked(&task_id, &agent, "budget_exceeded", started)?;
            let mut outcome = DispatchOutcome::denied(&task_id, &agent, "budget_exceeded");
            outcome.decision = DispatchDecision::Blocked;
            outcome.exceeded_keys = Some(precheck.exceeded_keys.clone());
            outcome.next_assignee = precheck.next_assignee.clone();
            outcome.degrade_action = precheck.degrade_action;
            outcome.action = Some("escalate".to_string());
            outcome.selection = Some(selection.selection);
            outcome.agent_prompt = Some(prompt);
            return Ok(outcome);
        }

        // Claim so the later done/blocked transitions are legal
        self.board.claim_task(&request.actor, &agent, &task_id)?;

        // 6. Spawn the worker (or take the fake output in test mode)
        let timeout_sec = request.timeout_sec.unwrap_or_else(|| {
            BudgetPolicy::load(&self.dirs)
                .limits_for(&agent)
                .max_task_wall_time_sec
        });
        let spawn_result: Result<String, WorkerError> = match &request.fake_output {
            Some(fake) => Ok(fake.clone()),
            None => {
                let executor = self.executor_for(&agent);
                debug!(executor = executor.name(), task_id = %task_id, agent = %agent, "dispatching worker");
                executor
                    .run(&WorkerRequest {
                        task_id: task_id.clone(),
                        agent: agent.clone(),
                        prompt: prompt.clone(),
                        timeout: Duration::from_secs(timeout_sec),
                        workspace: None,
                    })
                    .await
                    .map(|output| output.stdout)
            }
        };

        let stdout = match spawn_result {
            Ok(stdout) => stdout,
            Err(error) => {
                // Worker never produced output: spawn_failed, recover
                return self
                    .finish_failure(
                        request,
                        &agent,
                        &task_id,
                        selection.selection,
                        prompt,
                        "spawn_failed",
                        &format!("worker spawn failed: {error}"),
                        started,
                    )
                    .await;
            }
        };

        // 7–8. Parse + normalize the reply
        let reply = match parse_json_loose(&stdout) {
            Ok(value) => WorkerReply::normalize(value, &stdout),
            Err(_) => WorkerReply::invalid_output(),
        };
        let token_usage = reply.usage.token_usage;
        let elapsed_ms = if reply.usage.elapsed_ms > 0 {
            reply.usage.elapsed_ms
        } else {
            started.elapsed().as_millis() as u64
        };

        // 9. Acceptance gate → board intent
        let mut acceptance_reason_code = None;
        let mut detail = None;
        let (decision, reason_code) = match reply.status {
            ReplyStatus::Done => {
                let verdict = self.gate.grade(&agent, &reply, &stdout).await;
                if verdict.accepted {
                    self.board
                        .mark_done(&request.actor, &agent, &task_id, Some(&reply.summary))?;
                    acceptance_reason_code = Some(verdict.reason.as_str().to_string());
                    (DispatchDecision::Done, AcceptanceReason::DoneWithEvidence.as_str().to_string())
                } else {
                    let reason_text = verdict
                        .detail
                        .clone()
                        .unwrap_or_else(|| verdict.reason.as_str().to_string());
                    self.board.block_task(&request.actor, &task_id, &reason_text)?;
                    acceptance_reason_code = Some(verdict.reason.as_str().to_string());
                    detail = verdict.detail.clone();
                    (DispatchDecision::Blocked, "incomplete_output".to_string())
                }
            }
            ReplyStatus::Blocked => {
                self.board.block_task(&request.actor, &task_id, &reply.summary)?;
                detail = Some(reply.summary.clone());
                (DispatchDecision::Blocked, "blocked_signal".to_string())
            }
            ReplyStatus::Progress => (DispatchDecision::Progress, "progress_reported".to_string()),
        };

        // 10. Budget postcheck
        let retry_increment = u64::from(decision == DispatchDecision::Blocked);
        let postcheck = self
            .budget
            .record_and_check(&task_id, &agent, token_usage, elapsed_ms, retry_increment)?;

        let mut outcome = DispatchOutcome {
            ok: true,
            decision,
            task_id: task_id.clone(),
            agent: agent.clone(),
            reason_code,
            acceptance_reason_code,
            detail,
            exceeded_keys: None,
            next_assignee: None,
            degrade_action: None,
            action: None,
            metrics: DispatchMetrics {
                token_usage,
                elapsed_ms,
            },
            selection: Some(selection.selection),
            recovery: None,
            agent_prompt: Some(prompt),
            auto_close: decision == DispatchDecision::Done,
        };

        if !postcheck.allowed {
            outcome.decision = DispatchDecision::Blocked;
            outcome.reason_code = "budget_exceeded".to_string();
            outcome.exceeded_keys = Some(postcheck.exceeded_keys.clone());
            outcome.next_assignee = postcheck.next_assignee.clone();
            outcome.degrade_action = postcheck.degrade_action;
            outcome.action = Some("escalate".to_string());
            outcome.auto_close = false;
        }

        // 11. Recovery loop on qualifying failures
        if outcome.decision == DispatchDecision::Blocked
            && matches!(
                outcome.reason_code.as_str(),
                "spawn_failed" | "incomplete_output" | "blocked_signal"
            )
        {
            let recovery = self.recovery.decide(&task_id, &agent, &outcome.reason_code)?;
            self.emit_recovery(&task_id, &agent, &recovery)?;
            outcome.next_assignee = Some(recovery.next_assignee.clone());
            outcome.action = Some(recovery.action.clone());
            outcome.recovery = Some(recovery);
        }

        // 12. Metrics
        match outcome.decision {
            DispatchDecision::Done => {
                info!(task_id = %task_id, agent = %agent, "dispatch done");
                self.metrics.append(
                    EVENT_DISPATCH_DONE,
                    json!({
                        "taskId": task_id,
                        "agent": agent,
                        "cycleMs": outcome.metrics.elapsed_ms,
                        "tokenUsage": outcome.metrics.token_usage,
                    }),
                )?;
            }
            DispatchDecision::Blocked | DispatchDecision::Denied => {
                self.metrics.append(
                    EVENT_DISPATCH_BLOCKED,
                    json!({
                        "taskId": task_id,
                        "agent": agent,
                        "reasonCode": outcome.reason_code,
                        "cycleMs": outcome.metrics.elapsed_ms,
                    }),
                )?;
            }
            DispatchDecision::Progress => {}
        }

        Ok(outcome)
    }

    /// Spawn failures: block the task, run recovery, emit metrics.
    #[allow(clippy::too_many_arguments)]
    async fn finish_failure(
        &self,
        request: &DispatchRequest,
        agent: &str,
        task_id: &str,
        selection: SelectionRow,
        prompt: String,
        reason_code: &str,
        reason_text: &str,
        started: Instant,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.board.block_task(&request.actor, task_id, reason_text)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let postcheck = self
            .budget
            .record_and_check(task_id, agent, 0, elapsed_ms, 1)?;

        let recovery = self.recovery.decide(task_id, agent, reason_code)?;
        self.emit_recovery(task_id, agent, &recovery)?;

        let mut outcome = DispatchOutcome {
            ok: true,
            decision: DispatchDecision::Blocked,
            task_id: task_id.to_string(),
            agent: agent.to_string(),
            reason_code: reason_code.to_string(),
            acceptance_reason_code: None,
            detail: Some(reason_text.to_string()),
            exceeded_keys: None,
            next_assignee: Some(recovery.next_assignee.clone()),
            degrade_action: None,
            action: Some(recovery.action.clone()),
            metrics: DispatchMetrics {
                token_usage: 0,
                elapsed_ms,
            },
            selection: Some(selection),
            recovery: Some(recovery),
            agent_prompt: Some(prompt),
            auto_close: false,
        };
        if !postcheck.allowed {
            outcome.reason_code = "budget_exceeded".to_string();
            outcome.exceeded_keys = Some(postcheck.exceeded_keys.clone());
            outcome.next_assignee = postcheck.next_assignee.clone();
            outcome.degrade_action = postcheck.degrade_action;
            outcome.action = Some("escalate".to_string());
        }

        self.metrics.append(
            EVENT_DISPATCH_BLOCKED,
            json!({
                "taskId": task_id,
                "agent": agent,
                "reasonCode": outcome.reason_code,
                "cycleMs": elapsed_ms,
            }),
        )?;
        Ok(outcome)
    }

    fn emit_blocked(
        &self,
        task_id: &str,
        agent: &str,
        reason_code: &str,
        started: Instant,
    ) -> Result<(), DispatchError> {
        self.metrics.append(
            EVENT_DISPATCH_BLOCKED,
            json!({
                "taskId": task_id,
                "agent": agent,
                "reasonCode": reason_code,
                "cycleMs": started.elapsed().as_millis() as u64,
            }),
        )?;
        Ok(())
    }

    fn emit_recovery(
        &self,
        task_id: &str,
        agent: &str,
        recovery: &RecoveryDecision,
    ) -> Result<(), DispatchError> {
        let event = if recovery.action == "retry" {
            EVENT_RECOVERY_SCHEDULED
        } else {
            EVENT_RECOVERY_ESCALATED
        };
        self.metrics.append(
            event,
            json!({
                "taskId": task_id,
                "agent": agent,
                "reasonCode": recovery.reason_code,
                "attempt": recovery.attempt,
                "nextAssignee": recovery.next_assignee,
            }),
        )?;
        Ok(())
    }
}

/// Coarse task kind used for strategy lookup, derived from the title.
fn task_kind(title: &str) -> String {
    let lower = title.to_lowercase();
    if lower.contains("diag") || lower.contains("debug") {
        "diagnosis".to_string()
    } else if lower.contains("fix") || lower.contains("bug") {
        "bugfix".to_string()
    } else {
        "feature".to_string()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
