// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Autopilot: operator-triggered batch of dispatcher iterations.
//!
//! Selects ready tasks via the priority engine and dispatches them one by
//! one, up to `max_steps`, stopping early on a denied dispatch or when no
//! ready task remains. The scheduler shares this loop behind its own
//! governance checkpoint.

use crate::dispatch::{DispatchDecision, DispatchError, DispatchOutcome, DispatchRequest, Dispatcher};
use crate::governance::GovernanceError;
use crate::priority::select_task;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Errors from an autopilot run.
#[derive(Debug, Error)]
pub enum AutopilotError {
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("governance error: {0}")]
    Governance(#[from] GovernanceError),
    #[error("board error: {0}")]
    Board(#[from] crate::board::BoardError),
}

/// Parameters for one autopilot run.
#[derive(Debug, Clone)]
pub struct AutopilotRequest {
    pub actor: String,
    /// Agent used when a selected task has no assignee hint.
    pub default_agent: String,
    pub max_steps: usize,
    pub fake_output: Option<String>,
}

impl Default for AutopilotRequest {
    fn default() -> Self {
        Self {
            actor: "orchestrator".to_string(),
            default_agent: "coder".to_string(),
            max_steps: 1,
            fake_output: None,
        }
    }
}

/// Result of one autopilot run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotRun {
    pub ok: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub steps_run: usize,
    pub steps: Vec<DispatchOutcome>,
}

impl AutopilotRun {
    pub(crate) fn skipped(reason: impl Into<String>) -> Self {
        Self {
            ok: true,
            skipped: true,
            reason: Some(reason.into()),
            steps_run: 0,
            steps: Vec::new(),
        }
    }
}

/// Autopilot over a dispatcher.
#[derive(Clone)]
pub struct Autopilot {
    dispatcher: Dispatcher,
}

impl Autopilot {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run the autopilot behind its governance checkpoint.
    pub async fn run(&self, request: &AutopilotRequest) -> Result<AutopilotRun, AutopilotError> {
        let checkpoint = self
            .dispatcher
            .governance()
            .checkpoint_autopilot(&request.actor)?;
        if !checkpoint.allowed {
            return Ok(AutopilotRun::skipped(checkpoint.reason));
        }
        self.run_steps(request).await
    }

    /// The shared select-and-dispatch loop (no checkpoint of its own).
    pub(crate) async fn run_steps(
        &self,
        request: &AutopilotRequest,
    ) -> Result<AutopilotRun, AutopilotError> {
        let mut steps: Vec<DispatchOutcome> = Vec::new();
        let mut dispatched: HashSet<String> = HashSet::new();

        for step in 0..request.max_steps.max(1) {
            let snapshot = self.dispatcher.board().load_snapshot()?;
            let selection = select_task(&snapshot.tasks, None, &dispatched);
            let Some(task_id) = selection.selected().map(str::to_string) else {
                debug!(step, "no ready task remains, stopping autopilot");
                break;
            };

            let agent = snapshot
                .tasks
                .values()
                .find(|t| orc_core::normalize_task_id(&t.task_id) == task_id)
                .and_then(|t| t.assignee_hint.clone())
                .filter(|hint| !hint.trim().is_empty())
                .unwrap_or_else(|| request.default_agent.clone());

            let outcome = self
                .dispatcher
                .dispatch(&DispatchRequest {
                    task_id: Some(task_id.clone()),
                    agent,
                    actor: request.actor.clone(),
                    timeout_sec: None,
                    fake_output: request.fake_output.clone(),
                    excluded_task_ids: dispatched.clone(),
                })
                .await?;

            dispatched.insert(task_id);
            let denied = outcome.decision == DispatchDecision::Denied;
            steps.push(outcome);
            if denied {
                break;
            }
        }

        Ok(AutopilotRun {
            ok: true,
            skipped: false,
            reason: None,
            steps_run: steps.len(),
            steps,
        })
    }
}

#[cfg(test)]
#[path = "autopilot_tests.rs"]
mod tests;
