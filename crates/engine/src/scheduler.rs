// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler: timer-triggered autopilot with interval gating.
//!
//! State is persisted at `state/scheduler.state.json`. A governance denial
//! or a not-due tick records the skip and leaves `lastRunTs`/`nextDueTs`
//! untouched; only a successful run advances them.

use crate::autopilot::{Autopilot, AutopilotError, AutopilotRequest, AutopilotRun};
use crate::metrics::EVENT_SCHEDULER_TICK;
use orc_core::Clock;
use orc_storage::{load_json, save_json_pretty, StateDir};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

fn default_interval_sec() -> u64 {
    300
}

fn default_max_steps() -> usize {
    1
}

/// Persisted scheduler state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_sec")]
    pub interval_sec: u64,
    #[serde(default)]
    pub last_run_ts: i64,
    #[serde(default)]
    pub next_due_ts: i64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_sec: default_interval_sec(),
            last_run_ts: 0,
            next_due_ts: 0,
            max_steps: default_max_steps(),
        }
    }
}

/// One scheduler invocation's envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerOutcome {
    pub ok: bool,
    pub intent: &'static str,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub state: SchedulerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<AutopilotRun>,
}

/// The scheduler, sharing the autopilot loop behind its own checkpoint.
#[derive(Clone)]
pub struct Scheduler {
    dirs: StateDir,
    clock: Arc<dyn Clock>,
    autopilot: Autopilot,
}

impl Scheduler {
    pub fn new(dirs: StateDir, clock: Arc<dyn Clock>, autopilot: Autopilot) -> Self {
        Self {
            dirs,
            clock,
            autopilot,
        }
    }

    pub fn load_state(&self) -> SchedulerState {
        load_json(&self.dirs.scheduler_state_path()).unwrap_or_default()
    }

    fn save_state(&self, state: &SchedulerState) -> std::io::Result<()> {
        save_json_pretty(&self.dirs.scheduler_state_path(), state)
    }

    /// Enable with the given interval and step budget, then run one tick
    /// immediately.
    pub async fn enable(
        &self,
        request: &AutopilotRequest,
        interval_sec: u64,
        max_steps: usize,
    ) -> Result<SchedulerOutcome, AutopilotError> {
        let mut state = self.load_state();
        state.enabled = true;
        state.interval_sec = interval_sec.max(1);
        state.max_steps = max_steps.max(1);
        self.save_state(&state).map_err(crate::dispatch::DispatchError::Io)?;
        info!(interval_sec = state.interval_sec, "scheduler enabled");
        self.tick(request, true).await
    }

    pub fn disable(&self) -> std::io::Result<SchedulerOutcome> {
        let mut state = self.load_state();
        state.enabled = false;
        self.save_state(&state)?;
        info!("scheduler disabled");
        Ok(SchedulerOutcome {
            ok: true,
            intent: "scheduler_run",
            skipped: true,
            reason: Some("scheduler_disabled".to_string()),
            state,
            run: None,
        })
    }

    pub fn status(&self) -> SchedulerOutcome {
        SchedulerOutcome {
            ok: true,
            intent: "scheduler_run",
            skipped: true,
            reason: Some("status_only".to_string()),
            state: self.load_state(),
            run: None,
        }
    }

    /// One tick: governance, interval gate, then the shared loop.
    pub async fn tick(
        &self,
        request: &AutopilotRequest,
        force: bool,
    ) -> Result<SchedulerOutcome, AutopilotError> {
        let mut state = self.load_state();
        let now_ts = self.clock.now_ts();

        // Governance denial never advances the timestamps
        let checkpoint = self
            .autopilot
            .dispatcher()
            .governance()
            .checkpoint_scheduler(&request.actor)?;
        if !checkpoint.allowed {
            debug!(reason = %checkpoint.reason, "scheduler tick denied");
            return Ok(SchedulerOutcome {
                ok: true,
                intent: "scheduler_run",
                skipped: true,
                reason: Some(checkpoint.reason.clone()),
                state,
                run: Some(AutopilotRun::skipped(checkpoint.reason)),
            });
        }

        if !state.enabled || (!force && now_ts < state.next_due_ts) {
            return Ok(SchedulerOutcome {
                ok: true,
                intent: "scheduler_run",
                skipped: true,
                reason: Some("not_due".to_string()),
                state,
                run: None,
            });
        }

        let mut run_request = request.clone();
        run_request.max_steps = state.max_steps;
        let run = self.autopilot.run_steps(&run_request).await?;

        state.last_run_ts = now_ts;
        state.next_due_ts = now_ts + state.interval_sec as i64;
        self.save_state(&state).map_err(crate::dispatch::DispatchError::Io)?;

        self.autopilot
            .dispatcher()
            .metrics()
            .append(
                EVENT_SCHEDULER_TICK,
                json!({"stepsRun": run.steps_run, "forced": force}),
            )
            .map_err(crate::dispatch::DispatchError::Io)?;

        Ok(SchedulerOutcome {
            ok: true,
            intent: "scheduler_run",
            skipped: false,
            reason: None,
            state,
            run: Some(run),
        })
    }

    /// Bounded cooperative daemon loop: tick, sleep, repeat.
    pub async fn daemon(
        &self,
        request: &AutopilotRequest,
        max_loops: usize,
        poll_interval: Duration,
    ) -> Result<Vec<SchedulerOutcome>, AutopilotError> {
        let mut outcomes = Vec::new();
        for loop_idx in 0..max_loops.max(1) {
            let outcome = self.tick(request, false).await?;
            debug!(loop_idx, skipped = outcome.skipped, "scheduler daemon loop");
            outcomes.push(outcome);
            if loop_idx + 1 < max_loops {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
