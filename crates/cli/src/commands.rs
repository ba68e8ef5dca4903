// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand implementations.

use crate::output::{emit_error, emit_ok};
use clap::Args;
use orc_core::{parse_route, time_fmt, Clock, SystemClock, UuidIdGen};
use orc_engine::{
    Autopilot, AutopilotRequest, DispatchRequest, Dispatcher, Governance, MetricsLog, Scheduler,
    TaskBoard,
};
use orc_storage::StateDir;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn clock() -> Arc<SystemClock> {
    Arc::new(SystemClock)
}

fn board_for(root: &PathBuf) -> TaskBoard {
    TaskBoard::new(StateDir::new(root), clock(), Arc::new(UuidIdGen))
}

fn dispatcher_for(root: &PathBuf) -> Dispatcher {
    Dispatcher::new(StateDir::new(root), clock(), Arc::new(UuidIdGen))
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(long)]
    root: PathBuf,
}

pub fn init(args: InitArgs) -> i32 {
    let dirs = StateDir::new(&args.root);
    let now = time_fmt::iso(SystemClock.now());
    match dirs.ensure(&now) {
        Ok(()) => emit_ok(&json!({
            "ok": true,
            "journal": dirs.journal_path(),
            "snapshot": dirs.snapshot_path(),
        })),
        Err(e) => emit_error(&e.to_string()),
    }
}

#[derive(Args)]
pub struct RouteArgs {
    #[arg(long)]
    actor: String,
    #[arg(long)]
    text: String,
}

pub fn route(args: RouteArgs) -> i32 {
    let route = parse_route(&args.text);
    let mut value = match serde_json::to_value(&route) {
        Ok(value) => value,
        Err(e) => return emit_error(&e.to_string()),
    };
    value["actor"] = json!(args.actor);
    emit_ok(&value)
}

#[derive(Args)]
pub struct ApplyArgs {
    #[arg(long)]
    root: PathBuf,
    #[arg(long)]
    actor: String,
    #[arg(long)]
    text: String,
    /// Inbound message id used for duplicate suppression
    #[arg(long)]
    message_id: Option<String>,
}

pub fn apply(args: ApplyArgs) -> i32 {
    // Governance commands share the inbound router with board intents
    if let Some(command) = Governance::parse_command(&args.text) {
        let governance = Governance::new(StateDir::new(&args.root), clock());
        return match governance.execute(&args.actor, &command) {
            Ok(outcome) => emit_ok(&outcome),
            Err(e) => emit_error(&e.to_string()),
        };
    }
    let board = board_for(&args.root);
    match board.apply_text_with_message_id(&args.actor, &args.text, args.message_id.as_deref()) {
        Ok(outcome) => emit_ok(&outcome),
        Err(e) => emit_error(&e.to_string()),
    }
}

#[derive(Args)]
pub struct DispatchArgs {
    #[arg(long)]
    root: PathBuf,
    #[arg(long)]
    actor: Option<String>,
    /// Task to dispatch; omitted means "select via the priority engine"
    #[arg(long)]
    task_id: Option<String>,
    #[arg(long)]
    agent: String,
    #[arg(long)]
    timeout_sec: Option<u64>,
    /// Test mode: grade this output instead of spawning the worker
    #[arg(long)]
    fake_output: Option<String>,
}

pub async fn dispatch(args: DispatchArgs) -> i32 {
    let dispatcher = dispatcher_for(&args.root);
    let request = DispatchRequest {
        task_id: args.task_id,
        agent: args.agent,
        actor: args.actor.unwrap_or_else(|| "orchestrator".to_string()),
        timeout_sec: args.timeout_sec,
        fake_output: args.fake_output,
        ..DispatchRequest::default()
    };
    match dispatcher.dispatch(&request).await {
        Ok(outcome) => emit_ok(&outcome),
        Err(e) => emit_error(&e.to_string()),
    }
}

#[derive(Args)]
pub struct AutopilotArgs {
    #[arg(long)]
    root: PathBuf,
    #[arg(long)]
    actor: Option<String>,
    /// Agent used for tasks without an assignee hint
    #[arg(long)]
    agent: Option<String>,
    #[arg(long, default_value_t = 1)]
    max_steps: usize,
    #[arg(long)]
    fake_output: Option<String>,
}

pub async fn autopilot(args: AutopilotArgs) -> i32 {
    let autopilot = Autopilot::new(dispatcher_for(&args.root));
    let request = AutopilotRequest {
        actor: args.actor.unwrap_or_else(|| "orchestrator".to_string()),
        default_agent: args.agent.unwrap_or_else(|| "coder".to_string()),
        max_steps: args.max_steps,
        fake_output: args.fake_output,
    };
    match autopilot.run(&request).await {
        Ok(run) => emit_ok(&run),
        Err(e) => emit_error(&e.to_string()),
    }
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulerAction {
    Enable,
    Disable,
    Tick,
    Status,
    Daemon,
}

#[derive(Args)]
pub struct SchedulerArgs {
    #[arg(long)]
    root: PathBuf,
    #[arg(long, value_enum, default_value = "tick")]
    action: SchedulerAction,
    #[arg(long)]
    actor: Option<String>,
    #[arg(long)]
    agent: Option<String>,
    #[arg(long, default_value_t = 300)]
    interval_sec: u64,
    #[arg(long, default_value_t = 1)]
    max_steps: usize,
    /// Bypass the interval gate (never governance)
    #[arg(long, default_value_t = false)]
    force: bool,
    /// Daemon mode: number of cooperative loops
    #[arg(long, default_value_t = 10)]
    max_loops: usize,
    /// Daemon mode: sleep between loops, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    poll_ms: u64,
    #[arg(long)]
    fake_output: Option<String>,
}

pub async fn scheduler(args: SchedulerArgs) -> i32 {
    let dirs = StateDir::new(&args.root);
    let scheduler = Scheduler::new(
        dirs,
        clock(),
        Autopilot::new(dispatcher_for(&args.root)),
    );
    let request = AutopilotRequest {
        actor: args.actor.unwrap_or_else(|| "scheduler".to_string()),
        default_agent: args.agent.unwrap_or_else(|| "coder".to_string()),
        max_steps: args.max_steps,
        fake_output: args.fake_output,
    };

    match args.action {
        SchedulerAction::Enable => {
            match scheduler.enable(&request, args.interval_sec, args.max_steps).await {
                Ok(outcome) => emit_ok(&outcome),
                Err(e) => emit_error(&e.to_string()),
            }
        }
        SchedulerAction::Disable => match scheduler.disable() {
            Ok(outcome) => emit_ok(&outcome),
            Err(e) => emit_error(&e.to_string()),
        },
        SchedulerAction::Status => emit_ok(&scheduler.status()),
        SchedulerAction::Tick => match scheduler.tick(&request, args.force).await {
            Ok(outcome) => emit_ok(&outcome),
            Err(e) => emit_error(&e.to_string()),
        },
        SchedulerAction::Daemon => {
            match scheduler
                .daemon(&request, args.max_loops, Duration::from_millis(args.poll_ms))
                .await
            {
                Ok(outcomes) => emit_ok(&json!({
                    "ok": true,
                    "intent": "scheduler_daemon",
                    "loops": outcomes.len(),
                    "outcomes": outcomes,
                })),
                Err(e) => emit_error(&e.to_string()),
            }
        }
    }
}

#[derive(Args)]
pub struct GovernanceArgs {
    #[arg(long)]
    root: PathBuf,
    #[arg(long)]
    actor: String,
    /// Full command text, e.g. "治理 冻结" or "governance freeze"
    #[arg(long)]
    text: String,
}

pub fn governance(args: GovernanceArgs) -> i32 {
    let governance = Governance::new(StateDir::new(&args.root), clock());
    let Some(command) = Governance::parse_command(&args.text) else {
        return emit_error(&format!("not a governance command: {}", args.text));
    };
    match governance.execute(&args.actor, &command) {
        Ok(outcome) => emit_ok(&outcome),
        Err(e) => emit_error(&e.to_string()),
    }
}

#[derive(Args)]
pub struct MetricsArgs {
    #[arg(long)]
    root: PathBuf,
    #[arg(long, default_value_t = 7)]
    days: u32,
}

pub fn metrics(args: MetricsArgs) -> i32 {
    let metrics = MetricsLog::new(StateDir::new(&args.root), clock());
    match metrics.aggregate(args.days) {
        Ok(summary) => {
            let line = summary.format_line();
            let mut value = match serde_json::to_value(&summary) {
                Ok(value) => value,
                Err(e) => return emit_error(&e.to_string()),
            };
            value["ok"] = json!(true);
            value["summaryLine"] = json!(line);
            emit_ok(&value)
        }
        Err(e) => emit_error(&e.to_string()),
    }
}

#[derive(Args)]
pub struct RebuildArgs {
    #[arg(long)]
    root: PathBuf,
    /// Also rewrite the journal deduplicated by event id
    #[arg(long, default_value_t = false)]
    compact: bool,
}

pub fn rebuild(args: RebuildArgs) -> i32 {
    let dirs = StateDir::new(&args.root);
    let now = time_fmt::iso(SystemClock.now());
    match orc_storage::rebuild_snapshot(&dirs, &now, args.compact) {
        Ok(report) => {
            let mut value = match serde_json::to_value(&report) {
                Ok(value) => value,
                Err(e) => return emit_error(&e.to_string()),
            };
            value["ok"] = json!(true);
            emit_ok(&value)
        }
        Err(e) => emit_error(&e.to_string()),
    }
}

#[derive(Args)]
pub struct AuditVerifyArgs {
    #[arg(long)]
    root: PathBuf,
}

pub fn audit_verify(args: AuditVerifyArgs) -> i32 {
    let governance = Governance::new(StateDir::new(&args.root), clock());
    let report = governance.verify_audit_chain();
    let code = if report.ok { 0 } else { 1 };
    let emitted = emit_ok(&report);
    if emitted != 0 {
        emitted
    } else {
        code
    }
}

