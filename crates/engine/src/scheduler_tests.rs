// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{Dispatcher, GovernanceCommand};
use orc_adapters::FakeWorker;
use orc_core::{FakeClock, SequentialIdGen, TaskStatus};
use std::time::Duration;

struct Harness {
    _tmp: tempfile::TempDir,
    clock: FakeClock,
    scheduler: Scheduler,
    fake: FakeWorker,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = StateDir::new(tmp.path());
    let clock = FakeClock::at_ts(1_767_225_600);
    let fake = FakeWorker::new();
    let dispatcher = Dispatcher::new(
        dirs.clone(),
        Arc::new(clock.clone()),
        Arc::new(SequentialIdGen::new("evt")),
    )
    .with_executor(Arc::new(fake.clone()));
    let scheduler = Scheduler::new(dirs, Arc::new(clock.clone()), Autopilot::new(dispatcher));
    Harness {
        _tmp: tmp,
        clock,
        scheduler,
        fake,
    }
}

impl Harness {
    fn board(&self) -> &crate::TaskBoard {
        self.scheduler.autopilot.dispatcher().board()
    }

    fn request(&self, fake_output: &str) -> AutopilotRequest {
        AutopilotRequest {
            fake_output: Some(fake_output.to_string()),
            ..AutopilotRequest::default()
        }
    }
}

const DONE: &str = r#"{"status":"done","summary":"tick done","evidence":["logs/scheduler.log"]}"#;

#[tokio::test]
async fn enable_persists_state_and_runs_immediately() {
    let h = harness();
    h.board()
        .apply_text("orchestrator", "@coder create task T-070: scheduled work")
        .unwrap();

    let outcome = h.scheduler.enable(&h.request(DONE), 60, 1).await.unwrap();
    assert!(outcome.ok);
    assert!(!outcome.skipped);
    assert!(outcome.state.enabled);
    assert_eq!(outcome.state.interval_sec, 60);
    assert_eq!(outcome.run.as_ref().unwrap().steps_run, 1);
    assert!(outcome.state.last_run_ts > 0);
    assert_eq!(
        outcome.state.next_due_ts,
        outcome.state.last_run_ts + 60
    );
    assert_eq!(h.board().load_snapshot().unwrap().tasks["T-070"].status, TaskStatus::Done);
}

#[tokio::test]
async fn tick_before_due_skips_as_not_due() {
    let h = harness();
    h.board()
        .apply_text("orchestrator", "@coder create task T-001: work")
        .unwrap();
    h.scheduler.enable(&h.request(DONE), 60, 1).await.unwrap();

    let second = h.scheduler.tick(&h.request(DONE), false).await.unwrap();
    assert!(second.skipped);
    assert_eq!(second.reason.as_deref(), Some("not_due"));

    // Once the interval elapses the tick runs again
    h.board()
        .apply_text("orchestrator", "@coder create task T-002: more work")
        .unwrap();
    h.clock.advance_secs(61);
    let third = h.scheduler.tick(&h.request(DONE), false).await.unwrap();
    assert!(!third.skipped);
    assert_eq!(third.run.as_ref().unwrap().steps_run, 1);
}

#[tokio::test]
async fn force_bypasses_the_interval_but_not_governance() {
    let h = harness();
    h.board()
        .apply_text("orchestrator", "@coder create task T-071: frozen out")
        .unwrap();
    let enabled = h.scheduler.enable(&h.request(DONE), 60, 1).await.unwrap();
    let before = enabled.state.clone();
    assert!(before.last_run_ts > 0);

    h.scheduler
        .autopilot
        .dispatcher()
        .governance()
        .execute("operator", &GovernanceCommand::Freeze)
        .unwrap();

    let skipped = h.scheduler.tick(&h.request(DONE), true).await.unwrap();
    assert!(skipped.skipped);
    assert_eq!(skipped.reason.as_deref(), Some("governance_frozen"));
    let run = skipped.run.as_ref().unwrap();
    assert!(run.skipped);
    assert_eq!(run.reason.as_deref(), Some("governance_frozen"));
    // Timestamps did not advance
    assert_eq!(skipped.state.last_run_ts, before.last_run_ts);
    assert_eq!(skipped.state.next_due_ts, before.next_due_ts);
}

#[tokio::test]
async fn disabled_scheduler_is_not_due() {
    let h = harness();
    let outcome = h.scheduler.tick(&h.request(DONE), false).await.unwrap();
    assert!(outcome.skipped);
    assert_eq!(outcome.reason.as_deref(), Some("not_due"));
}

#[tokio::test]
async fn disable_turns_the_scheduler_off() {
    let h = harness();
    h.scheduler.enable(&h.request(DONE), 60, 1).await.unwrap();
    let disabled = h.scheduler.disable().unwrap();
    assert!(!disabled.state.enabled);

    h.clock.advance_secs(120);
    let tick = h.scheduler.tick(&h.request(DONE), false).await.unwrap();
    assert!(tick.skipped);
}

#[tokio::test]
async fn successful_tick_emits_a_metric() {
    let h = harness();
    h.board()
        .apply_text("orchestrator", "@coder create task T-001: work")
        .unwrap();
    h.scheduler.enable(&h.request(DONE), 60, 1).await.unwrap();

    let rows = orc_storage::read_jsonl_values(&h.scheduler.dirs.metrics_path()).unwrap();
    assert!(rows
        .iter()
        .any(|row| row["event"] == "scheduler_tick" && row["stepsRun"] == 1));
    // Fake output mode never touches the worker executor
    assert_eq!(h.fake.call_count(), 0);
}

#[tokio::test]
async fn daemon_runs_bounded_loops() {
    let h = harness();
    h.board()
        .apply_text("orchestrator", "@coder create task T-001: work")
        .unwrap();
    h.scheduler.enable(&h.request(DONE), 1, 1).await.unwrap();
    h.clock.advance_secs(2);

    let outcomes = h
        .scheduler
        .daemon(&h.request(DONE), 2, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    // First loop runs (due), second one is not due yet on the fake clock
    assert!(!outcomes[0].skipped);
    assert!(outcomes[1].skipped);
}
