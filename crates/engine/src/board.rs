// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task board: routes text into intents and applies them under the
//! board lock.
//!
//! Every mutation appends one event to the journal before the snapshot
//! rewrite, and the event id enters `task.history`. Failures are typed and
//! never partially mutate state. Read-only intents (status, synthesize)
//! bypass the lock and read the snapshot directly.

use orc_core::{
    can_transition, message_tag, next_task_id, parse_route, time_fmt, BoardEvent, Clock, EventKind,
    IdGen, Intent, Task, TaskStatus,
};
use orc_storage::{apply_event, BoardLock, Journal, JournalError, LockError, Snapshot, StateDir};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by board operations.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("lock busy: {0}")]
    LockBusy(std::path::PathBuf),
    #[error("task exists: {0}")]
    TaskExists(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("unsupported intent: {0}")]
    UnsupportedIntent(String),
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] orc_storage::SnapshotError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LockError> for BoardError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::Busy(path) => BoardError::LockBusy(path),
            LockError::Io(e) => BoardError::Io(e),
        }
    }
}

/// Successful apply envelope.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub ok: bool,
    pub intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diag_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diag_assignee_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Set when an inbound message id was already seen; nothing mutated.
    #[serde(skip_serializing_if = "is_false", default)]
    pub duplicate: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ApplyOutcome {
    fn new(intent: &str) -> Self {
        Self {
            ok: true,
            intent: intent.to_string(),
            ..Self::default()
        }
    }
}

/// The event-sourced task board.
#[derive(Clone)]
pub struct TaskBoard {
    dirs: StateDir,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGen>,
}

impl TaskBoard {
    pub fn new(dirs: StateDir, clock: Arc<dyn Clock>, ids: Arc<dyn IdGen>) -> Self {
        Self { dirs, clock, ids }
    }

    pub fn dirs(&self) -> &StateDir {
        &self.dirs
    }

    fn now_iso(&self) -> String {
        time_fmt::iso(self.clock.now())
    }

    /// Load the snapshot without taking the lock.
    pub fn load_snapshot(&self) -> Result<Snapshot, BoardError> {
        self.dirs.ensure(&self.now_iso())?;
        Ok(Snapshot::load(&self.dirs.snapshot_path())?)
    }

    /// Route and apply one line of text.
    pub fn apply_text(&self, actor: &str, text: &str) -> Result<ApplyOutcome, BoardError> {
        self.apply_text_with_message_id(actor, text, None)
    }

    /// Route and apply, recognizing duplicate inbound message ids.
    ///
    /// A repeated message id short-circuits before the lock: the outcome is
    /// reported as a duplicate and no board mutation happens.
    pub fn apply_text_with_message_id(
        &self,
        actor: &str,
        text: &str,
        message_id: Option<&str>,
    ) -> Result<ApplyOutcome, BoardError> {
        let route = parse_route(text);
        if !route.intent.is_read_only() {
            if let Some(message_id) = message_id {
                let dedup = crate::InboundDedup::new(self.dirs.clone());
                if !dedup.check_and_record(message_id, &self.now_iso())? {
                    debug!(message_id, "duplicate inbound message, skipping apply");
                    let mut outcome = ApplyOutcome::new(intent_name(&route.intent));
                    outcome.duplicate = true;
                    return Ok(outcome);
                }
            }
        }
        let assignee = route
            .override_agent
            .clone()
            .unwrap_or_else(|| actor.to_string());
        self.apply_intent(actor, &assignee, &route.intent)
    }

    fn apply_intent(
        &self,
        actor: &str,
        assignee: &str,
        intent: &Intent,
    ) -> Result<ApplyOutcome, BoardError> {
        match intent {
            Intent::Status { task_id } => self.status(task_id.as_deref()),
            Intent::Synthesize { task_id } => self.synthesize(task_id.as_deref()),
            Intent::Unknown { raw } => Err(BoardError::UnsupportedIntent(raw.clone())),
            Intent::CreateTask { task_id, title } => {
                self.create_task(actor, assignee, task_id.as_deref(), title)
            }
            Intent::ClaimTask { task_id } => self.claim_task(actor, assignee, task_id),
            Intent::MarkDone { task_id, result } => {
                self.mark_done(actor, assignee, task_id, opt(result))
            }
            Intent::BlockTask { task_id, reason } => {
                self.block_task(actor, task_id, opt(reason).unwrap_or("unspecified blocker"))
            }
            Intent::EscalateTask { task_id, reason } => {
                self.escalate_task(actor, task_id, opt(reason).unwrap_or("unspecified escalation"))
            }
        }
    }

    // -- mutations --------------------------------------------------------

    pub fn create_task(
        &self,
        actor: &str,
        assignee: &str,
        task_id: Option<&str>,
        title: &str,
    ) -> Result<ApplyOutcome, BoardError> {
        self.with_board(actor, "create_task", |board| {
            let task_id = match task_id {
                Some(id) => id.to_string(),
                None => next_task_id(board.snapshot.tasks.keys()),
            };
            if board.snapshot.tasks.contains_key(&task_id) {
                return Err(BoardError::TaskExists(task_id));
            }
            let title = if title.trim().is_empty() {
                "untitled"
            } else {
                title.trim()
            };
            board.emit(
                &task_id,
                EventKind::TaskCreated,
                message_tag::TASK,
                json!({"title": title, "assigneeHint": assignee}),
            )?;

            let mut outcome = ApplyOutcome::new("create_task");
            outcome.task_id = Some(task_id);
            outcome.assignee_hint = Some(assignee.to_string());
            Ok(outcome)
        })
    }

    pub fn claim_task(
        &self,
        actor: &str,
        assignee: &str,
        task_id: &str,
    ) -> Result<ApplyOutcome, BoardError> {
        self.with_board(actor, "claim_task", |board| {
            let prev = board.require(task_id)?.status;
            let target = if prev == TaskStatus::Pending {
                TaskStatus::Claimed
            } else {
                TaskStatus::InProgress
            };
            board.check_transition(prev, target)?;
            board.emit(
                task_id,
                EventKind::TaskClaimed,
                message_tag::CLAIM,
                json!({"from": prev, "to": target, "owner": assignee}),
            )?;

            let mut outcome = ApplyOutcome::new("claim_task");
            outcome.task_id = Some(task_id.to_string());
            outcome.owner = Some(assignee.to_string());
            outcome.status = Some(target);
            Ok(outcome)
        })
    }

    pub fn mark_done(
        &self,
        actor: &str,
        assignee: &str,
        task_id: &str,
        result: Option<&str>,
    ) -> Result<ApplyOutcome, BoardError> {
        self.with_board(actor, "mark_done", |board| {
            let task = board.require(task_id)?;
            let prev = task.status;
            board.check_transition(prev, TaskStatus::Done)?;
            let result = result
                .map(str::to_string)
                .or_else(|| task.result.clone())
                .unwrap_or_else(|| "done".to_string());
            let owner = task
                .owner
                .clone()
                .unwrap_or_else(|| assignee.to_string());
            board.emit(
                task_id,
                EventKind::TaskDone,
                message_tag::DONE,
                json!({"from": prev, "to": TaskStatus::Done, "result": result, "owner": owner}),
            )?;

            let mut outcome = ApplyOutcome::new("mark_done");
            outcome.task_id = Some(task_id.to_string());
            outcome.status = Some(TaskStatus::Done);
            outcome.owner = Some(owner);
            Ok(outcome)
        })
    }

    pub fn block_task(
        &self,
        actor: &str,
        task_id: &str,
        reason: &str,
    ) -> Result<ApplyOutcome, BoardError> {
        self.with_board(actor, "block_task", |board| {
            board.block(task_id, reason, message_tag::BLOCKED)?;
            let mut outcome = ApplyOutcome::new("block_task");
            outcome.task_id = Some(task_id.to_string());
            outcome.status = Some(TaskStatus::Blocked);
            Ok(outcome)
        })
    }

    /// Block a task and open a diagnostic task pointed back at it.
    pub fn escalate_task(
        &self,
        actor: &str,
        task_id: &str,
        reason: &str,
    ) -> Result<ApplyOutcome, BoardError> {
        self.with_board(actor, "escalate_task", |board| {
            board.block(task_id, reason, message_tag::BLOCKED)?;

            let diag_task_id = next_task_id(board.snapshot.tasks.keys());
            let diag_title = format!("DIAG {task_id}: {reason}");
            let project_id = board
                .snapshot
                .tasks
                .get(task_id)
                .and_then(|t| t.project_id.clone());
            let mut payload = json!({
                "title": diag_title,
                "assigneeHint": "debugger",
                "relatedTo": task_id,
            });
            if let Some(project_id) = project_id {
                payload["projectId"] = json!(project_id);
            }
            board.emit(
                &diag_task_id,
                EventKind::DiagTaskCreated,
                message_tag::DIAG,
                payload,
            )?;

            let mut outcome = ApplyOutcome::new("escalate_task");
            outcome.task_id = Some(task_id.to_string());
            outcome.status = Some(TaskStatus::Blocked);
            outcome.diag_task_id = Some(diag_task_id);
            outcome.diag_assignee_hint = Some("debugger".to_string());
            Ok(outcome)
        })
    }

    // -- read-only --------------------------------------------------------

    pub fn status(&self, task_id: Option<&str>) -> Result<ApplyOutcome, BoardError> {
        let snapshot = self.load_snapshot()?;
        let mut outcome = ApplyOutcome::new("status");
        match task_id {
            Some(task_id) => {
                let task = snapshot
                    .tasks
                    .get(task_id)
                    .cloned()
                    .ok_or_else(|| BoardError::TaskNotFound(task_id.to_string()))?;
                outcome.task_id = Some(task_id.to_string());
                outcome.task = Some(task);
            }
            None => {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                for task in snapshot.tasks.values() {
                    *counts.entry(task.status.to_string()).or_insert(0) += 1;
                }
                outcome.total = Some(snapshot.tasks.len());
                outcome.counts = Some(counts);
            }
        }
        Ok(outcome)
    }

    /// Report over done/review/blocked tasks plus diagnostic back-pointers.
    pub fn synthesize(&self, task_id: Option<&str>) -> Result<ApplyOutcome, BoardError> {
        let snapshot = self.load_snapshot()?;
        let mut selected: Vec<&Task> = snapshot
            .tasks
            .values()
            .filter(|t| match task_id {
                Some(id) => t.task_id == id,
                None => true,
            })
            .filter(|t| {
                matches!(
                    t.status,
                    TaskStatus::Done | TaskStatus::Review | TaskStatus::Blocked
                ) || t.related_to.is_some()
            })
            .collect();
        selected.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        let mut lines = vec!["SYNTHESIS REPORT".to_string()];
        for task in &selected {
            let detail = task
                .result
                .as_deref()
                .or(task.review.as_deref())
                .or(task.blocked_reason.as_deref())
                .unwrap_or("(no detail)");
            let rel = task
                .related_to
                .as_deref()
                .map(|r| format!(" relatedTo={r}"))
                .unwrap_or_default();
            lines.push(format!(
                "- {} [{}] owner={}{} :: {}",
                task.task_id,
                task.status,
                task.owner.as_deref().unwrap_or("-"),
                rel,
                detail,
            ));
        }
        if lines.len() == 1 {
            lines.push("- no completed/review/blocked tasks found".to_string());
        }

        let mut outcome = ApplyOutcome::new("synthesize");
        outcome.report = Some(lines.join("\n"));
        Ok(outcome)
    }

    // -- internals --------------------------------------------------------

    fn with_board<T>(
        &self,
        actor: &str,
        intent: &str,
        op: impl FnOnce(&mut LockedBoard) -> Result<T, BoardError>,
    ) -> Result<T, BoardError> {
        let now_iso = self.now_iso();
        self.dirs.ensure(&now_iso)?;
        let lock = BoardLock::acquire(
            &self.dirs,
            &format!("apply:{actor}:{intent}"),
            self.clock.as_ref(),
        )?;

        let snapshot = Snapshot::load(&self.dirs.snapshot_path())?;
        let mut board = LockedBoard {
            snapshot,
            journal: Journal::new(self.dirs.journal_path()),
            actor: actor.to_string(),
            now_iso,
            ids: Arc::clone(&self.ids),
            dirty: false,
        };

        let result = op(&mut board)?;

        if board.dirty {
            board
                .snapshot
                .save_with_timestamp(&self.dirs.snapshot_path(), &board.now_iso)?;
        }
        lock.release();
        Ok(result)
    }
}

fn opt(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn intent_name(intent: &Intent) -> &'static str {
    match intent {
        Intent::CreateTask { .. } => "create_task",
        Intent::ClaimTask { .. } => "claim_task",
        Intent::MarkDone { .. } => "mark_done",
        Intent::BlockTask { .. } => "block_task",
        Intent::EscalateTask { .. } => "escalate_task",
        Intent::Status { .. } => "status",
        Intent::Synthesize { .. } => "synthesize",
        Intent::Unknown { .. } => "unknown",
    }
}

/// Board state held while the lock is owned.
struct LockedBoard {
    snapshot: Snapshot,
    journal: Journal,
    actor: String,
    now_iso: String,
    ids: Arc<dyn IdGen>,
    dirty: bool,
}

impl LockedBoard {
    fn require(&self, task_id: &str) -> Result<&Task, BoardError> {
        self.snapshot
            .tasks
            .get(task_id)
            .ok_or_else(|| BoardError::TaskNotFound(task_id.to_string()))
    }

    fn check_transition(&self, from: TaskStatus, to: TaskStatus) -> Result<(), BoardError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(BoardError::InvalidTransition { from, to })
        }
    }

    /// Append an event to the journal and fold it into the snapshot.
    fn emit(
        &mut self,
        task_id: &str,
        kind: EventKind,
        tag: &str,
        payload: serde_json::Value,
    ) -> Result<(), BoardError> {
        let event = BoardEvent::new(
            self.ids.next(),
            task_id,
            kind,
            tag,
            self.actor.clone(),
            self.now_iso.clone(),
            payload,
        );
        self.journal.append(&event)?;
        apply_event(&mut self.snapshot.tasks, &event);
        self.dirty = true;
        Ok(())
    }

    fn block(&mut self, task_id: &str, reason: &str, tag: &str) -> Result<(), BoardError> {
        let prev = self.require(task_id)?.status;
        self.check_transition(prev, TaskStatus::Blocked)?;
        self.emit(
            task_id,
            EventKind::TaskBlocked,
            tag,
            json!({"from": prev, "to": TaskStatus::Blocked, "reason": reason}),
        )
    }
}

#[cfg(test)]
#[path = "board_tests.rs"]
mod tests;
