// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event fold: applies one board event to the task map.
//!
//! Both the live board and the rebuild tool go through this fold, so a
//! replay of the journal reproduces the snapshot exactly.

use orc_core::{BoardEvent, EventKind, Task, TaskStatus};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

fn payload_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Apply one event to the task map.
///
/// The fold is tolerant: events referencing unknown tasks are skipped with
/// a warning so one bad journal line cannot wedge a rebuild.
pub fn apply_event(tasks: &mut BTreeMap<String, Task>, event: &BoardEvent) {
    match event.kind {
        EventKind::TaskCreated | EventKind::DiagTaskCreated => {
            let title = payload_str(&event.payload, "title").unwrap_or("untitled");
            let assignee = payload_str(&event.payload, "assigneeHint").unwrap_or_default();
            let mut task = Task::new(
                event.task_id.clone(),
                title,
                event.actor.clone(),
                assignee,
                &event.at,
            );
            task.related_to = payload_str(&event.payload, "relatedTo").map(str::to_string);
            task.project_id = payload_str(&event.payload, "projectId").map(str::to_string);
            task.history.push(event.event_id.clone());
            tasks.insert(event.task_id.clone(), task);
        }
        EventKind::TaskClaimed => {
            let Some(task) = tasks.get_mut(&event.task_id) else {
                warn!(task_id = %event.task_id, "claim event for unknown task, skipping");
                return;
            };
            if let Some(to) = payload_str(&event.payload, "to").and_then(TaskStatus::parse) {
                task.status = to;
            }
            if let Some(owner) = payload_str(&event.payload, "owner") {
                task.owner = Some(owner.to_string());
            }
            task.updated_at = event.at.clone();
            task.history.push(event.event_id.clone());
        }
        EventKind::TaskDone => {
            let Some(task) = tasks.get_mut(&event.task_id) else {
                warn!(task_id = %event.task_id, "done event for unknown task, skipping");
                return;
            };
            task.status = TaskStatus::Done;
            if let Some(result) = payload_str(&event.payload, "result") {
                task.result = Some(result.to_string());
            }
            if let Some(owner) = payload_str(&event.payload, "owner") {
                task.owner = Some(owner.to_string());
            }
            task.updated_at = event.at.clone();
            task.history.push(event.event_id.clone());
        }
        EventKind::TaskBlocked => {
            let Some(task) = tasks.get_mut(&event.task_id) else {
                warn!(task_id = %event.task_id, "block event for unknown task, skipping");
                return;
            };
            task.status = TaskStatus::Blocked;
            if let Some(reason) = payload_str(&event.payload, "reason") {
                task.blocked_reason = Some(reason.to_string());
            }
            task.updated_at = event.at.clone();
            task.history.push(event.event_id.clone());
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
