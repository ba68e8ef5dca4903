// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority / readiness engine.
//!
//! A pure function of the task map: evaluates readiness from the
//! dependency and blocker graphs, scores runnable tasks, and selects the
//! head of the ready queue with a deterministic tie-break (highest score
//! first, then ascending task id).

use orc_core::{normalize_task_id, Task, TaskStatus};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

static TASK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("constant regex pattern is valid"));

/// Score bonus per runnable status.
fn status_bonus(status: TaskStatus) -> f64 {
    match status {
        TaskStatus::Pending => 0.0,
        TaskStatus::Claimed => 2.0,
        TaskStatus::InProgress => 3.0,
        TaskStatus::Review => 1.0,
        _ => 0.0,
    }
}

fn is_runnable(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Pending | TaskStatus::Claimed | TaskStatus::InProgress | TaskStatus::Review
    )
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Per-task readiness evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvaluation {
    pub task_id: String,
    pub runnable: bool,
    pub ready: bool,
    pub status: String,
    pub score: Option<f64>,
    pub priority: f64,
    pub impact: f64,
    pub depends_on: Vec<String>,
    pub blocked_by: Vec<String>,
    pub reason_code: String,
    pub reason: String,
}

/// One row of the ready queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyRow {
    pub task_id: String,
    pub score: f64,
    pub reason: String,
    pub reason_code: String,
}

/// The selection record carried on dispatch envelopes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRow {
    pub task_id: String,
    pub score: Option<f64>,
    pub reason_code: String,
    pub reason: String,
}

/// Full selection outcome, including per-task evaluations for
/// observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOutcome {
    pub selected_task_id: String,
    pub selected_score: Option<f64>,
    pub reason_code: String,
    pub reason: String,
    pub ready_queue: Vec<ReadyRow>,
    pub evaluations: BTreeMap<String, TaskEvaluation>,
    pub selection: SelectionRow,
}

impl SelectOutcome {
    pub fn selected(&self) -> Option<&str> {
        if self.selected_task_id.is_empty() {
            None
        } else {
            Some(&self.selected_task_id)
        }
    }

    fn rejection(reason_code: &str, reason: String, task_id: String) -> Self {
        Self {
            selected_task_id: String::new(),
            selected_score: None,
            reason_code: reason_code.to_string(),
            reason: reason.clone(),
            ready_queue: Vec::new(),
            evaluations: BTreeMap::new(),
            selection: SelectionRow {
                task_id,
                score: None,
                reason_code: reason_code.to_string(),
                reason,
            },
        }
    }
}

fn looks_like_task_id(token: &str) -> bool {
    TASK_ID_RE.is_match(token)
}

fn status_of(tasks: &BTreeMap<String, &Task>, id: &str) -> Option<TaskStatus> {
    tasks.get(id).map(|t| t.status)
}

fn dependency_blockers(depends_on: &[String], tasks: &BTreeMap<String, &Task>) -> Vec<String> {
    let mut unresolved = Vec::new();
    for dep in depends_on {
        let dep_id = normalize_task_id(dep);
        match status_of(tasks, &dep_id) {
            None => unresolved.push(format!("{dep_id}(missing)")),
            Some(TaskStatus::Done) => {}
            Some(status) => unresolved.push(format!("{dep_id}({status})")),
        }
    }
    unresolved
}

fn blocked_by_reasons(blocked_by: &[String], tasks: &BTreeMap<String, &Task>) -> Vec<String> {
    let mut unresolved = Vec::new();
    for token in blocked_by {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let normalized = normalize_task_id(token);
        if looks_like_task_id(&normalized) {
            match status_of(tasks, &normalized) {
                // Unknown task-id-shaped refs keep text-blocker semantics
                None => unresolved.push(token.to_string()),
                Some(TaskStatus::Done) => {}
                Some(status) => unresolved.push(format!("{normalized}({status})")),
            }
        } else {
            // Non-task blockers are always unresolved text blockers
            unresolved.push(token.to_string());
        }
    }
    unresolved
}

fn evaluate(task: &Task, tasks: &BTreeMap<String, &Task>) -> TaskEvaluation {
    let task_id = normalize_task_id(&task.task_id);
    let status = task.status;
    let priority = if task.priority.is_finite() {
        task.priority
    } else {
        0.0
    };
    let impact = if task.impact.is_finite() {
        task.impact
    } else {
        0.0
    };

    if !is_runnable(status) {
        return TaskEvaluation {
            task_id,
            runnable: false,
            ready: false,
            status: status.to_string(),
            score: None,
            priority,
            impact,
            depends_on: task.depends_on.clone(),
            blocked_by: task.blocked_by.clone(),
            reason_code: "status_not_runnable".to_string(),
            reason: format!("status={status} not runnable"),
        };
    }

    let missing_deps = dependency_blockers(&task.depends_on, tasks);
    let blockers = blocked_by_reasons(&task.blocked_by, tasks);
    let ready = missing_deps.is_empty() && blockers.is_empty();

    if !ready {
        let mut pieces = Vec::new();
        if !missing_deps.is_empty() {
            pieces.push(format!("dependsOn unresolved: {}", missing_deps.join(", ")));
        }
        if !blockers.is_empty() {
            pieces.push(format!("blockedBy unresolved: {}", blockers.join(", ")));
        }
        return TaskEvaluation {
            task_id,
            runnable: true,
            ready: false,
            status: status.to_string(),
            score: None,
            priority,
            impact,
            depends_on: task.depends_on.clone(),
            blocked_by: task.blocked_by.clone(),
            reason_code: "dependencies_unmet".to_string(),
            reason: pieces.join(" | "),
        };
    }

    let score = round6(priority * 10.0 + impact * 5.0 + status_bonus(status));
    let reason = format!(
        "ready; score={score:.3} (priority={priority}, impact={impact}, status={status}, dependsOn={}, blockedBy={})",
        task.depends_on.len(),
        task.blocked_by.len(),
    );
    TaskEvaluation {
        task_id,
        runnable: true,
        ready: true,
        status: status.to_string(),
        score: Some(score),
        priority,
        impact,
        depends_on: task.depends_on.clone(),
        blocked_by: task.blocked_by.clone(),
        reason_code: "ready_scored".to_string(),
        reason,
    }
}

/// Evaluate one task against the full task map.
pub fn evaluate_task(task: &Task, all_tasks: &BTreeMap<String, Task>) -> TaskEvaluation {
    evaluate(task, &normalize_map(all_tasks))
}

fn normalize_map(tasks: &BTreeMap<String, Task>) -> BTreeMap<String, &Task> {
    let mut out = BTreeMap::new();
    for task in tasks.values() {
        let id = normalize_task_id(&task.task_id);
        if !id.is_empty() {
            out.insert(id, task);
        }
    }
    out
}

/// Select the next runnable task.
///
/// A requested id that is missing, excluded, or not ready returns a typed
/// rejection - never a fallback selection. Otherwise the ready queue is
/// sorted by `(-score, taskId)` and the head wins.
pub fn select_task(
    tasks: &BTreeMap<String, Task>,
    requested_task_id: Option<&str>,
    excluded: &HashSet<String>,
) -> SelectOutcome {
    let excluded: HashSet<String> = excluded
        .iter()
        .map(|id| normalize_task_id(id))
        .filter(|id| !id.is_empty())
        .collect();
    let normalized = normalize_map(tasks);

    if let Some(requested) = requested_task_id.filter(|r| !r.trim().is_empty()) {
        let req_id = normalize_task_id(requested);
        let req_task = normalized.get(&req_id);
        let (Some(req_task), false) = (req_task, excluded.contains(&req_id)) else {
            return SelectOutcome::rejection(
                "requested_not_found_or_excluded",
                format!("requested task unavailable: {req_id}"),
                req_id,
            );
        };

        let evaluation = evaluate(req_task, &normalized);
        if !evaluation.ready {
            let reason = if evaluation.reason.is_empty() {
                "requested task is not ready".to_string()
            } else {
                evaluation.reason.clone()
            };
            let mut outcome = SelectOutcome::rejection(
                "requested_task_not_ready",
                reason,
                req_id.clone(),
            );
            outcome.evaluations.insert(req_id, evaluation);
            return outcome;
        }

        let score = evaluation.score.unwrap_or(0.0);
        let mut evaluations = BTreeMap::new();
        evaluations.insert(req_id.clone(), evaluation);
        return SelectOutcome {
            selected_task_id: req_id.clone(),
            selected_score: Some(score),
            reason_code: "requested_task_selected".to_string(),
            reason: "requested task selected from ready state".to_string(),
            ready_queue: Vec::new(),
            evaluations,
            selection: SelectionRow {
                task_id: req_id,
                score: Some(score),
                reason_code: "requested_task_selected".to_string(),
                reason: "requested task selected from ready state".to_string(),
            },
        };
    }

    let mut evaluations = BTreeMap::new();
    let mut ready_rows: Vec<ReadyRow> = Vec::new();
    for (task_id, task) in &normalized {
        if excluded.contains(task_id) {
            continue;
        }
        let evaluation = evaluate(task, &normalized);
        if evaluation.ready {
            ready_rows.push(ReadyRow {
                task_id: task_id.clone(),
                score: evaluation.score.unwrap_or(0.0),
                reason: evaluation.reason.clone(),
                reason_code: evaluation.reason_code.clone(),
            });
        }
        evaluations.insert(task_id.clone(), evaluation);
    }

    ready_rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });

    let Some(top) = ready_rows.first() else {
        let mut outcome = SelectOutcome::rejection(
            "no_ready_task",
            "no task in ready queue".to_string(),
            String::new(),
        );
        outcome.evaluations = evaluations;
        return outcome;
    };

    SelectOutcome {
        selected_task_id: top.task_id.clone(),
        selected_score: Some(top.score),
        reason_code: "selected_from_ready_queue".to_string(),
        reason: format!("selected {} from ready queue", top.task_id),
        selection: SelectionRow {
            task_id: top.task_id.clone(),
            score: Some(top.score),
            reason_code: top.reason_code.clone(),
            reason: top.reason.clone(),
        },
        ready_queue: ready_rows,
        evaluations,
    }
}

#[cfg(test)]
#[path = "priority_tests.rs"]
mod tests;
