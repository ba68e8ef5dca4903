// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured prompt builder.
//!
//! The worker prompt is a fixed sequence of blocks: `ROLE_STRATEGY`,
//! `KNOWLEDGE_HINTS`, `BOARD_SNAPSHOT`, `TASK_RECENT_HISTORY`,
//! `OUTPUT_SCHEMA`. Blocks with nothing to say are omitted entirely.

use orc_core::BoardEvent;
use orc_policy::{KnowledgeHints, ResolvedStrategy};
use orc_storage::Snapshot;

/// How many snapshot rows the prompt carries.
const SNAPSHOT_ROWS: usize = 20;

/// How many recent events the prompt carries.
const HISTORY_ROWS: usize = 5;

/// The literal reply contract shown to every worker.
const OUTPUT_SCHEMA_BLOCK: &str = r#"OUTPUT_SCHEMA:
Reply with a single JSON object and nothing else:
{
  "status": "done|blocked|progress",
  "summary": "one-paragraph outcome",
  "changes": [{"path": "file touched", "summary": "what changed"}],
  "evidence": ["urls, file paths, or test-pass lines"],
  "risks": ["known risks"],
  "nextActions": ["follow-ups"]
}"#;

/// Inputs for one prompt build.
pub struct PromptInputs<'a> {
    pub strategy: Option<&'a ResolvedStrategy>,
    pub hints: &'a KnowledgeHints,
    pub snapshot: &'a Snapshot,
    pub task_id: &'a str,
    pub task_text: &'a str,
    pub recent_events: &'a [BoardEvent],
}

/// Compose the worker prompt from the fixed block sequence.
pub fn build_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut blocks: Vec<String> = Vec::new();

    if let Some(strategy) = inputs.strategy {
        if strategy.enabled && !strategy.content.is_empty() {
            blocks.push(format!("ROLE_STRATEGY:\n{}", strategy.content));
        }
    }

    if inputs.hints.enabled && !inputs.hints.degraded && !inputs.hints.hints.is_empty() {
        let mut lines = vec!["KNOWLEDGE_HINTS:".to_string()];
        for hint in &inputs.hints.hints {
            lines.push(format!("- {hint}"));
        }
        blocks.push(lines.join("\n"));
    }

    blocks.push(board_snapshot_block(inputs));
    blocks.push(history_block(inputs));

    if !inputs.task_text.trim().is_empty() {
        blocks.push(format!("TASK:\n{}", inputs.task_text.trim()));
    }

    blocks.push(OUTPUT_SCHEMA_BLOCK.to_string());
    blocks.join("\n\n")
}

fn board_snapshot_block(inputs: &PromptInputs<'_>) -> String {
    let mut lines = vec!["BOARD_SNAPSHOT:".to_string()];
    for task in inputs.snapshot.tasks.values().take(SNAPSHOT_ROWS) {
        lines.push(format!(
            "- {} [{}] owner={} :: {}",
            task.task_id,
            task.status,
            task.owner.as_deref().unwrap_or("-"),
            task.title,
        ));
    }
    if inputs.snapshot.tasks.len() > SNAPSHOT_ROWS {
        lines.push(format!(
            "- ... and {} more",
            inputs.snapshot.tasks.len() - SNAPSHOT_ROWS
        ));
    }
    if lines.len() == 1 {
        lines.push("- (board is empty)".to_string());
    }
    lines.join("\n")
}

fn history_block(inputs: &PromptInputs<'_>) -> String {
    let mut lines = vec!["TASK_RECENT_HISTORY:".to_string()];
    let relevant: Vec<&BoardEvent> = inputs
        .recent_events
        .iter()
        .filter(|e| e.task_id == inputs.task_id)
        .collect();
    for event in relevant.iter().rev().take(HISTORY_ROWS).rev() {
        let note = event
            .payload
            .get("reason")
            .or_else(|| event.payload.get("result"))
            .or_else(|| event.payload.get("title"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");
        lines.push(format!(
            "- {} {} by {}{}",
            event.at,
            event.message_type,
            event.actor,
            if note.is_empty() {
                String::new()
            } else {
                format!(" :: {note}")
            },
        ));
    }
    if lines.len() == 1 {
        lines.push("- (no recent events)".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
