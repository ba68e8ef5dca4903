// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured sub-worker bridge for the `coder` role.
//!
//! Drives a `codex`-style CLI that accepts an output schema and writes its
//! final message to a file. The bridge never propagates process failures as
//! errors: a bad exit or empty output is converted into a structured
//! `blocked` reply so the acceptance gate can grade it like any other.

use super::{WorkerError, WorkerExecutor, WorkerOutput, WorkerRequest};
use crate::run_with_stdin;
use async_trait::async_trait;
use orc_core::reply::clip;
use serde_json::json;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

/// Bridge to a structured sub-worker CLI.
#[derive(Debug, Clone)]
pub struct SubWorkerBridge {
    program: String,
    /// Fallback working directory when the request has none.
    default_workspace: Option<PathBuf>,
}

impl SubWorkerBridge {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            default_workspace: dirs::home_dir(),
        }
    }

    pub fn with_default_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.default_workspace = Some(workspace.into());
        self
    }

    fn reply_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "additionalProperties": true,
            "properties": {
                "taskId": {"type": "string"},
                "agent": {"type": "string"},
                "status": {"type": "string", "enum": ["done", "blocked", "progress"]},
                "summary": {"type": "string"},
                "changes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": true,
                        "properties": {
                            "path": {"type": "string"},
                            "summary": {"type": "string"},
                        },
                    },
                },
                "evidence": {"type": "array", "items": {"type": "string"}},
                "risks": {"type": "array", "items": {"type": "string"}},
                "nextActions": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["status", "summary"],
        })
    }

    fn blocked_reply(request: &WorkerRequest, reason: &str, evidence: Vec<String>) -> WorkerOutput {
        let reply = json!({
            "taskId": request.task_id,
            "agent": request.agent,
            "status": "blocked",
            "summary": clip(reason, 500),
            "changes": [],
            "evidence": evidence.iter().map(|e| clip(e, 220)).filter(|e| !e.is_empty()).collect::<Vec<_>>(),
            "risks": [],
            "nextActions": ["hand off for manual review with execution context"],
        });
        WorkerOutput::ok(reply.to_string())
    }
}

impl Default for SubWorkerBridge {
    fn default() -> Self {
        Self::new("codex")
    }
}

#[async_trait]
impl WorkerExecutor for SubWorkerBridge {
    async fn run(&self, request: &WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        let scratch = std::env::temp_dir().join(format!("orc-bridge-{}", uuid::Uuid::new_v4()));
        if let Err(e) = std::fs::create_dir_all(&scratch) {
            return Ok(Self::blocked_reply(
                request,
                &format!("bridge scratch dir failed: {e}"),
                Vec::new(),
            ));
        }
        let schema_path = scratch.join("schema.json");
        let out_path = scratch.join("output.json");
        if let Err(e) = std::fs::write(
            &schema_path,
            serde_json::to_string_pretty(&Self::reply_schema()).unwrap_or_default(),
        ) {
            let _ = std::fs::remove_dir_all(&scratch);
            return Ok(Self::blocked_reply(
                request,
                &format!("bridge schema write failed: {e}"),
                Vec::new(),
            ));
        }

        let workspace = request
            .workspace
            .clone()
            .or_else(|| self.default_workspace.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut cmd = Command::new(&self.program);
        cmd.args([
            "exec",
            "--dangerously-bypass-approvals-and-sandbox",
            "--skip-git-repo-check",
            "--cd",
        ]);
        cmd.arg(&workspace);
        cmd.arg("--output-schema");
        cmd.arg(&schema_path);
        cmd.arg("--output-last-message");
        cmd.arg(&out_path);
        cmd.arg("-");

        debug!(agent = %request.agent, task_id = %request.task_id, program = %self.program, "spawning sub-worker bridge");
        // The sub-worker gets a little slack beyond the task timeout so its
        // own cleanup can finish before the hard kill.
        let timeout = request.timeout + std::time::Duration::from_secs(20);
        let spawn = run_with_stdin(
            cmd,
            &request.prompt,
            timeout,
            &format!("sub-worker bridge for {}", request.agent),
        )
        .await;

        let output = match spawn {
            Ok(output) => output,
            Err(failure) => {
                warn!(error = %failure, "sub-worker bridge spawn failed");
                let _ = std::fs::remove_dir_all(&scratch);
                return Ok(Self::blocked_reply(
                    request,
                    &format!("sub-worker exec failed: {failure}"),
                    Vec::new(),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let last_message = std::fs::read_to_string(&out_path)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let _ = std::fs::remove_dir_all(&scratch);

        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            return Ok(Self::blocked_reply(
                request,
                &format!("sub-worker exec exit={exit_code}"),
                vec![stderr, stdout],
            ));
        }

        // Prefer the structured last-message file over raw stdout
        let body = if last_message.is_empty() {
            stdout.clone()
        } else {
            last_message
        };
        if body.is_empty() {
            return Ok(Self::blocked_reply(
                request,
                "sub-worker output is empty or invalid",
                vec![stdout, stderr],
            ));
        }

        Ok(WorkerOutput {
            stdout: body,
            stderr,
            exit_code: 0,
        })
    }

    fn name(&self) -> &'static str {
        "sub-worker-bridge"
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
