// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic agent-CLI executor.
//!
//! Runs an external agent command with the prompt on stdin and captures
//! stdout. This is the default executor for every role that has no
//! structured bridge.

use super::{WorkerError, WorkerExecutor, WorkerOutput, WorkerRequest};
use crate::run_with_stdin;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// External agent CLI invoked as `<program> <args…> --agent <agent>`.
#[derive(Debug, Clone)]
pub struct AgentCliExecutor {
    program: String,
    args: Vec<String>,
}

impl AgentCliExecutor {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }
}

impl Default for AgentCliExecutor {
    fn default() -> Self {
        Self {
            program: "openclaw".to_string(),
            args: vec!["agent".to_string(), "exec".to_string(), "--json".to_string()],
        }
    }
}

#[async_trait]
impl WorkerExecutor for AgentCliExecutor {
    async fn run(&self, request: &WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.arg("--agent").arg(&request.agent);
        if let Some(workspace) = &request.workspace {
            cmd.current_dir(workspace);
        }

        debug!(agent = %request.agent, task_id = %request.task_id, program = %self.program, "spawning agent cli");
        let output = run_with_stdin(
            cmd,
            &request.prompt,
            request.timeout,
            &format!("agent cli for {}", request.agent),
        )
        .await?;

        Ok(WorkerOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn name(&self) -> &'static str {
        "agent-cli"
    }
}
