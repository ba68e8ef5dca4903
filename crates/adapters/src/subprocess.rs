// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Why a subprocess run did not produce an output.
#[derive(Debug, Error)]
pub enum SpawnFailure {
    #[error("{description} failed: {message}")]
    Io { description: String, message: String },
    #[error("{description} timed out after {timeout_sec}s")]
    Timeout {
        description: String,
        timeout_sec: u64,
    },
}

impl SpawnFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SpawnFailure::Timeout { .. })
    }
}

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`. The child process
/// is killed automatically if the timeout elapses (via `kill_on_drop`).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, SpawnFailure> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(SpawnFailure::Io {
            description: description.to_string(),
            message: io_err.to_string(),
        }),
        Err(_elapsed) => Err(SpawnFailure::Timeout {
            description: description.to_string(),
            timeout_sec: timeout.as_secs(),
        }),
    }
}

/// Run a subprocess with `input` written to its stdin, under a timeout.
pub async fn run_with_stdin(
    mut cmd: Command,
    input: &str,
    timeout: Duration,
    description: &str,
) -> Result<Output, SpawnFailure> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let io_failure = |message: String| SpawnFailure::Io {
        description: description.to_string(),
        message,
    };

    let mut child = cmd.spawn().map_err(|e| io_failure(e.to_string()))?;
    if let Some(mut stdin) = child.stdin.take() {
        // A child that exits before reading breaks the pipe; its exit
        // status is still the authoritative result
        if let Err(e) = stdin.write_all(input.as_bytes()).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(io_failure(e.to_string()));
            }
        }
        // Close stdin so the child sees EOF
        drop(stdin);
    }

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(io_failure(io_err.to_string())),
        Err(_elapsed) => Err(SpawnFailure::Timeout {
            description: description.to_string(),
            timeout_sec: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
