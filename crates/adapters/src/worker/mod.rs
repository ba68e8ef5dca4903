// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker executor seam.
//!
//! A worker takes a structured prompt on stdin, runs one task, and emits a
//! JSON reply on stdout. Executors differ only in how the subprocess is
//! shaped; the dispatcher owns parsing and grading of the reply.

pub mod bridge;
pub mod cli;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// One worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub task_id: String,
    pub agent: String,
    pub prompt: String,
    pub timeout: Duration,
    /// Working directory for the worker, when the executor honors one.
    pub workspace: Option<PathBuf>,
}

/// Captured worker output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl WorkerOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

/// Errors from a worker spawn. Timeouts force-terminate the subprocess and
/// surface as `spawn_failed` upstream.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("worker spawn failed: {0}")]
    Spawn(String),
    #[error("worker timed out after {0}s")]
    Timeout(u64),
}

impl From<crate::SpawnFailure> for WorkerError {
    fn from(failure: crate::SpawnFailure) -> Self {
        match failure {
            crate::SpawnFailure::Timeout { timeout_sec, .. } => WorkerError::Timeout(timeout_sec),
            other => WorkerError::Spawn(other.to_string()),
        }
    }
}

/// Spawns one worker and captures its structured stdout.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    async fn run(&self, request: &WorkerRequest) -> Result<WorkerOutput, WorkerError>;

    /// Short executor name for logs and dispatch envelopes.
    fn name(&self) -> &'static str;
}
