// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake worker executor for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{WorkerError, WorkerExecutor, WorkerOutput, WorkerRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Recorded call to [`FakeWorker`].
#[derive(Debug, Clone)]
pub struct WorkerCall {
    pub task_id: String,
    pub agent: String,
    pub prompt: String,
}

/// Fake worker executor.
///
/// Returns queued outputs in order and records every request. When the
/// queue is empty it falls back to a fixed progress reply.
#[derive(Clone, Default)]
pub struct FakeWorker {
    inner: Arc<Mutex<FakeWorkerState>>,
}

#[derive(Default)]
struct FakeWorkerState {
    queued: VecDeque<Result<WorkerOutput, WorkerError>>,
    calls: Vec<WorkerCall>,
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one stdout body to return on the next run.
    pub fn push_output(&self, stdout: impl Into<String>) {
        self.inner
            .lock()
            .queued
            .push_back(Ok(WorkerOutput::ok(stdout)));
    }

    /// Queue one error to return on the next run.
    pub fn push_error(&self, error: WorkerError) {
        self.inner.lock().queued.push_back(Err(error));
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<WorkerCall> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }
}

#[async_trait]
impl WorkerExecutor for FakeWorker {
    async fn run(&self, request: &WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        let mut inner = self.inner.lock();
        inner.calls.push(WorkerCall {
            task_id: request.task_id.clone(),
            agent: request.agent.clone(),
            prompt: request.prompt.clone(),
        });
        inner.queued.pop_front().unwrap_or_else(|| {
            Ok(WorkerOutput::ok(
                r#"{"status":"progress","summary":"still working"}"#,
            ))
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
