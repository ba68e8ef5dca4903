// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-adapters: worker executors and subprocess helpers.
//!
//! Executors sit behind the [`worker::WorkerExecutor`] seam so the engine
//! can spawn real agent CLIs in production and a fake in tests.

pub mod subprocess;
pub mod worker;

pub use subprocess::{run_with_stdin, run_with_timeout, SpawnFailure};
pub use worker::{WorkerError, WorkerExecutor, WorkerOutput, WorkerRequest};

#[cfg(any(test, feature = "test-support"))]
pub use worker::fake::{FakeWorker, WorkerCall};
