// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for the orc task orchestrator.
//!
//! The `state/` directory under a run root is the sole owner of mutable
//! state: an append-only event journal, a derived snapshot, keyed JSON
//! state files, and an exclusive TTL file lock serializing mutations.

mod files;
mod journal;
mod lock;
mod paths;
mod rebuild;
mod snapshot;
mod state;

pub use files::{append_jsonl, load_json, read_jsonl_values, save_json_pretty};
pub use journal::{Journal, JournalError};
pub use lock::{BoardLock, LockError, LockMeta, LOCK_POLL_MS, LOCK_TTL_SEC, LOCK_WAIT_MS};
pub use paths::StateDir;
pub use rebuild::{rebuild_snapshot, RebuildError, RebuildReport};
pub use snapshot::{Snapshot, SnapshotError, SnapshotMeta, SNAPSHOT_VERSION};
pub use state::apply_event;
