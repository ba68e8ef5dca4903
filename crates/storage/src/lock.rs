// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive board lock with TTL takeover.
//!
//! Acquisition is atomic create-exclusive on `state/locks/task-board.lock`.
//! On collision the existing lock's `expiresAtTs` is read; expired locks are
//! forcibly removed and the attempt retried. Otherwise the caller polls
//! every ~120 ms until the wait deadline, then fails with lock-busy.
//! Release is token-verified: if another token occupies the file, release
//! is a no-op.

use crate::StateDir;
use orc_core::{time_fmt, Clock};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Lock time-to-live. A holder that dies is taken over after this long.
pub const LOCK_TTL_SEC: i64 = 45;

/// How long an acquirer waits before giving up.
pub const LOCK_WAIT_MS: u64 = 8_000;

/// Poll interval while waiting for the lock.
pub const LOCK_POLL_MS: u64 = 120;

/// Errors that can occur acquiring or releasing the board lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock busy: {0}")]
    Busy(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Payload written into the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockMeta {
    pub token: String,
    pub owner: String,
    pub pid: u32,
    pub created_at: String,
    pub expires_at_ts: i64,
}

/// Held board lock. Released on drop; release verifies the token.
pub struct BoardLock {
    path: PathBuf,
    token: String,
    released: bool,
}

impl BoardLock {
    /// Acquire with the default wait deadline.
    pub fn acquire(dirs: &StateDir, owner: &str, clock: &dyn Clock) -> Result<Self, LockError> {
        Self::acquire_with(dirs, owner, clock, Duration::from_millis(LOCK_WAIT_MS))
    }

    /// Acquire with an explicit wait deadline.
    pub fn acquire_with(
        dirs: &StateDir,
        owner: &str,
        clock: &dyn Clock,
        wait: Duration,
    ) -> Result<Self, LockError> {
        let path = dirs.board_lock_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait;

        loop {
            let now_ts = clock.now_ts();
            let meta = LockMeta {
                token: token.clone(),
                owner: owner.to_string(),
                pid: std::process::id(),
                created_at: time_fmt::iso(clock.now()),
                expires_at_ts: now_ts + LOCK_TTL_SEC,
            };

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let body = serde_json::to_string(&meta).map_err(io::Error::other)?;
                    file.write_all(body.as_bytes())?;
                    file.write_all(b"\n")?;
                    debug!(owner, path = %path.display(), "board lock acquired");
                    return Ok(Self {
                        path,
                        token,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path, now_ts) {
                        warn!(path = %path.display(), "removing stale board lock");
                        match std::fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(_) => {}
                        }
                    }
                    if Instant::now() >= deadline {
                        return Err(LockError::Busy(path));
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_POLL_MS));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Release explicitly. A no-op if another token holds the file.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let meta: Option<LockMeta> = crate::load_json(&self.path);
        match meta {
            Some(meta) if meta.token == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!(path = %self.path.display(), error = %e, "failed to release board lock");
                    }
                }
            }
            _ => {
                // Another holder took over (TTL expiry); leave the file alone.
            }
        }
    }
}

impl Drop for BoardLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// A lock is stale when its payload is unreadable or its TTL has passed.
fn is_stale(path: &std::path::Path, now_ts: i64) -> bool {
    match crate::load_json::<LockMeta>(path) {
        Some(meta) => meta.expires_at_ts > 0 && meta.expires_at_ts <= now_ts,
        None => true,
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
