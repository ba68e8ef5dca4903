// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derived board snapshot.
//!
//! The snapshot is a cache of the journal fold: `{tasks:{}, meta:{version,
//! updatedAt}}`. Task keys are ordered so a rebuild from the journal is
//! byte-stable. Writes are full rewrites through a temp file + rename.

use orc_core::Task;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub const SNAPSHOT_VERSION: u32 = 2;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid snapshot format: tasks must be object")]
    InvalidFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub version: u32,
    #[serde(default)]
    pub updated_at: String,
}

/// The full task map plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tasks: BTreeMap<String, Task>,
    pub meta: SnapshotMeta,
}

impl Snapshot {
    pub fn empty(now_iso: &str) -> Self {
        Self {
            tasks: BTreeMap::new(),
            meta: SnapshotMeta {
                version: SNAPSHOT_VERSION,
                updated_at: now_iso.to_string(),
            },
        }
    }

    /// Load a snapshot, failing on a malformed task map.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let value: serde_json::Value = serde_json::from_reader(reader)?;
        if !value.get("tasks").map(serde_json::Value::is_object).unwrap_or(false) {
            return Err(SnapshotError::InvalidFormat);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Save atomically (write to .tmp, then rename) with a trailing newline.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self).map_err(io::Error::other)?;
            writer.write_all(b"\n")?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Stamp `meta.updatedAt` and save.
    pub fn save_with_timestamp(&mut self, path: &Path, now_iso: &str) -> io::Result<()> {
        self.meta.updated_at = now_iso.to_string();
        self.meta.version = SNAPSHOT_VERSION;
        self.save(path)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
