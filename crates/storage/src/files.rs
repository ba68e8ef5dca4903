// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small JSON file helpers shared by the keyed state files.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use tracing::warn;

/// Load a JSON file, returning `None` when missing or unreadable.
///
/// Corruption is tolerated (logged at warn) so a bad state file degrades to
/// defaults instead of wedging the control plane.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to open state file");
            return None;
        }
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt state file, using defaults");
            None
        }
    }
}

/// Save a JSON file atomically (tmp + rename) with a trailing newline.
pub fn save_json_pretty<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        let body = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        file.write_all(body.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Append one JSON value as a line. Opens with `O_APPEND` so concurrent
/// appenders do not interleave within a line on typical filesystems.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(value).map_err(io::Error::other)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Read every parseable JSON object line from a JSONL file.
///
/// Unparseable lines are skipped with a warning rather than failing the
/// whole read.
pub fn read_jsonl_values(path: &Path) -> io::Result<Vec<serde_json::Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => out.push(value),
            Err(e) => {
                warn!(path = %path.display(), line = idx + 1, error = %e, "skipping corrupt jsonl line");
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod tests;
