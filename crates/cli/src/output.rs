// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope printing helpers shared by every subcommand.

use serde::Serialize;
use serde_json::json;

/// Print a success envelope as a single JSON line; exit code 0.
pub fn emit_ok<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string(value) {
        Ok(line) => {
            println!("{line}");
            0
        }
        Err(e) => emit_error(&format!("failed to serialize output: {e}")),
    }
}

/// Print a failure envelope as a single JSON line; exit code 1.
pub fn emit_error(error: &str) -> i32 {
    let line = json!({"ok": false, "error": error});
    println!("{line}");
    1
}
