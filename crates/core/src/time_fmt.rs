// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp formatting helpers.
//!
//! All persisted times are ISO-8601 UTC with a trailing `Z` at second
//! precision, e.g. `2026-03-01T12:00:00Z`.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Format a time as ISO-8601 UTC at second precision.
pub fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time in the persisted ISO format.
pub fn now_iso(clock: &dyn crate::Clock) -> String {
    iso(clock.now())
}

/// Format unix seconds in the persisted ISO format. Negative values clamp to
/// the epoch.
pub fn iso_from_ts(ts: i64) -> String {
    let ts = ts.max(0);
    match Utc.timestamp_opt(ts, 0).single() {
        Some(at) => iso(at),
        None => iso(DateTime::<Utc>::UNIX_EPOCH),
    }
}

/// Parse a persisted ISO timestamp back to unix seconds.
pub fn parse_iso_ts(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.timestamp())
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
