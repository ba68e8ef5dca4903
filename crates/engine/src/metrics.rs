// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only operational metrics with windowed aggregation.
//!
//! Events are single JSONL rows appended without the board lock (the file
//! is opened append-only). Aggregation over an N-day window produces
//! throughput, success rate, blocked-reason distribution, recovery rate,
//! and the average dispatch cycle time.

use orc_core::{time_fmt, Clock};
use orc_storage::{append_jsonl, read_jsonl_values, StateDir};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

pub const EVENT_DISPATCH_DONE: &str = "dispatch_done";
pub const EVENT_DISPATCH_BLOCKED: &str = "dispatch_blocked";
pub const EVENT_RECOVERY_SCHEDULED: &str = "recovery_scheduled";
pub const EVENT_RECOVERY_ESCALATED: &str = "recovery_escalated";
pub const EVENT_SCHEDULER_TICK: &str = "scheduler_tick";

/// Aggregated window summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub window_days: u32,
    pub events_considered: usize,
    pub throughput_completed: u64,
    pub success_rate: f64,
    pub blocked_reason_distribution: BTreeMap<String, u64>,
    pub recovery_rate: f64,
    pub average_cycle_ms: f64,
    pub counts: MetricsCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsCounts {
    pub dispatch_done: u64,
    pub dispatch_blocked: u64,
    pub recovery_scheduled: u64,
    pub recovery_escalated: u64,
    pub scheduler_tick: u64,
    pub resolved: u64,
}

impl MetricsSummary {
    /// One-line operator summary with the top-3 blocked reasons.
    pub fn format_line(&self) -> String {
        let mut reasons: Vec<(&String, &u64)> = self.blocked_reason_distribution.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let blocked = if reasons.is_empty() {
            "-".to_string()
        } else {
            reasons
                .iter()
                .take(3)
                .map(|(reason, count)| format!("{reason}:{count}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "ops last {}d | done={} | success={:.1}% | recovery={:.1}% | avg cycle={:.0}ms | blocked={}",
            self.window_days,
            self.throughput_completed,
            self.success_rate * 100.0,
            self.recovery_rate * 100.0,
            self.average_cycle_ms,
            blocked,
        )
    }
}

/// Metrics log bound to one run root.
#[derive(Clone)]
pub struct MetricsLog {
    dirs: StateDir,
    clock: Arc<dyn Clock>,
}

impl MetricsLog {
    pub fn new(dirs: StateDir, clock: Arc<dyn Clock>) -> Self {
        Self { dirs, clock }
    }

    /// Append one metric event. Payload keys never shadow `event`/`at`/`ts`.
    pub fn append(&self, event: &str, payload: Value) -> io::Result<Value> {
        let mut row = json!({
            "event": event.trim(),
            "at": time_fmt::iso(self.clock.now()),
            "ts": self.clock.now_ts(),
        });
        if let (Some(row_map), Some(payload_map)) = (row.as_object_mut(), payload.as_object()) {
            for (key, value) in payload_map {
                if key == "event" || key == "at" || key == "ts" {
                    continue;
                }
                row_map.insert(key.clone(), value.clone());
            }
        }
        append_jsonl(&self.dirs.metrics_path(), &row)?;
        Ok(row)
    }

    /// Load events inside the window, newest last. Rows without a usable
    /// timestamp are dropped.
    pub fn load(&self, days: u32) -> io::Result<Vec<Value>> {
        let rows = read_jsonl_values(&self.dirs.metrics_path())?;
        let days = if days == 0 { 7 } else { days };
        let cutoff = self.clock.now_ts() - (days as i64) * 86_400;

        Ok(rows
            .into_iter()
            .filter(|row| match event_ts(row) {
                Some(ts) => ts >= cutoff,
                None => false,
            })
            .collect())
    }

    /// Aggregate the window into a summary.
    pub fn aggregate(&self, days: u32) -> io::Result<MetricsSummary> {
        let days = if days == 0 { 7 } else { days };
        let rows = self.load(days)?;

        let mut counts = MetricsCounts {
            dispatch_done: 0,
            dispatch_blocked: 0,
            recovery_scheduled: 0,
            recovery_escalated: 0,
            scheduler_tick: 0,
            resolved: 0,
        };
        let mut blocked_reasons: BTreeMap<String, u64> = BTreeMap::new();
        let mut cycle_total = 0.0;
        let mut cycle_count = 0u64;

        for row in &rows {
            let event = row.get("event").and_then(Value::as_str).unwrap_or("");
            match event {
                EVENT_DISPATCH_DONE => counts.dispatch_done += 1,
                EVENT_DISPATCH_BLOCKED => {
                    counts.dispatch_blocked += 1;
                    let reason = row
                        .get("reasonCode")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .unwrap_or("unknown");
                    *blocked_reasons.entry(reason.to_string()).or_insert(0) += 1;
                }
                EVENT_RECOVERY_SCHEDULED => counts.recovery_scheduled += 1,
                EVENT_RECOVERY_ESCALATED => counts.recovery_escalated += 1,
                EVENT_SCHEDULER_TICK => counts.scheduler_tick += 1,
                _ => {}
            }

            if event == EVENT_DISPATCH_DONE || event == EVENT_DISPATCH_BLOCKED {
                if let Some(cycle_ms) = row.get("cycleMs").and_then(Value::as_f64) {
                    if cycle_ms >= 0.0 {
                        cycle_total += cycle_ms;
                        cycle_count += 1;
                    }
                }
            }
        }

        counts.resolved = counts.dispatch_done + counts.dispatch_blocked;
        let success_rate = if counts.resolved > 0 {
            counts.dispatch_done as f64 / counts.resolved as f64
        } else {
            0.0
        };
        let recovery_total = counts.recovery_scheduled + counts.recovery_escalated;
        let recovery_rate = if recovery_total > 0 {
            counts.recovery_scheduled as f64 / recovery_total as f64
        } else {
            0.0
        };
        let average_cycle_ms = if cycle_count > 0 {
            cycle_total / cycle_count as f64
        } else {
            0.0
        };

        Ok(MetricsSummary {
            window_days: days,
            events_considered: rows.len(),
            throughput_completed: counts.dispatch_done,
            success_rate,
            blocked_reason_distribution: blocked_reasons,
            recovery_rate,
            average_cycle_ms,
            counts,
        })
    }
}

/// Timestamp of a metric row: numeric `ts` first, ISO `at` as fallback.
fn event_ts(row: &Value) -> Option<i64> {
    if let Some(ts) = row.get("ts").and_then(Value::as_i64) {
        if ts >= 0 {
            return Some(ts);
        }
    }
    row.get("at")
        .and_then(Value::as_str)
        .and_then(time_fmt::parse_iso_ts)
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
