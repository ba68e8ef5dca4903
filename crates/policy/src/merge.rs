// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-level config merging shared by the policy loaders.

use orc_storage::StateDir;
use serde_json::Value;

/// Deep-merge `override_value` onto `base`. Objects merge recursively;
/// everything else is replaced.
pub fn deep_merge(base: &mut Value, override_value: &Value) {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, value) => *base = value.clone(),
    }
}

/// Load and merge every existing candidate for a named config file,
/// `config/<name>` first, then `state/<name>` as an override.
pub fn merged_config(dirs: &StateDir, name: &str, defaults: Value) -> Value {
    let mut merged = defaults;
    for path in dirs.config_candidates(name) {
        if let Some(loaded) = orc_storage::load_json::<Value>(&path) {
            if loaded.is_object() {
                deep_merge(&mut merged, &loaded);
            }
        }
    }
    merged
}

pub(crate) fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn as_u64(value: Option<&Value>, default: u64) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(default),
        _ => default,
    }
}

pub(crate) fn as_bool(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(default),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        _ => default,
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
