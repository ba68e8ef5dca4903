// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn keys_are_sorted_with_tight_separators() {
    let value = json!({"b": 1, "a": {"z": true, "m": null}});
    assert_eq!(canonical_json(&value), r#"{"a":{"m":null,"z":true},"b":1}"#);
}

#[test]
fn arrays_preserve_order() {
    let value = json!([3, 1, 2]);
    assert_eq!(canonical_json(&value), "[3,1,2]");
}

#[test]
fn strings_escape_ascii_controls() {
    let value = json!({"s": "line\nbreak\ttab \"quote\" back\\slash"});
    assert_eq!(
        canonical_json(&value),
        r#"{"s":"line\nbreak\ttab \"quote\" back\\slash"}"#
    );
}

#[test]
fn non_ascii_escapes_to_u_sequences() {
    // ensure_ascii semantics: every non-ASCII char becomes \uXXXX
    let value = json!("治理");
    assert_eq!(canonical_json(&value), "\"\\u6cbb\\u7406\"");
}

#[test]
fn astral_chars_use_surrogate_pairs() {
    let value = json!("🎉");
    assert_eq!(canonical_json(&value), "\"\\ud83c\\udf89\"");
}

#[test]
fn same_value_always_hashes_the_same() {
    let a = json!({"x": [1, 2], "y": "治"});
    assert_eq!(canonical_json(&a), canonical_json(&a.clone()));
}
