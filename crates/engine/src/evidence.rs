// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evidence normalizer.
//!
//! Assembles a text corpus from a worker reply and extracts hard evidence
//! (URLs, file-like paths, test-pass lines) and soft evidence (hint-word
//! lines). The heuristics are deliberately strict about what counts as a
//! path: `ui/v1` does, `1/2` and `a/b` do not.

use orc_core::reply::clip;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhttps?://[^\s<>"]+"#).expect("constant regex pattern is valid")
});
static TEST_CMD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(pytest|unittest|go\s+test|cargo\s+test|npm\s+test|pnpm\s+test|yarn\s+test)\b")
        .expect("constant regex pattern is valid")
});
static STRONG_PASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\b\d+\s+passed\b|\ball\s+tests?\s+passed\b|测试通过|^ran\s+\d+\s+tests?\b.*\bok\b)")
        .expect("constant regex pattern is valid")
});
static FAILED_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\s+failed\b").expect("constant regex pattern is valid")
});
static FAILED_NODEID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfailed\s+\S+::\S+").expect("constant regex pattern is valid")
});
static TESTS_FAILED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btests?\s+failed\b").expect("constant regex pattern is valid")
});
static OK_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bok\b").expect("constant regex pattern is valid"));

const SOFT_HINTS: [&str; 10] = [
    "evidence", "proof", "log", "output", "result", "验证", "证据", "截图", "报告", "summary",
];

const FILE_EXTENSIONS: [&str; 23] = [
    "py", "md", "json", "yaml", "yml", "txt", "log", "csv", "xml", "html", "css", "js", "ts",
    "tsx", "jsx", "go", "rs", "java", "sh", "sql", "ini", "toml", "lock",
];

/// Extracted evidence for one reply.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBundle {
    pub hard_evidence: Vec<String>,
    pub soft_evidence: Vec<String>,
    pub normalized_text: String,
}

impl EvidenceBundle {
    pub fn has_hard_evidence(&self) -> bool {
        !self.hard_evidence.is_empty()
    }
}

fn append_unique(target: &mut Vec<String>, value: &str, limit: usize) {
    let clipped = clip(value, limit);
    if clipped.is_empty() || target.iter().any(|v| v == &clipped) {
        return;
    }
    target.push(clipped);
}

/// Collect the corpus chunks: free text, the flat string fields, evidence
/// items, and `path: summary` lines from changes.
fn collect_chunks(structured: &Value, text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    if !text.trim().is_empty() {
        append_unique(&mut chunks, text, 500);
    }

    for key in ["summary", "message", "result", "output", "text"] {
        if let Some(value) = structured.get(key).and_then(Value::as_str) {
            append_unique(&mut chunks, value, 500);
        }
    }

    if let Some(Value::Array(items)) = structured.get("evidence") {
        for item in items {
            if let Some(item) = item.as_str() {
                append_unique(&mut chunks, item, 400);
            }
        }
    }

    if let Some(Value::Array(items)) = structured.get("changes") {
        for item in items {
            match item {
                Value::Object(map) => {
                    let path = map
                        .get("path")
                        .or_else(|| map.get("file"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .trim();
                    let summary = map
                        .get("summary")
                        .or_else(|| map.get("change"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .trim();
                    if !path.is_empty() || !summary.is_empty() {
                        let joined = format!("{path}: {summary}");
                        append_unique(&mut chunks, joined.trim_matches([':', ' ']), 400);
                    }
                }
                Value::String(s) => append_unique(&mut chunks, s, 400),
                _ => {}
            }
        }
    }

    chunks
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| "()[]{}<>,;:'\"`".contains(c))
}

/// A token counts as a file path when it has directory structure with real
/// names in it, or a known file extension.
fn looks_file_like(token: &str) -> bool {
    let token = trim_token(token);
    if token.is_empty() {
        return false;
    }
    let lower = token.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return false;
    }
    if token.contains('/') || token.contains('\\') {
        let has_letter = token.chars().any(|c| c.is_ascii_alphabetic());
        let has_real_segment = token
            .split(['/', '\\'])
            .any(|segment| segment.chars().count() >= 2);
        return has_letter && has_real_segment;
    }
    let Some((stem, ext)) = token.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() || ext.is_empty() || ext.len() > 8 {
        return false;
    }
    let ext = ext.to_lowercase();
    FILE_EXTENSIONS.contains(&ext.as_str())
}

fn weak_pass_signal(lower: &str) -> bool {
    lower.contains("passed") || lower.contains("通过") || OK_WORD_RE.is_match(lower)
}

/// Does this line read like a test result with a pass signal?
fn is_test_pass_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    if STRONG_PASS_RE.is_match(&lower) {
        return true;
    }
    TEST_CMD_RE.is_match(&lower) && weak_pass_signal(&lower)
}

/// Does the corpus contain an explicit failure signal?
pub fn has_failure_signal(corpus: &str) -> bool {
    let lower = corpus.to_lowercase();
    FAILED_COUNT_RE.is_match(&lower)
        || FAILED_NODEID_RE.is_match(&lower)
        || TESTS_FAILED_RE.is_match(&lower)
        || lower.contains("traceback (most recent call last")
        || lower.contains("测试未通过")
        || lower.contains("验证未通过")
}

fn extract_hard(normalized_text: &str) -> Vec<String> {
    let mut hard = Vec::new();

    for url in URL_RE.find_iter(normalized_text) {
        append_unique(&mut hard, url.as_str(), 260);
    }

    for token in normalized_text.split_whitespace() {
        let token = trim_token(token);
        if looks_file_like(token) {
            append_unique(&mut hard, token, 240);
        }
    }

    for line in normalized_text.lines() {
        let line = line.trim();
        if !line.is_empty() && is_test_pass_line(line) {
            append_unique(&mut hard, &format!("test:{line}"), 240);
        }
    }

    hard
}

fn extract_soft(normalized_text: &str, hard: &[String]) -> Vec<String> {
    let hard_joined = hard.join("\n").to_lowercase();
    let mut soft = Vec::new();
    for line in normalized_text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_lowercase();
        if SOFT_HINTS.iter().any(|hint| lower.contains(hint)) && !hard_joined.contains(&lower) {
            append_unique(&mut soft, line, 220);
        }
    }
    soft
}

/// Normalize a reply into an evidence bundle.
pub fn normalize_evidence(structured: &Value, text: &str) -> EvidenceBundle {
    let chunks = collect_chunks(structured, text);
    let normalized_text = chunks.join("\n").trim().to_string();
    let hard_evidence = extract_hard(&normalized_text);
    let soft_evidence = extract_soft(&normalized_text, &hard_evidence);
    EvidenceBundle {
        hard_evidence,
        soft_evidence,
        normalized_text,
    }
}

#[cfg(test)]
#[path = "evidence_tests.rs"]
mod tests;
