// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("evt");
    assert_eq!(gen.next(), "evt-1");
    assert_eq!(gen.next(), "evt-2");
}

#[test]
fn uuid_gen_is_unique() {
    let gen = UuidIdGen;
    assert_ne!(gen.next(), gen.next());
}

#[yare::parameterized(
    shorter_than_n = { "abc", 8, "abc" },
    exactly_n      = { "abcdefgh", 8, "abcdefgh" },
    longer_than_n  = { "abcdefghij", 8, "abcdefgh" },
)]
fn short_truncates(input: &str, n: usize, expected: &str) {
    assert_eq!(input.short(n), expected);
}
