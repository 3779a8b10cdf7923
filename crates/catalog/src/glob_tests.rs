// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    literal          = { "eth0", "eth0", true },
    literal_miss     = { "eth0", "eth1", false },
    star_suffix      = { "eth*", "eth0", true },
    star_matches_all = { "*", "anything", true },
    star_empty       = { "*", "", true },
    star_middle      = { "e*0", "eth0", true },
    star_middle_miss = { "e*1", "eth0", false },
    question         = { "eth?", "eth0", true },
    question_miss    = { "eth?", "eth", false },
    two_stars        = { "*-up-*", "net-up-eth0", true },
    case_sensitive   = { "ETH0", "eth0", false },
)]
fn basic_globs(pattern: &str, text: &str, expected: bool) {
    assert_eq!(glob_match(pattern, text), expected, "{pattern} vs {text}");
}

#[yare::parameterized(
    set_hit        = { "tty[12]", "tty1", true },
    set_miss       = { "tty[12]", "tty3", false },
    range_hit      = { "tty[0-9]", "tty7", true },
    range_miss     = { "tty[0-9]", "ttyS", false },
    negated_hit    = { "tty[!0-9]", "ttyS", true },
    negated_miss   = { "tty[!0-9]", "tty7", false },
    caret_negation = { "tty[^a]", "ttyb", true },
)]
fn character_classes(pattern: &str, text: &str, expected: bool) {
    assert_eq!(glob_match(pattern, text), expected, "{pattern} vs {text}");
}

#[test]
fn escaped_star_is_literal() {
    assert!(glob_match(r"a\*b", "a*b"));
    assert!(!glob_match(r"a\*b", "axb"));
}

#[test]
fn unterminated_class_matches_literally() {
    assert!(glob_match("a[b", "a[b"));
    assert!(!glob_match("a[b", "ab"));
}

#[test]
fn trailing_star_backtracks() {
    assert!(glob_match("a*b*c", "a-x-b-y-c"));
    assert!(!glob_match("a*b*c", "a-x-c-y-b"));
}

#[test]
fn is_glob_detects_metacharacters() {
    assert!(is_glob("eth*"));
    assert!(is_glob("tty?"));
    assert!(is_glob("tty[1]"));
    assert!(!is_glob("plain-name"));
}

proptest::proptest! {
    #[test]
    fn literal_patterns_match_themselves(s in "[a-zA-Z0-9._-]{0,20}") {
        proptest::prop_assert!(glob_match(&s, &s));
    }

    #[test]
    fn star_matches_any_text(s in "[a-zA-Z0-9._-]{0,20}") {
        proptest::prop_assert!(glob_match("*", &s));
    }
}
