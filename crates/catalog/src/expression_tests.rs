// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn emission(id: u64, name: &str, env: &[(&str, &str)]) -> Emission {
    Emission::new(
        EmissionId(id),
        name,
        env.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn parses_single_operand() {
    let expr = parse_expression("net-up").unwrap();
    assert_eq!(expr.operand_count(), 1);
    assert_eq!(expr.operands()[0].event, "net-up");
}

#[test]
fn parses_job_positional() {
    let expr = parse_expression("starting foo").unwrap();
    let op = expr.operands()[0];
    assert_eq!(op.event, "starting");
    assert_eq!(op.matchers, vec![("JOB".to_string(), "foo".to_string())]);
}

#[test]
fn parses_env_matchers() {
    let expr = parse_expression("net-up IFACE=eth* MODE=static").unwrap();
    let op = expr.operands()[0];
    assert_eq!(op.matchers.len(), 2);
    assert_eq!(op.matchers[0], ("IFACE".to_string(), "eth*".to_string()));
}

#[test]
fn parses_and_or_with_precedence() {
    // and binds tighter than or
    let expr = parse_expression("a or b and c").unwrap();
    assert!(matches!(expr, Expression::Or(_, _)));
    assert_eq!(expr.to_string(), "(a or (b and c))");
}

#[test]
fn parses_parentheses() {
    let expr = parse_expression("(a or b) and c").unwrap();
    assert!(matches!(expr, Expression::And(_, _)));
}

#[yare::parameterized(
    empty        = { "" },
    lone_and     = { "and" },
    trailing_op  = { "a and" },
    unbalanced   = { "(a or b" },
    stray_close  = { ")" },
    double_pos   = { "starting foo bar" },
    bare_equals  = { "ev =x" },
)]
fn rejects_malformed(input: &str) {
    assert!(parse_expression(input).is_err(), "{input:?}");
}

#[test]
fn operand_match_requires_name_and_matchers() {
    let expr = parse_expression("net-up IFACE=eth*").unwrap();
    let op = expr.operands()[0];

    assert!(op.matches(&emission(1, "net-up", &[("IFACE", "eth0")])));
    assert!(!op.matches(&emission(2, "net-up", &[("IFACE", "wlan0")])));
    assert!(!op.matches(&emission(3, "net-up", &[])));
    assert!(!op.matches(&emission(4, "net-down", &[("IFACE", "eth0")])));
}

#[test]
fn and_fires_only_when_both_match() {
    let expr = parse_expression("a and b").unwrap();
    let mut state = ExpressionState::new(&expr);

    state.feed(&expr, &emission(1, "a", &[]));
    assert!(!state.satisfied(&expr));

    state.feed(&expr, &emission(2, "b", &[]));
    assert!(state.satisfied(&expr));

    let trigger = state.trigger(&expr).unwrap();
    assert_eq!(trigger.emissions, vec![EmissionId(1), EmissionId(2)]);
}

#[test]
fn matches_are_sticky_across_emissions() {
    let expr = parse_expression("a and b").unwrap();
    let mut state = ExpressionState::new(&expr);

    state.feed(&expr, &emission(1, "a", &[]));
    // Unrelated emission in between does not disturb the match
    state.feed(&expr, &emission(2, "x", &[]));
    state.feed(&expr, &emission(3, "b", &[]));
    assert!(state.satisfied(&expr));
}

#[test]
fn first_match_wins_per_operand() {
    let expr = parse_expression("a").unwrap();
    let mut state = ExpressionState::new(&expr);

    state.feed(&expr, &emission(1, "a", &[("V", "first")]));
    state.feed(&expr, &emission(2, "a", &[("V", "second")]));

    let trigger = state.trigger(&expr).unwrap();
    assert_eq!(trigger.emissions, vec![EmissionId(1)]);
    assert_eq!(trigger.env, vec![("V".to_string(), "first".to_string())]);
}

#[test]
fn trigger_env_order_is_left_to_right_first_wins() {
    let expr = parse_expression("a and b").unwrap();
    let mut state = ExpressionState::new(&expr);

    // b arrives first, but a is the left operand: its env leads
    state.feed(&expr, &emission(1, "b", &[("SHARED", "from-b"), ("B", "1")]));
    state.feed(&expr, &emission(2, "a", &[("SHARED", "from-a"), ("A", "1")]));

    let trigger = state.trigger(&expr).unwrap();
    assert_eq!(
        trigger.env,
        vec![
            ("SHARED".to_string(), "from-a".to_string()),
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "1".to_string()),
        ]
    );
}

#[test]
fn trigger_env_or_short_circuits_left() {
    let expr = parse_expression("a or b").unwrap();
    let mut state = ExpressionState::new(&expr);

    state.feed(&expr, &emission(1, "a", &[("A", "1")]));
    state.feed(&expr, &emission(2, "b", &[("B", "1")]));

    let trigger = state.trigger(&expr).unwrap();
    assert_eq!(trigger.emissions, vec![EmissionId(1)]);
    assert_eq!(trigger.env, vec![("A".to_string(), "1".to_string())]);
}

#[test]
fn or_right_branch_used_when_left_unsatisfied() {
    let expr = parse_expression("a or b").unwrap();
    let mut state = ExpressionState::new(&expr);

    state.feed(&expr, &emission(2, "b", &[("B", "1")]));
    let trigger = state.trigger(&expr).unwrap();
    assert_eq!(trigger.emissions, vec![EmissionId(2)]);
}

#[test]
fn reset_clears_all_slots() {
    let expr = parse_expression("a and b").unwrap();
    let mut state = ExpressionState::new(&expr);

    state.feed(&expr, &emission(1, "a", &[]));
    state.feed(&expr, &emission(2, "b", &[]));
    assert!(state.satisfied(&expr));

    state.reset();
    assert!(!state.satisfied(&expr));
    assert_eq!(state.trigger(&expr), None);
}

#[test]
fn same_event_in_both_branches_matches_once_each() {
    let expr = parse_expression("boot and boot STAGE=late").unwrap();
    let mut state = ExpressionState::new(&expr);

    // One emission can satisfy several operands
    state.feed(&expr, &emission(1, "boot", &[("STAGE", "late")]));
    assert!(state.satisfied(&expr));

    let trigger = state.trigger(&expr).unwrap();
    // Deduplicated in the emission list
    assert_eq!(trigger.emissions, vec![EmissionId(1)]);
}

#[test]
fn job_positional_matches_job_key() {
    let expr = parse_expression("started dbus").unwrap();
    let mut state = ExpressionState::new(&expr);

    state.feed(&expr, &emission(1, "started", &[("JOB", "avahi")]));
    assert!(!state.satisfied(&expr));

    state.feed(&expr, &emission(2, "started", &[("JOB", "dbus")]));
    assert!(state.satisfied(&expr));
}

#[test]
fn display_round_trips_through_parser() {
    let expr = parse_expression("(starting foo or net-up IFACE=eth*) and b").unwrap();
    let printed = expr.to_string();
    let reparsed = parse_expression(&printed).unwrap();
    assert_eq!(reparsed.to_string(), printed);
}
