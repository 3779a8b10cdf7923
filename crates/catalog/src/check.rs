// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reachability checks for `check-config`.
//!
//! An expression operand that names a job no class defines, or an event
//! nothing emits, can never match at runtime. That is legal — the class
//! simply never starts — but usually indicates a typo, so it is surfaced as
//! a warning rather than an error.

use crate::catalog::Catalog;
use crate::expression::Expression;
use crate::glob::is_glob;
use ember_core::event::names;
use std::collections::BTreeSet;

/// Events every supervisor emits regardless of configuration.
const WELL_KNOWN_EVENTS: &[&str] = &[
    names::STARTUP,
    names::SHUTDOWN,
    names::STARTING,
    names::STARTED,
    names::STOPPING,
    names::STOPPED,
    names::RUNLEVEL,
];

/// One unreachable operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckWarning {
    UnknownJob { job: String },
    UnknownEvent { event: String },
}

impl std::fmt::Display for CheckWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckWarning::UnknownJob { job } => {
                write!(f, "unknown job {}", job)
            }
            CheckWarning::UnknownEvent { event } => {
                write!(f, "unknown event {}", event)
            }
        }
    }
}

/// Warnings per class, in class-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub entries: Vec<(String, Vec<CheckWarning>)>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Check every class's start-on/stop-on expressions for operands that can
/// never match.
pub fn check_catalog(catalog: &Catalog) -> CheckReport {
    let classes = catalog.classes();

    let known_jobs: BTreeSet<&str> = classes.iter().map(|c| c.name.as_str()).collect();
    let mut known_events: BTreeSet<&str> = WELL_KNOWN_EVENTS.iter().copied().collect();
    for class in &classes {
        for event in &class.emits {
            known_events.insert(event.as_str());
        }
    }

    let mut report = CheckReport::default();
    for class in &classes {
        let mut warnings = Vec::new();
        for expr in [&class.start_on, &class.stop_on].into_iter().flatten() {
            check_expression(expr, &known_jobs, &known_events, &mut warnings);
        }
        if !warnings.is_empty() {
            report.entries.push((class.name.clone(), warnings));
        }
    }
    report
}

fn check_expression(
    expr: &Expression,
    known_jobs: &BTreeSet<&str>,
    known_events: &BTreeSet<&str>,
    out: &mut Vec<CheckWarning>,
) {
    for operand in expr.operands() {
        if !is_glob(&operand.event) && !known_events.contains(operand.event.as_str()) {
            push_unique(
                out,
                CheckWarning::UnknownEvent {
                    event: operand.event.clone(),
                },
            );
        }
        for (key, value) in &operand.matchers {
            if key == ember_core::event::keys::JOB
                && !is_glob(value)
                && !known_jobs.contains(value.as_str())
            {
                push_unique(out, CheckWarning::UnknownJob { job: value.clone() });
            }
        }
    }
}

fn push_unique(out: &mut Vec<CheckWarning>, warning: CheckWarning) {
    if !out.contains(&warning) {
        out.push(warning);
    }
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
