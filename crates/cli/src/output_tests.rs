// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ember_core::{Goal, JobState};

fn entry(
    name: &str,
    instance: &str,
    goal: Goal,
    state: JobState,
    processes: &[(&str, u32)],
) -> InstanceEntry {
    InstanceEntry {
        name: name.into(),
        instance: instance.into(),
        goal,
        state,
        processes: processes
            .iter()
            .map(|(kind, pid)| (kind.to_string(), *pid))
            .collect(),
    }
}

#[test]
fn running_singleton_with_main() {
    let line = format_instance(&entry(
        "foo",
        "",
        Goal::Start,
        JobState::Running,
        &[("main", 1234)],
    ));
    assert_eq!(line, "foo start/running, process 1234");
}

#[test]
fn named_instance_in_parentheses() {
    let line = format_instance(&entry(
        "getty",
        "ttyS0",
        Goal::Start,
        JobState::Running,
        &[("main", 99)],
    ));
    assert_eq!(line, "getty (ttyS0) start/running, process 99");
}

#[test]
fn auxiliary_processes_get_indented_lines() {
    let line = format_instance(&entry(
        "foo",
        "",
        Goal::Start,
        JobState::PostStart,
        &[("main", 10), ("post-start", 11)],
    ));
    assert_eq!(
        line,
        "foo start/post-start, process 10\n\tpost-start process 11"
    );
}

#[test]
fn pre_start_only_shows_tagged_on_head_line() {
    let line = format_instance(&entry(
        "foo",
        "",
        Goal::Start,
        JobState::PreStart,
        &[("pre-start", 7)],
    ));
    assert_eq!(line, "foo start/pre-start, (pre-start) process 7");
}

#[test]
fn waiting_instance_has_no_process_suffix() {
    let line = format_instance(&entry("foo", "", Goal::Stop, JobState::Waiting, &[]));
    assert_eq!(line, "foo stop/waiting");
}

#[test]
fn job_without_instances_lists_idle() {
    let job = JobEntry {
        name: "foo".into(),
        description: None,
        usage: None,
        task: false,
        instances: vec![],
    };
    assert_eq!(format_job(&job), "foo stop/waiting");
}

#[test]
fn job_with_instances_lists_each() {
    let job = JobEntry {
        name: "getty".into(),
        description: None,
        usage: None,
        task: false,
        instances: vec![
            entry("getty", "tty1", Goal::Start, JobState::Running, &[("main", 1)]),
            entry("getty", "tty2", Goal::Start, JobState::Running, &[("main", 2)]),
        ],
    };
    assert_eq!(
        format_job(&job),
        "getty (tty1) start/running, process 1\ngetty (tty2) start/running, process 2"
    );
}
