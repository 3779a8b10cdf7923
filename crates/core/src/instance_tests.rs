// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn instance(class: &str, name: &str) -> JobInstance {
    JobInstance::new(InstanceId::new(class, name), vec![], 1_000)
}

#[test]
fn display_label_round_trips() {
    let singleton = InstanceId::singleton("tty");
    assert_eq!(singleton.to_string(), "tty");
    assert_eq!(InstanceId::from_label("tty"), singleton);

    let keyed = InstanceId::new("getty", "ttyS0");
    assert_eq!(keyed.to_string(), "getty (ttyS0)");
    assert_eq!(InstanceId::from_label("getty (ttyS0)"), keyed);
}

#[test]
fn from_label_tolerates_parens_in_instance() {
    let id = InstanceId::new("worker", "a (b)");
    assert_eq!(InstanceId::from_label(&id.to_string()), id);
}

#[test]
fn new_instance_is_waiting_with_goal_stop() {
    let inst = instance("foo", "");
    assert_eq!(inst.goal, Goal::Stop);
    assert_eq!(inst.state, JobState::Waiting);
    assert!(inst.pids.is_empty());
    assert!(inst.is_settled());
}

#[test]
fn pid_table_tracks_one_entry_per_kind() {
    let mut inst = instance("foo", "");
    inst.set_pid(ProcessKind::Main, 100);
    inst.set_pid(ProcessKind::PostStart, 101);
    inst.set_pid(ProcessKind::Main, 102);

    assert_eq!(inst.pid_of(ProcessKind::Main), Some(102));
    assert_eq!(inst.pid_of(ProcessKind::PostStart), Some(101));
    assert_eq!(inst.pids.len(), 2);
    assert_eq!(inst.main_pgid, Some(102));
}

#[test]
fn clear_pid_returns_kind_and_removes_entry() {
    let mut inst = instance("foo", "");
    inst.set_pid(ProcessKind::Main, 100);
    assert_eq!(inst.clear_pid(100), Some(ProcessKind::Main));
    assert_eq!(inst.pid_of(ProcessKind::Main), None);
    assert_eq!(inst.clear_pid(100), None);
}

#[test]
fn first_failure_wins() {
    let mut inst = instance("foo", "");
    inst.mark_failed(ProcessKind::PreStart, Some(ExitStatus::Code(2)));
    inst.mark_failed(ProcessKind::Main, Some(ExitStatus::Code(1)));

    assert_eq!(inst.result, JobResult::Failed);
    assert_eq!(inst.failed_process, Some(ProcessKind::PreStart));
    assert_eq!(inst.exit_status, Some(ExitStatus::Code(2)));
}

#[test]
fn reset_cycle_clears_result_tracking() {
    let mut inst = instance("foo", "");
    inst.mark_failed(ProcessKind::Main, Some(ExitStatus::Code(2)));
    inst.daemonized = true;
    inst.reset_cycle();

    assert_eq!(inst.result, JobResult::Ok);
    assert_eq!(inst.failed_process, None);
    assert_eq!(inst.exit_status, None);
    assert!(!inst.daemonized);
}

#[test]
fn settle_points_depend_on_goal() {
    let mut inst = instance("foo", "");
    inst.goal = Goal::Start;
    inst.state = JobState::Running;
    assert!(inst.is_settled());

    inst.state = JobState::Spawned;
    assert!(!inst.is_settled());

    inst.goal = Goal::Stop;
    inst.state = JobState::Waiting;
    assert!(inst.is_settled());
}

#[test]
fn respawn_counter_window_semantics() {
    let mut counter = RespawnCounter::default();
    // Three exits inside a 5-second window
    assert_eq!(counter.record(1_000, 5), 1);
    assert_eq!(counter.record(2_000, 5), 2);
    assert_eq!(counter.record(3_000, 5), 3);
    // Window lapses: counting starts over
    assert_eq!(counter.record(10_000, 5), 1);
    counter.reset();
    assert_eq!(counter.count, 0);
}

#[test]
fn respawn_counter_zero_window_never_expires() {
    let mut counter = RespawnCounter::default();
    counter.record(1_000, 0);
    assert_eq!(counter.record(1_000_000, 0), 2);
}

#[test]
fn instance_serde_round_trip() {
    let mut inst = instance("getty", "tty1");
    inst.set_pid(ProcessKind::Main, 500);
    inst.blockers.push(EmissionId(3));
    let json = serde_json::to_string(&inst).unwrap();
    let back: JobInstance = serde_json::from_str(&json).unwrap();
    assert_eq!(back, inst);
}
