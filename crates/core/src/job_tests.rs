// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    waiting    = { JobState::Waiting, "waiting" },
    starting   = { JobState::Starting, "starting" },
    pre_start  = { JobState::PreStart, "pre-start" },
    spawned    = { JobState::Spawned, "spawned" },
    post_start = { JobState::PostStart, "post-start" },
    running    = { JobState::Running, "running" },
    pre_stop   = { JobState::PreStop, "pre-stop" },
    stopping   = { JobState::Stopping, "stopping" },
    killed     = { JobState::Killed, "killed" },
    post_stop  = { JobState::PostStop, "post-stop" },
)]
fn state_display(state: JobState, text: &str) {
    assert_eq!(state.to_string(), text);
}

#[test]
fn state_serde_uses_kebab_case() {
    let json = serde_json::to_string(&JobState::PreStart).unwrap();
    assert_eq!(json, "\"pre-start\"");
    let back: JobState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, JobState::PreStart);
}

#[test]
fn waiting_only_pairs_with_stop() {
    assert!(goal_permits(Goal::Stop, JobState::Waiting));
    assert!(!goal_permits(Goal::Start, JobState::Waiting));
}

#[test]
fn progress_states_pair_with_either_goal() {
    for state in [
        JobState::Starting,
        JobState::PreStart,
        JobState::Spawned,
        JobState::PostStart,
        JobState::Running,
        JobState::Stopping,
        JobState::Killed,
        JobState::PostStop,
    ] {
        assert!(goal_permits(Goal::Start, state), "{state} with start");
        assert!(goal_permits(Goal::Stop, state), "{state} with stop");
    }
}

#[test]
fn result_display() {
    assert_eq!(JobResult::Ok.to_string(), "ok");
    assert_eq!(JobResult::RespawnLimit.to_string(), "respawn-limit");
}

#[test]
fn exit_status_clean() {
    assert!(ExitStatus::Code(0).is_clean());
    assert!(!ExitStatus::Code(1).is_clean());
    assert!(!ExitStatus::Signal(15).is_clean());
}

#[test]
fn exit_status_display() {
    assert_eq!(ExitStatus::Code(2).to_string(), "exit 2");
    assert_eq!(ExitStatus::Signal(9).to_string(), "signal KILL");
}

#[yare::parameterized(
    plain        = { "TERM", Some(15) },
    sig_prefixed = { "SIGKILL", Some(9) },
    numeric      = { "12", Some(12) },
    unknown      = { "NOPE", None },
)]
fn signal_numbers(name: &str, expected: Option<i32>) {
    assert_eq!(signal_number(name), expected);
}

#[test]
fn signal_names_round_trip() {
    for sig in [1, 2, 9, 15] {
        let name = signal_name(sig);
        assert_eq!(signal_number(name), Some(sig));
    }
}

#[test]
fn command_line_summary() {
    assert_eq!(CommandLine::Exec("sleep 1".into()).summary(), "sleep 1");
    assert_eq!(CommandLine::Script("exit 0\n".into()).summary(), "(script)");
}
