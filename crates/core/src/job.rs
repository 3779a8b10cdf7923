// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job goal, state, and process vocabulary.
//!
//! A job instance is always described by a `(goal, state)` pair: the goal is
//! where the instance is headed (`start` or `stop`) and the state is where it
//! currently sits in the start/stop cycle. [`goal_permits`] encodes which
//! pairs are reachable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate a `Display` impl body mapping enum variants to kebab-case names.
macro_rules! fmt_kebab {
    ($($variant:ident => $text:literal),+ $(,)?) => {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                $(Self::$variant => write!(f, $text)),+
            }
        }
    };
}

/// Where an instance is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Start,
    Stop,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Start => write!(f, "start"),
            Goal::Stop => write!(f, "stop"),
        }
    }
}

/// Position of an instance in the start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    /// Idle; no processes, no pending work.
    Waiting,
    /// Holding until the `starting` emission has been handled.
    Starting,
    /// The pre-start process is running.
    PreStart,
    /// The main process has been forked but is not yet considered running
    /// (readiness contract from `expect` not yet met).
    Spawned,
    /// The post-start process is running.
    PostStart,
    /// The main process is up; services settle here.
    Running,
    /// The pre-stop process is running.
    PreStop,
    /// Holding until the `stopping` emission has been handled.
    Stopping,
    /// The kill signal has been sent; awaiting the main process death.
    Killed,
    /// The post-stop process is running.
    PostStop,
}

impl fmt::Display for JobState {
    fmt_kebab!(
        Waiting => "waiting",
        Starting => "starting",
        PreStart => "pre-start",
        Spawned => "spawned",
        PostStart => "post-start",
        Running => "running",
        PreStop => "pre-stop",
        Stopping => "stopping",
        Killed => "killed",
        PostStop => "post-stop",
    );
}

/// Which of the five per-instance processes a pid belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    PreStart,
    Main,
    PostStart,
    PreStop,
    PostStop,
}

impl fmt::Display for ProcessKind {
    fmt_kebab!(
        PreStart => "pre-start",
        Main => "main",
        PostStart => "post-start",
        PreStop => "pre-stop",
        PostStop => "post-stop",
    );
}

/// How an instance's last cycle ended; carried on the `stopped` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum JobResult {
    #[default]
    Ok,
    Failed,
    Respawn,
    RespawnLimit,
}

impl fmt::Display for JobResult {
    fmt_kebab!(
        Ok => "ok",
        Failed => "failed",
        Respawn => "respawn",
        RespawnLimit => "respawn-limit",
    );
}

/// Exit status of a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Normal exit with the given code.
    Code(i32),
    /// Terminated by the given signal number.
    Signal(i32),
}

impl ExitStatus {
    /// True for a clean `exit(0)`.
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit {}", code),
            ExitStatus::Signal(sig) => write!(f, "signal {}", signal_name(*sig)),
        }
    }
}

/// Main-process readiness contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpectMode {
    /// Running from the moment the fork returns.
    #[default]
    None,
    /// Running once the initial process has forked away.
    Fork,
    /// Running once the initial process has daemonized.
    Daemon,
    /// Running once the process raises SIGSTOP; the supervisor continues it.
    Stop,
}

impl fmt::Display for ExpectMode {
    fmt_kebab!(
        None => "none",
        Fork => "fork",
        Daemon => "daemon",
        Stop => "stop",
    );
}

/// stdout/stderr routing for supervised processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleMode {
    /// Discard output.
    None,
    /// Capture output into the per-job log file.
    #[default]
    Log,
    /// Leave the controlling terminal with the process group.
    Owner,
    /// Inherit the supervisor's descriptors.
    Output,
}

impl fmt::Display for ConsoleMode {
    fmt_kebab!(
        None => "none",
        Log => "log",
        Owner => "owner",
        Output => "output",
    );
}

/// Command for one of an instance's processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandLine {
    /// A single command line, run directly (or via the shell when it uses
    /// shell metacharacters).
    Exec(String),
    /// An inline shell script, run with `sh -e`.
    Script(String),
}

impl CommandLine {
    /// A one-line rendering for logs and status output.
    pub fn summary(&self) -> &str {
        match self {
            CommandLine::Exec(line) => line,
            CommandLine::Script(_) => "(script)",
        }
    }
}

/// Whether the `(goal, state)` pair is one the automaton can produce.
///
/// `waiting` is only ever paired with goal `stop` (a started instance leaves
/// `waiting` immediately), and `killed`/`post-stop` with goal `start` only as
/// the restart path of a respawn cycle.
pub fn goal_permits(goal: Goal, state: JobState) -> bool {
    match state {
        JobState::Waiting => goal == Goal::Stop,
        JobState::Starting
        | JobState::PreStart
        | JobState::Spawned
        | JobState::PostStart
        | JobState::Running => true,
        JobState::PreStop => true,
        JobState::Stopping | JobState::Killed | JobState::PostStop => true,
    }
}

/// Symbolic name for a signal number, as carried in `EXIT_SIGNAL`.
pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        1 => "HUP",
        2 => "INT",
        3 => "QUIT",
        4 => "ILL",
        6 => "ABRT",
        8 => "FPE",
        9 => "KILL",
        11 => "SEGV",
        13 => "PIPE",
        14 => "ALRM",
        15 => "TERM",
        10 => "USR1",
        12 => "USR2",
        17 => "CHLD",
        18 => "CONT",
        19 => "STOP",
        20 => "TSTP",
        24 => "XCPU",
        25 => "XFSZ",
        _ => "UNKNOWN",
    }
}

/// Signal number for a symbolic name, accepting an optional `SIG` prefix.
pub fn signal_number(name: &str) -> Option<i32> {
    let bare = name.strip_prefix("SIG").unwrap_or(name);
    let number = match bare {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ILL" => 4,
        "ABRT" => 6,
        "FPE" => 8,
        "KILL" => 9,
        "SEGV" => 11,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        "USR1" => 10,
        "USR2" => 12,
        "CONT" => 18,
        "STOP" => 19,
        "TSTP" => 20,
        "XCPU" => 24,
        "XFSZ" => 25,
        _ => return bare.parse().ok(),
    };
    Some(number)
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
