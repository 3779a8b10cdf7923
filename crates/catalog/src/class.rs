// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job class definitions: the parsed form of one `.conf` file.

use crate::expression::Expression;
use ember_core::{CommandLine, ConsoleMode, ExitStatus, ExpectMode, ProcessKind, ResourceLimit};
use std::path::PathBuf;

/// Default respawn limit: count within window seconds.
pub const DEFAULT_RESPAWN_LIMIT: (u32, u32) = (10, 5);

/// Default kill timeout in seconds.
pub const DEFAULT_KILL_TIMEOUT: u32 = 5;

/// Default kill signal (SIGTERM).
pub const DEFAULT_KILL_SIGNAL: i32 = 15;

/// A named declarative description of a service or task.
#[derive(Debug, Clone, PartialEq)]
pub struct JobClass {
    /// Unique name: the file's path relative to the configuration root with
    /// `.conf` stripped.
    pub name: String,
    /// Tasks settle at `waiting`; services settle at `running`.
    pub task: bool,
    /// Never matches any start-on expression.
    pub manual: bool,
    pub start_on: Option<Expression>,
    pub stop_on: Option<Expression>,
    /// Advisory list of events this job emits, for `check-config`.
    pub emits: Vec<String>,
    pub pre_start: Option<CommandLine>,
    pub main: Option<CommandLine>,
    pub post_start: Option<CommandLine>,
    pub pre_stop: Option<CommandLine>,
    pub post_stop: Option<CommandLine>,
    /// Instance name template, expanded against the trigger environment.
    /// Empty means singleton.
    pub instance: String,
    pub respawn: bool,
    /// `(count, window seconds)`; exceeding it settles the instance with
    /// result `respawn-limit`.
    pub respawn_limit: (u32, u32),
    /// Exit statuses treated as intentional (no respawn, no failure).
    pub normal_exit: Vec<ExitStatus>,
    pub expect: ExpectMode,
    /// Seconds between the kill signal and SIGKILL escalation.
    pub kill_timeout: u32,
    pub kill_signal: i32,
    pub console: ConsoleMode,
    /// Per-class environment defaults.
    pub env: Vec<(String, String)>,
    /// Keys exported from the trigger environment into progress events.
    pub export: Vec<String>,
    pub chdir: Option<PathBuf>,
    pub chroot: Option<PathBuf>,
    pub umask: Option<u32>,
    pub nice: Option<i32>,
    pub oom_score: Option<i32>,
    pub limits: Vec<ResourceLimit>,
    pub setuid: Option<String>,
    pub setgid: Option<String>,
    pub usage: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
}

impl JobClass {
    /// An empty class used as the builder baseline.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: false,
            manual: false,
            start_on: None,
            stop_on: None,
            emits: Vec::new(),
            pre_start: None,
            main: None,
            post_start: None,
            pre_stop: None,
            post_stop: None,
            instance: String::new(),
            respawn: false,
            respawn_limit: DEFAULT_RESPAWN_LIMIT,
            normal_exit: Vec::new(),
            expect: ExpectMode::None,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            kill_signal: DEFAULT_KILL_SIGNAL,
            console: ConsoleMode::default(),
            env: Vec::new(),
            export: Vec::new(),
            chdir: None,
            chroot: None,
            umask: None,
            nice: None,
            oom_score: None,
            limits: Vec::new(),
            setuid: None,
            setgid: None,
            usage: None,
            description: None,
            author: None,
            version: None,
        }
    }

    /// Command for the given process kind, if configured.
    pub fn process(&self, kind: ProcessKind) -> Option<&CommandLine> {
        match kind {
            ProcessKind::PreStart => self.pre_start.as_ref(),
            ProcessKind::Main => self.main.as_ref(),
            ProcessKind::PostStart => self.post_start.as_ref(),
            ProcessKind::PreStop => self.pre_stop.as_ref(),
            ProcessKind::PostStop => self.post_stop.as_ref(),
        }
    }

    /// Whether any process stanza is configured. Classes without any are
    /// purely synthetic state holders.
    pub fn has_processes(&self) -> bool {
        self.pre_start.is_some()
            || self.main.is_some()
            || self.post_start.is_some()
            || self.pre_stop.is_some()
            || self.post_stop.is_some()
    }

    pub fn is_singleton(&self) -> bool {
        self.instance.is_empty()
    }

    /// Whether the exit status is in the configured `normal exit` set.
    pub fn is_normal_exit(&self, status: ExitStatus) -> bool {
        self.normal_exit.contains(&status)
    }
}

#[cfg(test)]
#[path = "class_tests.rs"]
mod tests;
