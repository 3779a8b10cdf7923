// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Emissions and the events that drive the supervisor loop.
//!
//! An [`Emission`] is a named message with an environment, travelling through
//! the event queue. An [`Event`] is a stimulus for the engine: an emission
//! entering the system, a child exiting, a timer firing, or an operator
//! command. Events serialize with a `{"type": "kind:name", ...}` tag so they
//! read well in logs and in the re-exec image.

use crate::instance::InstanceId;
use crate::job::{ExitStatus, ProcessKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known event names synthesized by the supervisor.
pub mod names {
    /// Emitted once at supervisor start, after the catalog is loaded.
    pub const STARTUP: &str = "startup";
    /// Emitted when graceful shutdown begins.
    pub const SHUTDOWN: &str = "shutdown";
    /// Instance has begun its start cycle.
    pub const STARTING: &str = "starting";
    /// Instance has reached `running`.
    pub const STARTED: &str = "started";
    /// Instance has begun its stop cycle.
    pub const STOPPING: &str = "stopping";
    /// Instance has returned to `waiting`.
    pub const STOPPED: &str = "stopped";
    /// Runlevel change notification.
    pub const RUNLEVEL: &str = "runlevel";
}

/// Well-known environment keys on synthetic emissions.
pub mod keys {
    pub const JOB: &str = "JOB";
    pub const INSTANCE: &str = "INSTANCE";
    pub const RESULT: &str = "RESULT";
    pub const PROCESS: &str = "PROCESS";
    pub const EXIT_STATUS: &str = "EXIT_STATUS";
    pub const EXIT_SIGNAL: &str = "EXIT_SIGNAL";
    pub const RUNLEVEL: &str = "RUNLEVEL";
    pub const PREVLEVEL: &str = "PREVLEVEL";
}

/// Queue-assigned identity of an emission.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct EmissionId(pub u64);

impl fmt::Display for EmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Identity of an RPC caller waiting on an emission or command.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct WaiterId(pub u64);

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Progress of an in-flight emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmissionProgress {
    #[default]
    Pending,
    Handling,
    Finished,
    Failed,
}

impl fmt::Display for EmissionProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmissionProgress::Pending => write!(f, "pending"),
            EmissionProgress::Handling => write!(f, "handling"),
            EmissionProgress::Finished => write!(f, "finished"),
            EmissionProgress::Failed => write!(f, "failed"),
        }
    }
}

/// A single in-flight event with its environment and progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub id: EmissionId,
    pub name: String,
    /// Ordered `KEY=VALUE` pairs; order matters for trigger concatenation.
    pub env: Vec<(String, String)>,
    /// Whether the emitter blocks until every triggered instance settles.
    pub wait: bool,
    #[serde(default)]
    pub progress: EmissionProgress,
    /// RPC caller to resolve on completion. Does not survive re-exec (the
    /// connection dies with the old process).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiter: Option<WaiterId>,
    /// Fields written by a newer supervisor version; preserved so a
    /// downgrade round-trips them untouched.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Emission {
    pub fn new(id: EmissionId, name: impl Into<String>, env: Vec<(String, String)>) -> Self {
        Self {
            id,
            name: name.into(),
            env,
            wait: false,
            progress: EmissionProgress::Pending,
            waiter: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_waiter(mut self, waiter: Option<WaiterId>) -> Self {
        self.waiter = waiter;
        self
    }

    /// First value for `key` in the environment.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The job name argument, for `starting foo`-style matching.
    pub fn job_name(&self) -> Option<&str> {
        self.var(keys::JOB)
    }

    /// Compressed form for log spans.
    pub fn log_summary(&self) -> String {
        if self.env.is_empty() {
            format!("{} {}", self.id, self.name)
        } else {
            format!("{} {} ({} vars)", self.id, self.name, self.env.len())
        }
    }
}

/// Events that drive engine state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- emissions --
    /// An event enters the queue (external, operator, or synthetic).
    #[serde(rename = "event:emit")]
    Emit {
        name: String,
        env: Vec<(String, String)>,
        wait: bool,
        /// RPC caller blocked on completion, when wait is set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        waiter: Option<WaiterId>,
    },

    // -- operator commands --
    #[serde(rename = "job:start")]
    StartJob {
        class: String,
        env: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        waiter: Option<WaiterId>,
    },

    #[serde(rename = "job:stop")]
    StopJob {
        class: String,
        #[serde(default)]
        instance: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        waiter: Option<WaiterId>,
    },

    #[serde(rename = "job:restart")]
    RestartJob {
        class: String,
        #[serde(default)]
        instance: String,
        env: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        waiter: Option<WaiterId>,
    },

    // -- process lifecycle --
    /// A requested fork completed; the child is alive.
    #[serde(rename = "process:spawned")]
    ProcessSpawned {
        id: InstanceId,
        kind: ProcessKind,
        pid: u32,
    },

    /// A requested fork could not be carried out.
    #[serde(rename = "process:spawn-failed")]
    SpawnFailed {
        id: InstanceId,
        kind: ProcessKind,
        error: String,
    },

    /// The reaper collected an exit.
    #[serde(rename = "process:exited")]
    ChildExited { pid: u32, status: ExitStatus },

    /// The reaper observed a SIGSTOP (for `expect stop` readiness).
    #[serde(rename = "process:stopped")]
    ChildStopped { pid: u32 },

    // -- timers --
    #[serde(rename = "timer:fired")]
    TimerFired { id: crate::timer::TimerId },

    // -- supervisor control --
    #[serde(rename = "config:reload")]
    ReloadConfiguration,

    #[serde(rename = "supervisor:shutdown")]
    Shutdown,
}

impl Event {
    /// Event name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Emit { .. } => "emit",
            Event::StartJob { .. } => "start_job",
            Event::StopJob { .. } => "stop_job",
            Event::RestartJob { .. } => "restart_job",
            Event::ProcessSpawned { .. } => "process_spawned",
            Event::SpawnFailed { .. } => "spawn_failed",
            Event::ChildExited { .. } => "child_exited",
            Event::ChildStopped { .. } => "child_stopped",
            Event::TimerFired { .. } => "timer_fired",
            Event::ReloadConfiguration => "reload_configuration",
            Event::Shutdown => "shutdown",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Event::Emit { name, env, wait, .. } => vec![
                ("event", name.clone()),
                ("vars", env.len().to_string()),
                ("wait", wait.to_string()),
            ],
            Event::StartJob { class, .. } => vec![("class", class.clone())],
            Event::StopJob {
                class, instance, ..
            }
            | Event::RestartJob {
                class, instance, ..
            } => vec![("class", class.clone()), ("instance", instance.clone())],
            Event::ProcessSpawned { id, kind, pid } => vec![
                ("instance", id.to_string()),
                ("kind", kind.to_string()),
                ("pid", pid.to_string()),
            ],
            Event::SpawnFailed { id, kind, error } => vec![
                ("instance", id.to_string()),
                ("kind", kind.to_string()),
                ("error", error.clone()),
            ],
            Event::ChildExited { pid, status } => {
                vec![("pid", pid.to_string()), ("status", status.to_string())]
            }
            Event::ChildStopped { pid } => vec![("pid", pid.to_string())],
            Event::TimerFired { id } => vec![("timer_id", id.to_string())],
            Event::ReloadConfiguration | Event::Shutdown => vec![],
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
