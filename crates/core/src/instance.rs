// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live job instance records.

use crate::event::EmissionId;
use crate::job::{ExitStatus, Goal, JobResult, JobState, ProcessKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a live instance: the owning class plus the expanded instance
/// name (empty for singletons).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId {
    pub class: String,
    pub instance: String,
}

impl InstanceId {
    pub fn new(class: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            instance: instance.into(),
        }
    }

    /// Identity of a singleton class's only instance.
    pub fn singleton(class: impl Into<String>) -> Self {
        Self::new(class, "")
    }

    pub fn is_singleton(&self) -> bool {
        self.instance.is_empty()
    }

    /// Parse the `Display` form back: `class` or `class (instance)`.
    pub fn from_label(label: &str) -> Self {
        if let Some(open) = label.rfind(" (") {
            if let Some(inner) = label[open + 2..].strip_suffix(')') {
                return Self::new(&label[..open], inner);
            }
        }
        Self::singleton(label)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance.is_empty() {
            write!(f, "{}", self.class)
        } else {
            write!(f, "{} ({})", self.class, self.instance)
        }
    }
}

/// Respawn bookkeeping: exits counted inside the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RespawnCounter {
    pub count: u32,
    /// Epoch ms of the first exit in the window; cleared when the window lapses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start_ms: Option<u64>,
}

impl RespawnCounter {
    /// Record an unexpected main exit at `now_ms`.
    ///
    /// Returns the number of respawns counted inside the window including
    /// this one. A `window_secs` of zero never expires the window.
    pub fn record(&mut self, now_ms: u64, window_secs: u32) -> u32 {
        let window_ms = u64::from(window_secs) * 1000;
        match self.window_start_ms {
            Some(start) if window_ms > 0 && now_ms.saturating_sub(start) > window_ms => {
                self.window_start_ms = Some(now_ms);
                self.count = 1;
            }
            Some(_) => {
                self.count += 1;
            }
            None => {
                self.window_start_ms = Some(now_ms);
                self.count = 1;
            }
        }
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.window_start_ms = None;
    }
}

/// A live enactment of a job class.
///
/// Everything here is serializable so the instance survives re-exec
/// byte-for-byte; runtime-only handles (timers) are re-armed from `state`
/// on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: InstanceId,
    pub goal: Goal,
    pub state: JobState,
    /// One entry per process kind currently alive.
    pub pids: Vec<(ProcessKind, u32)>,
    /// Environment snapshot taken when the instance was created.
    pub env: Vec<(String, String)>,
    /// Emissions whose completion waits on this instance settling.
    #[serde(default)]
    pub blockers: Vec<EmissionId>,
    /// Operator commands waiting on this instance settling, with the goal
    /// each one asked for.
    #[serde(default)]
    pub waiters: Vec<(crate::event::WaiterId, Goal)>,
    /// The `starting`/`stopping` emission this instance holds for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_on: Option<EmissionId>,
    #[serde(default)]
    pub respawn: RespawnCounter,
    /// How the current cycle is ending; reported on `stopped`.
    #[serde(default)]
    pub result: JobResult,
    /// Process kind that caused a failure, when result is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_process: Option<ProcessKind>,
    /// Exit status of the last terminated main process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<ExitStatus>,
    /// Main process group to signal; survives main-pid removal for
    /// daemonized services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_pgid: Option<u32>,
    /// Set once an `expect fork|daemon` service detached successfully.
    #[serde(default)]
    pub daemonized: bool,
    /// Epoch ms of instance creation.
    #[serde(default)]
    pub created_at_ms: u64,
    /// Fields written by a newer supervisor version; preserved so a
    /// downgrade round-trips them untouched.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobInstance {
    /// A fresh instance in `waiting` with goal `stop`, as the automaton
    /// expects before the first goal change.
    pub fn new(id: InstanceId, env: Vec<(String, String)>, now_ms: u64) -> Self {
        Self {
            id,
            goal: Goal::Stop,
            state: JobState::Waiting,
            pids: Vec::new(),
            env,
            blockers: Vec::new(),
            waiters: Vec::new(),
            blocked_on: None,
            respawn: RespawnCounter::default(),
            result: JobResult::Ok,
            failed_process: None,
            exit_status: None,
            main_pgid: None,
            daemonized: false,
            created_at_ms: now_ms,
            extra: serde_json::Map::new(),
        }
    }

    pub fn pid_of(&self, kind: ProcessKind) -> Option<u32> {
        self.pids
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, pid)| *pid)
    }

    pub fn set_pid(&mut self, kind: ProcessKind, pid: u32) {
        self.pids.retain(|(k, _)| *k != kind);
        self.pids.push((kind, pid));
        if kind == ProcessKind::Main {
            self.main_pgid = Some(pid);
        }
    }

    /// Remove a pid on reap; returns the kind it belonged to.
    pub fn clear_pid(&mut self, pid: u32) -> Option<ProcessKind> {
        let kind = self
            .pids
            .iter()
            .find(|(_, p)| *p == pid)
            .map(|(k, _)| *k)?;
        self.pids.retain(|(_, p)| *p != pid);
        Some(kind)
    }

    /// Record a failure of the given process; the first failure wins.
    pub fn mark_failed(&mut self, kind: ProcessKind, status: Option<ExitStatus>) {
        if self.result != JobResult::Failed {
            self.result = JobResult::Failed;
            self.failed_process = Some(kind);
            self.exit_status = status;
        }
    }

    /// Clear per-cycle result tracking when a new start cycle begins.
    pub fn reset_cycle(&mut self) {
        self.result = JobResult::Ok;
        self.failed_process = None;
        self.exit_status = None;
        self.daemonized = false;
    }

    /// Whether the instance has reached a settled point for its goal:
    /// `running` for a starting service, `waiting` for everything else.
    pub fn is_settled(&self) -> bool {
        match self.goal {
            Goal::Start => self.state == JobState::Running,
            Goal::Stop => self.state == JobState::Waiting,
        }
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
