// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects represent side effects the supervisor needs to perform.
//!
//! The state machine never touches the OS: it returns effects, the daemon's
//! executor carries them out and feeds resulting events back into the loop.

use crate::event::{EmissionId, WaiterId};
use crate::instance::InstanceId;
use crate::job::{CommandLine, ConsoleMode, ProcessKind};
use crate::timer::TimerId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One resource limit applied to a spawned process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimit {
    /// Resource name as written in the configuration (`nofile`, `core`, ...).
    pub resource: String,
    /// Soft limit; `u64::MAX` encodes `unlimited`.
    pub soft: u64,
    /// Hard limit; `u64::MAX` encodes `unlimited`.
    pub hard: u64,
}

/// Everything the process supervisor needs to fork one child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub id: InstanceId,
    pub kind: ProcessKind,
    pub command: CommandLine,
    /// Fully assembled child environment, later entries winning.
    pub env: Vec<(String, String)>,
    pub console: ConsoleMode,
    /// Destination for captured output when console is `log`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chdir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chroot: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub umask: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nice: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oom_score: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub limits: Vec<ResourceLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setgid: Option<String>,
}

/// How a waited-on emission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionOutcome {
    Finished,
    Failed,
}

/// How an operator command ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Ok,
    Failed(String),
}

/// Effects that need to be executed by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Fork a child for an instance.
    Spawn { request: SpawnRequest },

    /// Deliver a signal to a pid or its process group.
    Signal { pid: u32, signal: i32, group: bool },

    /// Arm a timer.
    SetTimer {
        id: TimerId,
        #[serde(with = "duration_serde")]
        duration: Duration,
    },

    /// Disarm a timer.
    CancelTimer { id: TimerId },

    /// Enqueue a synthetic event (never blocks its emitter).
    Emit {
        name: String,
        env: Vec<(String, String)>,
    },

    /// Resolve an RPC caller blocked on an emission.
    CompleteEmission {
        id: EmissionId,
        waiter: WaiterId,
        outcome: EmissionOutcome,
    },

    /// Resolve an RPC caller blocked on an operator command.
    CompleteCommand {
        waiter: WaiterId,
        outcome: CommandOutcome,
    },
}

impl Effect {
    /// Effect name for log spans (e.g., "spawn", "signal")
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Spawn { .. } => "spawn",
            Effect::Signal { .. } => "signal",
            Effect::SetTimer { .. } => "set_timer",
            Effect::CancelTimer { .. } => "cancel_timer",
            Effect::Emit { .. } => "emit",
            Effect::CompleteEmission { .. } => "complete_emission",
            Effect::CompleteCommand { .. } => "complete_command",
        }
    }

    /// Key-value pairs for structured logging
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Spawn { request } => vec![
                ("instance", request.id.to_string()),
                ("kind", request.kind.to_string()),
                ("command", request.command.summary().to_string()),
                ("console", request.console.to_string()),
            ],
            Effect::Signal { pid, signal, group } => vec![
                ("pid", pid.to_string()),
                ("signal", signal.to_string()),
                ("group", group.to_string()),
            ],
            Effect::SetTimer { id, duration } => vec![
                ("timer_id", id.to_string()),
                ("duration_ms", duration.as_millis().to_string()),
            ],
            Effect::CancelTimer { id } => vec![("timer_id", id.to_string())],
            Effect::Emit { name, env } => {
                vec![("event", name.clone()), ("vars", env.len().to_string())]
            }
            Effect::CompleteEmission { id, waiter, outcome } => vec![
                ("emission", id.to_string()),
                ("waiter", waiter.to_string()),
                ("outcome", format!("{:?}", outcome)),
            ],
            Effect::CompleteCommand { waiter, outcome } => vec![
                ("waiter", waiter.to_string()),
                ("outcome", format!("{:?}", outcome)),
            ],
        }
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
