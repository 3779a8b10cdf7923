// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control protocol for supervisor communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. The
//! operations mirror what `initctl`-style tooling needs: event emission,
//! job start/stop/restart, catalog reload, environment management,
//! introspection, and supervisor control (re-exec, shutdown).

use ember_core::{Goal, JobState};
use serde::{Deserialize, Serialize};

#[path = "protocol_wire.rs"]
pub mod wire;

/// Request from a client to the supervisor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Enqueue an event; with `wait` the reply arrives only once every
    /// triggered instance has settled.
    EmitEvent {
        name: String,
        /// `KEY=VALUE` pairs
        #[serde(default)]
        env: Vec<String>,
        #[serde(default)]
        wait: bool,
    },

    /// Re-scan the configuration tree
    ReloadConfiguration,

    /// All known job classes with their live instances
    GetAllJobs,

    /// One job class by name
    GetJobByName { name: String },

    /// Live instances of one class
    GetAllInstances { name: String },

    /// One instance by expanded instance name
    GetInstanceByName { name: String, instance: String },

    /// One instance by the environment its start would have used
    GetInstance {
        name: String,
        #[serde(default)]
        env: Vec<String>,
    },

    Start {
        name: String,
        #[serde(default)]
        env: Vec<String>,
        #[serde(default)]
        wait: bool,
    },

    Stop {
        name: String,
        #[serde(default)]
        instance: String,
        #[serde(default)]
        wait: bool,
    },

    Restart {
        name: String,
        #[serde(default)]
        instance: String,
        #[serde(default)]
        wait: bool,
    },

    GetEnv { key: String },

    SetEnv {
        /// `KEY=VALUE`
        pair: String,
        /// Without replace, an existing key is retained
        #[serde(default = "default_true")]
        replace: bool,
    },

    UnsetEnv { key: String },

    ListEnv,

    ResetEnv,

    /// Log storage became writable (early-boot console logs may flush)
    NotifyDiskWriteable,

    /// Graceful shutdown of the session supervisor
    EndSession,

    /// Re-exec the supervisor binary in place
    RestartSupervisor,

    GetVersion,

    GetLogPriority,

    SetLogPriority { priority: String },
}

fn default_true() -> bool {
    true
}

/// One live instance, as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceEntry {
    pub name: String,
    pub instance: String,
    pub goal: Goal,
    pub state: JobState,
    /// `(process kind, pid)` for every live process
    pub processes: Vec<(String, u32)>,
}

/// One job class, as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    pub task: bool,
    pub instances: Vec<InstanceEntry>,
}

/// Response from the supervisor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Success with nothing to report
    Ok,

    /// Request failed; the message is what the CLI prints
    Error { message: String },

    Pong,

    Version { version: String },

    Jobs { jobs: Vec<JobEntry> },

    Job { job: JobEntry },

    Instances { instances: Vec<InstanceEntry> },

    Instance { instance: InstanceEntry },

    /// A waited-on emission finished (or failed)
    EventDone { failed: bool },

    /// Environment lookups; `None` means not set
    EnvValue { value: Option<String> },

    EnvList { entries: Vec<String> },

    LogPriority { priority: String },

    /// Reload finished; per-file parse errors, if any
    Reloaded { errors: Vec<String> },
}

impl Response {
    /// Shorthand used throughout the listener.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
