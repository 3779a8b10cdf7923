// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime-adjustable log verbosity.
//!
//! The control protocol speaks the classic priority names
//! (`debug`..`fatal`); they map onto tracing level filters through a reload
//! handle installed at subscriber setup.

use parking_lot::Mutex;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Priorities accepted by `log-priority`, in increasing severity.
pub const PRIORITIES: &[&str] = &["debug", "info", "message", "warn", "error", "fatal"];

/// Handle for adjusting the active log filter at runtime.
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    current: Mutex<String>,
}

impl LogControl {
    pub fn new(handle: reload::Handle<EnvFilter, Registry>, initial: &str) -> Self {
        Self {
            handle: Some(handle),
            current: Mutex::new(initial.to_string()),
        }
    }

    /// A control without a live subscriber (tests).
    pub fn disconnected(initial: &str) -> Self {
        Self {
            handle: None,
            current: Mutex::new(initial.to_string()),
        }
    }

    pub fn get(&self) -> String {
        self.current.lock().clone()
    }

    /// Switch the active priority.
    pub fn set(&self, priority: &str) -> Result<(), String> {
        let directive = filter_for(priority)
            .ok_or_else(|| format!("unknown log priority '{priority}'"))?;
        if let Some(handle) = &self.handle {
            handle
                .reload(EnvFilter::new(directive))
                .map_err(|e| format!("cannot change log priority: {e}"))?;
        }
        *self.current.lock() = priority.to_string();
        Ok(())
    }
}

/// tracing filter directive for a priority name.
fn filter_for(priority: &str) -> Option<&'static str> {
    let directive = match priority {
        "debug" => "debug",
        "info" | "message" => "info",
        "warn" => "warn",
        "error" | "fatal" => "error",
        _ => return None,
    };
    Some(directive)
}

#[cfg(test)]
#[path = "log_control_tests.rs"]
mod tests;
