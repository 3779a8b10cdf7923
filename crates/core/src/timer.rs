// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer identifier type for tracking scheduled timers.
//!
//! TimerId encodes which instance a timer belongs to and why it was armed,
//! so a fired timer routes straight back into the owning automaton.

use crate::instance::InstanceId;

crate::define_id! {
    /// Unique identifier for a timer instance.
    ///
    /// Timers drive the kill-signal escalation, the `expect` readiness
    /// watchdog, and the shutdown quiesce interval.
    pub struct TimerId;
}

impl TimerId {
    /// Timer armed when the kill signal is sent; expiry escalates to SIGKILL.
    pub fn kill_timeout(instance: &InstanceId) -> Self {
        Self::new(format!("kill:{}", instance))
    }

    /// Watchdog armed in `spawned` while waiting on the `expect` contract.
    pub fn expect_watchdog(instance: &InstanceId) -> Self {
        Self::new(format!("expect:{}", instance))
    }

    /// Shutdown quiesce interval; expiry escalates remaining instances.
    pub fn quiesce() -> Self {
        Self::new("quiesce")
    }

    pub fn is_kill_timeout(&self) -> bool {
        self.0.starts_with("kill:")
    }

    pub fn is_expect_watchdog(&self) -> bool {
        self.0.starts_with("expect:")
    }

    pub fn is_quiesce(&self) -> bool {
        self.0 == "quiesce"
    }

    /// The instance this timer belongs to, if any.
    pub fn instance(&self) -> Option<InstanceId> {
        self.0
            .strip_prefix("kill:")
            .or_else(|| self.0.strip_prefix("expect:"))
            .map(InstanceId::from_label)
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
