// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The timer table driving kill escalation and readiness watchdogs.
//!
//! Three kinds of deadline live here, all keyed by [`TimerId`] so expiry
//! routes straight back to its owner: per-instance kill timeouts (expiry
//! escalates to SIGKILL), per-instance `expect` watchdogs (expiry fails the
//! start), and the single shutdown quiesce deadline. The daemon polls
//! [`Scheduler::fired_timers`] from its tick and feeds the resulting events
//! into the engine.

use ember_core::{Event, InstanceId, TimerId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Armed timers: one outstanding deadline per id.
#[derive(Debug, Default)]
pub struct Scheduler {
    armed: HashMap<TimerId, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer. Re-arming an id replaces its deadline, which is what a
    /// restarted kill sequence wants.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration, now: Instant) {
        self.armed.insert(id, now + duration);
    }

    /// Disarm a timer. Stale cancels are normal: a child that dies before
    /// its kill timeout cancels a timer that may have fired already.
    pub fn cancel_timer(&mut self, id: &TimerId) {
        self.armed.remove(id);
    }

    /// Disarm every timer owned by an instance (on destroy).
    pub fn cancel_instance_timers(&mut self, instance: &InstanceId) {
        self.armed
            .retain(|id, _| id.instance().as_ref() != Some(instance));
    }

    /// Collect expired timers as loop events, disarming each.
    pub fn fired_timers(&mut self, now: Instant) -> Vec<Event> {
        let mut expired: Vec<TimerId> = self
            .armed
            .iter()
            .filter(|(_, fires_at)| **fires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        // Deterministic order when several deadlines share a tick
        expired.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for id in &expired {
            self.armed.remove(id);
        }
        expired
            .into_iter()
            .map(|id| Event::TimerFired { id })
            .collect()
    }

    /// Earliest outstanding deadline, for idle-sleep planning.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed.values().copied().min()
    }

    pub fn has_timers(&self) -> bool {
        !self.armed.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
