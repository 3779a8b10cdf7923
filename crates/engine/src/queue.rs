// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event queue: ordered emissions, serial handling, blocking emitters.
//!
//! Emissions are handled strictly one at a time. Handling an emission means
//! matching it against the whole catalog exactly once; afterwards the
//! emission either completes immediately or *parks* on the set of instances
//! it triggered (its blockers) while the queue moves on. A parked emission
//! completes when its last blocker settles, and fails if any blocker settled
//! badly.

use ember_core::{
    CommandOutcome, Effect, Emission, EmissionId, EmissionOutcome, EmissionProgress, InstanceId,
    WaiterId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// A parked emission with its outstanding blockers.
///
/// Serializable as-is: a blocker that already settled badly must keep the
/// emission marked failed across re-exec, so `failed` rides the snapshot
/// next to the remaining blocker set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkedEmission {
    pub emission: Emission,
    pub remaining: Vec<InstanceId>,
    #[serde(default)]
    pub failed: bool,
}

/// FIFO of emissions awaiting processing, plus the parked set.
#[derive(Debug, Default)]
pub struct EventQueue {
    next_id: u64,
    pending: VecDeque<Emission>,
    parked: HashMap<EmissionId, ParkedEmission>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an emission; returns its assigned id.
    pub fn enqueue(
        &mut self,
        name: impl Into<String>,
        env: Vec<(String, String)>,
        wait: bool,
        waiter: Option<WaiterId>,
    ) -> EmissionId {
        self.next_id += 1;
        let id = EmissionId(self.next_id);
        let emission = Emission::new(id, name, env)
            .with_wait(wait)
            .with_waiter(waiter);
        debug!(emission = %emission.log_summary(), wait, "queued");
        self.pending.push_back(emission);
        id
    }

    /// Pop the head emission for handling.
    pub fn take_next(&mut self) -> Option<Emission> {
        let mut emission = self.pending.pop_front()?;
        emission.progress = EmissionProgress::Handling;
        Some(emission)
    }

    /// Finish handling an emission.
    ///
    /// With blockers the emission parks; without, it completes right away
    /// (returning a completion effect when an RPC caller waits on it).
    pub fn settle_handling(
        &mut self,
        mut emission: Emission,
        blockers: Vec<InstanceId>,
    ) -> Option<Effect> {
        if blockers.is_empty() {
            emission.progress = EmissionProgress::Finished;
            return completion_effect(&emission);
        }
        debug!(
            emission = %emission.log_summary(),
            blockers = blockers.len(),
            "parked on triggered instances"
        );
        self.parked.insert(
            emission.id,
            ParkedEmission {
                emission,
                remaining: blockers,
                failed: false,
            },
        );
        None
    }

    /// One blocker of a parked emission settled.
    ///
    /// Returns a completion effect once the emission has no blockers left.
    pub fn release_blocker(
        &mut self,
        id: EmissionId,
        instance: &InstanceId,
        ok: bool,
    ) -> Option<Effect> {
        let parked = self.parked.get_mut(&id)?;
        parked.remaining.retain(|blocked_on| blocked_on != instance);
        if !ok {
            parked.failed = true;
        }
        if !parked.remaining.is_empty() {
            return None;
        }
        let mut parked = self.parked.remove(&id)?;
        parked.emission.progress = if parked.failed {
            EmissionProgress::Failed
        } else {
            EmissionProgress::Finished
        };
        debug!(
            emission = %parked.emission.log_summary(),
            progress = %parked.emission.progress,
            "all blockers settled"
        );
        completion_effect(&parked.emission)
    }

    /// Remove a destroyed instance from every parked emission.
    pub fn drop_blocker(&mut self, instance: &InstanceId) -> Vec<Effect> {
        let ids: Vec<EmissionId> = self.parked.keys().copied().collect();
        let mut effects = Vec::new();
        for id in ids {
            if let Some(effect) = self.release_blocker(id, instance, true) {
                effects.push(effect);
            }
        }
        effects
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pending emissions in order, plus the parked set (blockers and
    /// failure flags intact). Snapshot material for re-exec.
    pub fn snapshot(&self) -> (Vec<Emission>, Vec<ParkedEmission>) {
        let pending = self.pending.iter().cloned().collect();
        let mut parked: Vec<ParkedEmission> = self.parked.values().cloned().collect();
        parked.sort_by_key(|p| p.emission.id);
        (pending, parked)
    }

    /// Rebuild queue state from a snapshot, verbatim.
    pub fn restore(&mut self, pending: Vec<Emission>, parked: Vec<ParkedEmission>) {
        self.pending = pending.into();
        self.parked = parked
            .into_iter()
            .map(|parked| (parked.emission.id, parked))
            .collect();
        self.next_id = self
            .pending
            .iter()
            .map(|e| e.id.0)
            .chain(self.parked.keys().map(|id| id.0))
            .max()
            .unwrap_or(0);
    }
}

/// Completion effect for an emission with a waiting RPC caller.
fn completion_effect(emission: &Emission) -> Option<Effect> {
    let waiter = emission.waiter?;
    let outcome = if emission.progress == EmissionProgress::Failed {
        EmissionOutcome::Failed
    } else {
        EmissionOutcome::Finished
    };
    Some(Effect::CompleteEmission {
        id: emission.id,
        waiter,
        outcome,
    })
}

/// Outcome string for operator command completion, shared with the engine.
pub(crate) fn command_outcome(ok: bool, detail: &str) -> CommandOutcome {
    if ok {
        CommandOutcome::Ok
    } else {
        CommandOutcome::Failed(detail.to_string())
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
