// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor
//!
//! Carries out the effects the engine produces: forks through the process
//! adapter, signals, and timers. Spawn results come back as events to feed
//! into the next engine turn. Completion effects are not handled here; the
//! daemon resolves those against its reply channels.

use crate::process::ProcessAdapter;
use crate::scheduler::Scheduler;
use ember_core::{Clock, Effect, Event};
use std::sync::Arc;

use parking_lot::Mutex;

/// Executes effects using the configured process adapter
pub struct Executor<P, C: Clock> {
    processes: P,
    scheduler: Arc<Mutex<Scheduler>>,
    clock: C,
}

impl<P, C> Executor<P, C>
where
    P: ProcessAdapter,
    C: Clock,
{
    pub fn new(processes: P, scheduler: Arc<Mutex<Scheduler>>, clock: C) -> Self {
        Self {
            processes,
            scheduler,
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn scheduler(&self) -> Arc<Mutex<Scheduler>> {
        Arc::clone(&self.scheduler)
    }

    /// Execute a single effect with tracing.
    ///
    /// Returns an optional event to feed back into the engine.
    pub async fn execute(&self, effect: Effect) -> Option<Event> {
        let span = tracing::info_span!("effect", effect = effect.name());
        let _guard = span.enter();
        tracing::debug!(fields = ?effect.fields(), "executing");

        match effect {
            Effect::Spawn { request } => {
                let id = request.id.clone();
                let kind = request.kind;
                match self.processes.spawn(&request).await {
                    Ok(pid) => {
                        tracing::info!(instance = %id, %kind, pid, "spawned");
                        Some(Event::ProcessSpawned { id, kind, pid })
                    }
                    Err(error) => {
                        tracing::warn!(instance = %id, %kind, %error, "spawn failed");
                        Some(Event::SpawnFailed {
                            id,
                            kind,
                            error: error.to_string(),
                        })
                    }
                }
            }

            Effect::Signal { pid, signal, group } => {
                if let Err(error) = self.processes.signal(pid, signal, group) {
                    // The exit path still runs via the reaper
                    tracing::warn!(pid, signal, %error, "signal delivery failed");
                }
                None
            }

            Effect::SetTimer { id, duration } => {
                let now = self.clock.now();
                self.scheduler.lock().set_timer(id, duration, now);
                None
            }

            Effect::CancelTimer { id } => {
                self.scheduler.lock().cancel_timer(&id);
                None
            }

            // The engine consumes these internally; reaching the executor
            // means a routing bug upstream.
            Effect::Emit { name, .. } => {
                tracing::error!(event = name, "synthetic emission leaked to the executor");
                None
            }

            // Resolved by the daemon's listener against its reply channels
            Effect::CompleteEmission { .. } | Effect::CompleteCommand { .. } => None,
        }
    }

    /// Execute multiple effects in order, collecting feedback events.
    pub async fn execute_all(&self, effects: Vec<Effect>) -> Vec<Event> {
        let mut events = Vec::new();
        for effect in effects {
            if let Some(event) = self.execute(effect).await {
                events.push(event);
            }
        }
        events
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
