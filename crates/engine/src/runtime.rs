// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine: event queue, dependency resolution, and instance ownership.
//!
//! `Engine::handle_event` is the single entry point. It consumes one loop
//! event, drives the affected instances through the automaton in
//! [`crate::machine`], drains the event queue to quiescence, and returns
//! the external effects the daemon must perform. Nothing here touches the
//! OS, so the whole engine runs unchanged under tests with a fake clock and
//! fake process adapter.

use crate::instances::InstanceTable;
use crate::machine::{self, MachineCtx};
use crate::queue::{command_outcome, EventQueue, ParkedEmission};
use crate::spawn::expand_template;
use ember_catalog::{Catalog, Expression, ExpressionState, JobClass, LoadReport, TriggerEnv};
use ember_core::event::names;
use ember_core::{
    Clock, Effect, Emission, EmissionId, Event, Goal, InstanceId, JobEnvironment, JobInstance,
    JobResult, JobState, TimerId, WaiterId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval between the shutdown stop sweep and SIGKILL escalation.
pub const QUIESCE_INTERVAL: Duration = Duration::from_secs(10);

/// Supervisor-wide session identity and state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Stable id exposed to children as `EMBER_SESSION`.
    pub session_id: String,
    /// Current runlevel, `N` before any `runlevel` event.
    pub runlevel: String,
    pub prevlevel: String,
    pub shutting_down: bool,
    /// Bumped on every successful re-exec.
    pub generation: u32,
    /// Fields written by a newer supervisor version; preserved so a
    /// downgrade round-trips them untouched.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionInfo {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            runlevel: "N".to_string(),
            prevlevel: "N".to_string(),
            shutting_down: false,
            generation: 0,
            extra: serde_json::Map::new(),
        }
    }
}

/// Serializable engine state for the re-exec image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub instances: Vec<JobInstance>,
    pub pending: Vec<Emission>,
    pub parked: Vec<ParkedEmission>,
    pub global_env: JobEnvironment,
    pub session: SessionInfo,
    /// Class name → start-on expression state (sticky operand matches).
    pub start_states: serde_json::Value,
    /// Instance label → stop-on expression state.
    pub stop_states: serde_json::Value,
    /// Fields written by a newer supervisor version; preserved so a
    /// downgrade round-trips them untouched.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The job state engine.
pub struct Engine<C: Clock> {
    catalog: Catalog,
    instances: InstanceTable,
    queue: EventQueue,
    global_env: JobEnvironment,
    session: SessionInfo,
    clock: C,
    log_dir: PathBuf,
    /// Per-class start-on evaluation state.
    start_states: HashMap<String, ExpressionState>,
    /// Per-instance stop-on evaluation state.
    stop_states: HashMap<InstanceId, ExpressionState>,
    /// The definition each live instance started with; replaced only once
    /// the instance returns to `waiting`.
    pinned: HashMap<InstanceId, Arc<JobClass>>,
}

impl<C: Clock> Engine<C> {
    pub fn new(
        catalog: Catalog,
        clock: C,
        log_dir: PathBuf,
        global_env: JobEnvironment,
        session: SessionInfo,
    ) -> Self {
        let mut engine = Self {
            catalog,
            instances: InstanceTable::new(),
            queue: EventQueue::new(),
            global_env,
            session,
            clock,
            log_dir,
            start_states: HashMap::new(),
            stop_states: HashMap::new(),
            pinned: HashMap::new(),
        };
        engine.rebuild_start_states();
        engine
    }

    /// Process one loop event to quiescence.
    pub fn handle_event(&mut self, event: Event) -> Vec<Effect> {
        let span = tracing::debug_span!("event", event = event.name());
        let _guard = span.enter();
        debug!(fields = ?event.fields(), "handling");

        let mut out = Vec::new();
        match event {
            Event::Emit {
                name,
                env,
                wait,
                waiter,
            } => {
                self.queue.enqueue(name, env, wait, waiter);
            }
            Event::StartJob { class, env, waiter } => {
                self.start_job(&class, env, waiter, &mut out);
            }
            Event::StopJob {
                class,
                instance,
                waiter,
            } => {
                self.stop_job(&class, &instance, waiter, &mut out);
            }
            Event::RestartJob {
                class,
                instance,
                waiter,
                env: _,
            } => {
                self.restart_job(&class, &instance, waiter, &mut out);
            }
            Event::ProcessSpawned { id, kind, pid } => {
                self.instances.index_pid(pid, id.clone());
                self.drive(&id, &mut out, |inst, ctx| {
                    machine::process_spawned(inst, ctx, kind, pid)
                });
            }
            Event::SpawnFailed { id, kind, error } => {
                warn!(instance = %id, %kind, error, "spawn failed");
                self.drive(&id, &mut out, |inst, ctx| {
                    machine::spawn_failed(inst, ctx, kind)
                });
            }
            Event::ChildExited { pid, status } => {
                match self.instances.unindex_pid(pid) {
                    Some(owner) => {
                        let kind = self
                            .instances
                            .get_mut(&owner)
                            .and_then(|inst| inst.clear_pid(pid));
                        match kind {
                            Some(kind) => {
                                self.drive(&owner, &mut out, |inst, ctx| {
                                    machine::child_exited(inst, ctx, kind, status)
                                });
                            }
                            None => {
                                warn!(pid, instance = %owner, "exit for untracked pid kind");
                            }
                        }
                    }
                    None => {
                        // Not ours (or already forgotten): log and move on
                        debug!(pid, %status, "exit for unknown pid ignored");
                    }
                }
            }
            Event::ChildStopped { pid } => {
                if let Some(owner) = self.instances.owner_of(pid).cloned() {
                    self.drive(&owner, &mut out, |inst, ctx| {
                        machine::child_stopped(inst, ctx, pid)
                    });
                }
            }
            Event::TimerFired { id } => {
                if id.is_quiesce() {
                    out.extend(self.escalate_shutdown());
                } else if let Some(owner) = id.instance() {
                    self.drive(&owner, &mut out, |inst, ctx| {
                        machine::timer_expired(inst, ctx, &id)
                    });
                }
            }
            Event::ReloadConfiguration => {
                self.reload();
            }
            Event::Shutdown => {
                out.extend(self.begin_shutdown());
            }
        }

        out.extend(self.process_queue());
        out
    }

    /// Reload the configuration catalog, refreshing expression state for
    /// classes whose definition changed.
    pub fn reload(&mut self) -> LoadReport {
        let report = self.catalog.load_all();
        info!(
            added = report.added.len(),
            changed = report.changed.len(),
            removed = report.removed.len(),
            errors = report.errors.len(),
            "configuration reloaded"
        );
        for (path, error) in &report.errors {
            warn!(path = %path.display(), error, "configuration file skipped");
        }
        self.rebuild_start_states();
        report
    }

    // -- queries -----------------------------------------------------------

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn instances(&self) -> &InstanceTable {
        &self.instances
    }

    pub fn global_env(&self) -> &JobEnvironment {
        &self.global_env
    }

    pub fn global_env_mut(&mut self) -> &mut JobEnvironment {
        &mut self.global_env
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionInfo {
        &mut self.session
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The definition a live instance is running under.
    pub fn class_of(&self, id: &InstanceId) -> Option<Arc<JobClass>> {
        self.pinned.get(id).cloned()
    }

    /// Class lookup for RPC callers.
    pub fn get_class(&self, name: &str) -> Result<Arc<JobClass>, crate::RuntimeError> {
        self.catalog
            .lookup(name)
            .ok_or_else(|| crate::RuntimeError::UnknownJob(name.to_string()))
    }

    /// Instance lookup for RPC callers: by name, or the sole live instance
    /// when no name is given.
    pub fn find_instance(
        &self,
        class: &str,
        instance: &str,
    ) -> Result<&JobInstance, crate::RuntimeError> {
        if self.catalog.lookup_any(class).is_none() {
            return Err(crate::RuntimeError::UnknownJob(class.to_string()));
        }
        if !instance.is_empty() {
            let id = InstanceId::new(class, instance);
            return self
                .instances
                .get(&id)
                .ok_or_else(|| crate::RuntimeError::UnknownInstance(id.to_string()));
        }
        let live = self.instances.of_class(class);
        match live.len() {
            1 => Ok(live[0]),
            _ => Err(crate::RuntimeError::UnknownInstance(class.to_string())),
        }
    }

    /// Instance lookup by the environment a start would use: expands the
    /// class's instance template and resolves that name.
    pub fn find_instance_by_env(
        &self,
        class: &str,
        env: &[(String, String)],
    ) -> Result<&JobInstance, crate::RuntimeError> {
        let loaded = self
            .catalog
            .lookup_any(class)
            .ok_or_else(|| crate::RuntimeError::UnknownJob(class.to_string()))?;
        let name = expand_template(&loaded.class.instance, env)?;
        let id = InstanceId::new(class, name);
        self.instances
            .get(&id)
            .ok_or_else(|| crate::RuntimeError::UnknownInstance(id.to_string()))
    }

    /// Shutdown has been requested and every instance is gone.
    pub fn shutdown_complete(&self) -> bool {
        self.session.shutting_down && self.instances.is_empty()
    }

    // -- re-exec -----------------------------------------------------------

    /// Snapshot everything needed to resume supervision after exec.
    pub fn export_state(&self) -> EngineState {
        let (pending, parked) = self.queue.snapshot();
        EngineState {
            instances: self.instances.all().into_iter().cloned().collect(),
            pending,
            parked,
            global_env: self.global_env.clone(),
            session: self.session.clone(),
            start_states: serde_json::to_value(&self.start_states)
                .unwrap_or(serde_json::Value::Null),
            stop_states: serde_json::to_value(
                self.stop_states
                    .iter()
                    .map(|(id, state)| (id.to_string(), state.clone()))
                    .collect::<HashMap<String, ExpressionState>>(),
            )
            .unwrap_or(serde_json::Value::Null),
            extra: serde_json::Map::new(),
        }
    }

    /// Rebuild runtime state from a re-exec image.
    ///
    /// Children are still ours (pid mapping persists across exec); timers
    /// are re-armed from state. Returns the effects to perform.
    pub fn restore_state(&mut self, state: EngineState) -> Vec<Effect> {
        self.global_env = state.global_env;
        self.session = state.session;

        if let Ok(states) =
            serde_json::from_value::<HashMap<String, ExpressionState>>(state.start_states)
        {
            for (class, restored) in states {
                self.start_states.insert(class, restored);
            }
        }
        let stop_states = serde_json::from_value::<HashMap<String, ExpressionState>>(
            state.stop_states,
        )
        .unwrap_or_default();

        let mut effects = Vec::new();
        for instance in state.instances {
            let id = instance.id.clone();
            let Some(class) = self.catalog.lookup_any(&id.class).map(|l| Arc::clone(&l.class))
            else {
                warn!(instance = %id, "restored instance has no class definition, dropping");
                continue;
            };

            // Re-arm timers implied by the state
            match instance.state {
                JobState::Killed => effects.push(Effect::SetTimer {
                    id: TimerId::kill_timeout(&id),
                    duration: Duration::from_secs(u64::from(class.kill_timeout)),
                }),
                JobState::Spawned
                    if class.expect != ember_core::ExpectMode::None =>
                {
                    effects.push(Effect::SetTimer {
                        id: TimerId::expect_watchdog(&id),
                        duration: Duration::from_secs(u64::from(class.kill_timeout)),
                    });
                }
                _ => {}
            }

            let fresh_stop_state = stop_state_for(&class);
            let restored_stop_state = stop_states
                .get(&id.to_string())
                .filter(|state| state.slot_count() == fresh_stop_state.slot_count())
                .cloned()
                .unwrap_or(fresh_stop_state);
            self.stop_states.insert(id.clone(), restored_stop_state);
            self.pinned.insert(id, class);
            self.instances.insert(instance);
        }
        self.instances.reindex();
        self.queue.restore(state.pending, state.parked);
        // Drop preserved expression state that no longer fits its expression
        self.rebuild_start_states();

        info!(
            instances = self.instances.len(),
            pending_events = self.queue.pending_len(),
            generation = self.session.generation,
            "runtime state restored"
        );
        effects
    }

    // -- operator commands -------------------------------------------------

    fn start_job(
        &mut self,
        class_name: &str,
        env: Vec<(String, String)>,
        waiter: Option<WaiterId>,
        out: &mut Vec<Effect>,
    ) {
        let Some(class) = self.catalog.lookup(class_name) else {
            complete_command(out, waiter, false, &format!("unknown job: {class_name}"));
            return;
        };

        let instance_name = match expand_template(&class.instance, &env) {
            Ok(name) => name,
            Err(e) => {
                complete_command(out, waiter, false, &e.to_string());
                return;
            }
        };
        let id = InstanceId::new(&class.name, instance_name);

        if let Some(inst) = self.instances.get(&id) {
            if !(inst.state == JobState::Waiting && inst.goal == Goal::Stop) {
                if inst.goal == Goal::Start {
                    complete_command(out, waiter, false, "job is already running");
                    return;
                }
                // Stop cycle in flight: flip back to start below
            } else {
                // Fresh cycle from waiting: adopt the operator environment
                // and the latest definition
                self.pinned.insert(id.clone(), Arc::clone(&class));
                self.stop_states.insert(id.clone(), stop_state_for(&class));
                if let Some(inst) = self.instances.get_mut(&id) {
                    inst.env = env.clone();
                }
            }
        } else {
            self.create_instance(&class, id.clone(), env);
        }

        if let Some(waiter) = waiter {
            if let Some(inst) = self.instances.get_mut(&id) {
                inst.waiters.push((waiter, Goal::Start));
            }
        }
        self.drive(&id, out, |inst, ctx| {
            machine::set_goal(inst, ctx, Goal::Start)
        });
    }

    fn stop_job(
        &mut self,
        class_name: &str,
        instance_name: &str,
        waiter: Option<WaiterId>,
        out: &mut Vec<Effect>,
    ) {
        let Some(id) = self.resolve_instance(class_name, instance_name, waiter, out) else {
            return;
        };
        if let Some(waiter) = waiter {
            if let Some(inst) = self.instances.get_mut(&id) {
                inst.waiters.push((waiter, Goal::Stop));
            }
        }
        self.drive(&id, out, |inst, ctx| {
            machine::set_goal(inst, ctx, Goal::Stop)
        });
    }

    fn restart_job(
        &mut self,
        class_name: &str,
        instance_name: &str,
        waiter: Option<WaiterId>,
        out: &mut Vec<Effect>,
    ) {
        let Some(id) = self.resolve_instance(class_name, instance_name, waiter, out) else {
            return;
        };
        if let Some(waiter) = waiter {
            if let Some(inst) = self.instances.get_mut(&id) {
                inst.waiters.push((waiter, Goal::Start));
            }
        }
        self.drive(&id, out, |inst, ctx| {
            machine::set_goal(inst, ctx, Goal::Stop)
        });
        self.drive(&id, out, |inst, ctx| {
            machine::set_goal(inst, ctx, Goal::Start)
        });
    }

    /// Find the live instance an operator command names.
    fn resolve_instance(
        &mut self,
        class_name: &str,
        instance_name: &str,
        waiter: Option<WaiterId>,
        out: &mut Vec<Effect>,
    ) -> Option<InstanceId> {
        if self.catalog.lookup_any(class_name).is_none() {
            complete_command(out, waiter, false, &format!("unknown job: {class_name}"));
            return None;
        }

        if !instance_name.is_empty() {
            let id = InstanceId::new(class_name, instance_name);
            if !self.instances.contains(&id) {
                complete_command(out, waiter, false, &format!("unknown instance: {id}"));
                return None;
            }
            return Some(id);
        }

        let live = self.instances.of_class(class_name);
        match live.len() {
            0 => {
                complete_command(out, waiter, false, "job is not running");
                None
            }
            1 => Some(live[0].id.clone()),
            _ => {
                complete_command(
                    out,
                    waiter,
                    false,
                    "multiple instances running, name one",
                );
                None
            }
        }
    }

    // -- shutdown ----------------------------------------------------------

    fn begin_shutdown(&mut self) -> Vec<Effect> {
        if self.session.shutting_down {
            return Vec::new();
        }
        info!("graceful shutdown requested");
        self.session.shutting_down = true;
        self.queue.enqueue(names::SHUTDOWN, vec![], false, None);

        let mut out = Vec::new();
        for id in self.instances.ids() {
            self.drive(&id, &mut out, |inst, ctx| {
                machine::set_goal(inst, ctx, Goal::Stop)
            });
        }
        out.push(Effect::SetTimer {
            id: TimerId::quiesce(),
            duration: QUIESCE_INTERVAL,
        });
        out
    }

    /// The quiesce interval lapsed: SIGKILL whatever is still alive.
    fn escalate_shutdown(&mut self) -> Vec<Effect> {
        let mut out = Vec::new();
        for instance in self.instances.all() {
            for (kind, pid) in &instance.pids {
                warn!(
                    instance = %instance.id,
                    %kind,
                    pid,
                    "quiesce interval lapsed, sending SIGKILL"
                );
                out.push(Effect::Signal {
                    pid: instance.main_pgid.unwrap_or(*pid),
                    signal: 9,
                    group: true,
                });
            }
        }
        out
    }

    // -- queue processing --------------------------------------------------

    /// Drain the event queue to quiescence.
    fn process_queue(&mut self) -> Vec<Effect> {
        let mut out = Vec::new();
        while let Some(emission) = self.queue.take_next() {
            self.handle_emission(emission, &mut out);
        }
        out
    }

    /// Match one emission against the catalog and the live instances.
    fn handle_emission(&mut self, emission: Emission, out: &mut Vec<Effect>) {
        debug!(emission = %emission.log_summary(), "matching");

        if emission.name == names::RUNLEVEL {
            self.note_runlevel(&emission);
        }

        let mut blockers: Vec<InstanceId> = Vec::new();

        // Start intents: classes whose start-on newly satisfies
        if !self.session.shutting_down {
            let mut fired: Vec<(Arc<JobClass>, TriggerEnv)> = Vec::new();
            for class in self.catalog.classes() {
                if class.manual {
                    continue;
                }
                let Some(expr) = class.start_on.as_ref() else {
                    continue;
                };
                let state = self
                    .start_states
                    .entry(class.name.clone())
                    .or_insert_with(|| ExpressionState::new(expr));
                state.feed(expr, &emission);
                if let Some(trigger) = state.trigger(expr) {
                    state.reset();
                    fired.push((Arc::clone(&class), trigger));
                }
            }
            for (class, trigger) in fired {
                self.apply_start_intent(&class, trigger, &emission, &mut blockers, out);
            }
        }

        // Stop intents: live instances whose stop-on newly satisfies
        let mut stop_fired: Vec<InstanceId> = Vec::new();
        for instance in self.instances.all() {
            if instance.state == JobState::Waiting {
                continue;
            }
            let id = instance.id.clone();
            let Some(class) = self.pinned.get(&id) else {
                continue;
            };
            let Some(expr) = class.stop_on.as_ref() else {
                continue;
            };
            let Some(state) = self.stop_states.get_mut(&id) else {
                continue;
            };
            state.feed(expr, &emission);
            if state.satisfied(expr) {
                state.reset();
                stop_fired.push(id);
            }
        }
        for id in stop_fired {
            if emission.wait {
                if let Some(inst) = self.instances.get_mut(&id) {
                    inst.blockers.push(emission.id);
                    blockers.push(id.clone());
                }
            }
            self.drive(&id, out, |inst, ctx| {
                machine::set_goal(inst, ctx, Goal::Stop)
            });
        }

        // Park on blockers or complete right away
        let id = emission.id;
        let (completed, effect) = self.settle_emission(emission, blockers);
        if let Some(effect) = effect {
            out.push(effect);
        }
        if completed {
            self.ack_blocked(id, out);
        }
    }

    fn settle_emission(
        &mut self,
        emission: Emission,
        blockers: Vec<InstanceId>,
    ) -> (bool, Option<Effect>) {
        let completed = blockers.is_empty();
        let effect = self.queue.settle_handling(emission, blockers);
        (completed, effect)
    }

    /// A start-on expression fired for `class`.
    fn apply_start_intent(
        &mut self,
        class: &Arc<JobClass>,
        trigger: TriggerEnv,
        emission: &Emission,
        blockers: &mut Vec<InstanceId>,
        out: &mut Vec<Effect>,
    ) {
        let instance_name = match expand_template(&class.instance, &trigger.env) {
            Ok(name) => name,
            Err(e) => {
                warn!(class = %class.name, error = %e, "instance template expansion failed");
                return;
            }
        };
        let id = InstanceId::new(&class.name, instance_name);

        if let Some(inst) = self.instances.get_mut(&id) {
            if !(inst.state == JobState::Waiting && inst.goal == Goal::Stop) {
                // Already live: a satisfied start-on does not queue another
                // cycle
                debug!(instance = %id, "start-on satisfied but instance already active");
                return;
            }
            inst.env = trigger.env.clone();
            self.pinned.insert(id.clone(), Arc::clone(class));
            self.stop_states.insert(id.clone(), stop_state_for(class));
        } else {
            self.create_instance(class, id.clone(), trigger.env.clone());
        }

        info!(instance = %id, emission = %emission.log_summary(), "start intent");
        if emission.wait {
            if let Some(inst) = self.instances.get_mut(&id) {
                inst.blockers.push(emission.id);
                blockers.push(id.clone());
            }
        }
        self.drive(&id, out, |inst, ctx| {
            machine::set_goal(inst, ctx, Goal::Start)
        });
    }

    fn create_instance(&mut self, class: &Arc<JobClass>, id: InstanceId, env: Vec<(String, String)>) {
        let instance = JobInstance::new(id.clone(), env, self.clock.epoch_ms());
        self.stop_states.insert(id.clone(), stop_state_for(class));
        self.pinned.insert(id.clone(), Arc::clone(class));
        self.instances.insert(instance);
    }

    fn note_runlevel(&mut self, emission: &Emission) {
        let current = emission
            .var(ember_core::event::keys::RUNLEVEL)
            .unwrap_or("N")
            .to_string();
        self.session.prevlevel = std::mem::replace(&mut self.session.runlevel, current);
        info!(
            runlevel = %self.session.runlevel,
            prevlevel = %self.session.prevlevel,
            "runlevel changed"
        );
    }

    // -- machine plumbing --------------------------------------------------

    /// Run one machine transition on an instance and absorb its effects.
    fn drive<F>(&mut self, id: &InstanceId, out: &mut Vec<Effect>, transition: F)
    where
        F: for<'a> FnOnce(&mut JobInstance, &MachineCtx<'a>) -> Vec<Effect>,
    {
        let Some(class) = self.pinned.get(id).cloned() else {
            debug!(instance = %id, "transition for unknown instance dropped");
            return;
        };
        let now_ms = self.clock.epoch_ms();
        let effects = {
            let Some(inst) = self.instances.get_mut(id) else {
                return;
            };
            let ctx = MachineCtx {
                class: &class,
                global_env: &self.global_env,
                session: &self.session.session_id,
                log_dir: &self.log_dir,
                now_ms,
            };
            transition(inst, &ctx)
        };
        self.apply_instance_effects(id, effects, out);
        self.check_settle(id, out);
    }

    /// Route machine effects: synthetic emissions enter the queue (linking
    /// the ack for `starting`/`stopping`), the rest go to the executor.
    fn apply_instance_effects(
        &mut self,
        id: &InstanceId,
        effects: Vec<Effect>,
        out: &mut Vec<Effect>,
    ) {
        for effect in effects {
            match effect {
                Effect::Emit { name, env } => {
                    let ack = name == names::STARTING || name == names::STOPPING;
                    let emission_id = self.queue.enqueue(name, env, false, None);
                    if ack {
                        if let Some(inst) = self.instances.get_mut(id) {
                            inst.blocked_on = Some(emission_id);
                        }
                    }
                }
                other => out.push(other),
            }
        }
    }

    /// An emission finished handling: advance every instance holding for it.
    fn ack_blocked(&mut self, emission: EmissionId, out: &mut Vec<Effect>) {
        let held: Vec<InstanceId> = self
            .instances
            .all()
            .into_iter()
            .filter(|inst| inst.blocked_on == Some(emission))
            .map(|inst| inst.id.clone())
            .collect();
        for id in held {
            self.drive(&id, out, |inst, ctx| machine::emission_acked(inst, ctx));
        }
    }

    /// Release blockers and waiters at settle points; destroy instances
    /// that finished their stop cycle.
    fn check_settle(&mut self, id: &InstanceId, out: &mut Vec<Effect>) {
        let Some(inst) = self.instances.get(id) else {
            return;
        };
        let task = self
            .pinned
            .get(id)
            .map(|class| class.task)
            .unwrap_or(false);

        let start_settled =
            inst.goal == Goal::Start && inst.state == JobState::Running && !task;
        let stop_settled = inst.goal == Goal::Stop && inst.state == JobState::Waiting;
        if !start_settled && !stop_settled {
            return;
        }

        let result_ok = inst.result == JobResult::Ok;
        let blocker_ok = start_settled || result_ok;

        let (blockers, waiters) = {
            let Some(inst) = self.instances.get_mut(id) else {
                return;
            };
            (
                std::mem::take(&mut inst.blockers),
                std::mem::take(&mut inst.waiters),
            )
        };

        for emission in blockers {
            if let Some(effect) = self.queue.release_blocker(emission, id, blocker_ok) {
                out.push(effect);
            }
        }
        for (waiter, wanted) in waiters {
            let (ok, detail) = match (wanted, start_settled) {
                (Goal::Start, true) => (true, ""),
                (Goal::Start, false) if result_ok => (true, ""),
                (Goal::Start, false) => (false, "job failed to start"),
                (Goal::Stop, false) => (true, ""),
                (Goal::Stop, true) => (false, "stop superseded by start"),
            };
            out.push(Effect::CompleteCommand {
                waiter,
                outcome: command_outcome(ok, detail),
            });
        }

        if stop_settled {
            // The waiting boundary resets expression stickiness
            if let Some(state) = self.start_states.get_mut(&id.class) {
                state.reset();
            }
            if let Some(state) = self.stop_states.get_mut(id) {
                state.reset();
            }
            self.destroy_if_done(id, out);
        }
    }

    /// Destroy an instance that settled in `waiting` with nothing pending.
    fn destroy_if_done(&mut self, id: &InstanceId, out: &mut Vec<Effect>) {
        let done = self
            .instances
            .get(id)
            .map(|inst| {
                inst.state == JobState::Waiting
                    && inst.goal == Goal::Stop
                    && inst.blockers.is_empty()
                    && inst.waiters.is_empty()
                    && inst.blocked_on.is_none()
            })
            .unwrap_or(false);
        if !done {
            return;
        }

        debug!(instance = %id, "destroying settled instance");
        self.instances.remove(id);
        self.stop_states.remove(id);
        self.pinned.remove(id);
        // Parked emissions may still hold a reference
        out.extend(self.queue.drop_blocker(id));
        self.catalog.retire(&id.class);
    }

    fn rebuild_start_states(&mut self) {
        let mut rebuilt: HashMap<String, ExpressionState> = HashMap::new();
        for class in self.catalog.classes() {
            if let Some(expr) = class.start_on.as_ref() {
                let state = self
                    .start_states
                    .remove(&class.name)
                    .filter(|state| state_fits(state, expr))
                    .unwrap_or_else(|| ExpressionState::new(expr));
                rebuilt.insert(class.name.clone(), state);
            }
        }
        self.start_states = rebuilt;
    }
}

/// Keep restored/preserved state only when it still matches the expression
/// shape (one slot per operand).
fn state_fits(state: &ExpressionState, expr: &Expression) -> bool {
    state.slot_count() == expr.operand_count()
}

fn stop_state_for(class: &JobClass) -> ExpressionState {
    class
        .stop_on
        .as_ref()
        .map(ExpressionState::new)
        .unwrap_or_default()
}

fn complete_command(out: &mut Vec<Effect>, waiter: Option<WaiterId>, ok: bool, detail: &str) {
    if !ok {
        warn!(detail, "command rejected");
    }
    if let Some(waiter) = waiter {
        out.push(Effect::CompleteCommand {
            waiter,
            outcome: command_outcome(ok, detail),
        });
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
