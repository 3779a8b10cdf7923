// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-instance job automaton.
//!
//! Every function here is a pure transition: it mutates the instance record
//! and returns the effects the daemon must perform. No I/O happens in this
//! module, which is what makes the automaton testable with a fake clock and
//! a fake process adapter.
//!
//! Start cycle: `waiting → starting → pre-start → spawned → post-start →
//! running`. Stop cycle: `running → pre-stop → stopping → killed →
//! post-stop → waiting`. The `starting` and `stopping` states hold until the
//! matching synthetic emission has been handled by the event queue; the
//! engine routes that acknowledgement back via [`emission_acked`].

use crate::spawn::build_spawn_request;
use ember_catalog::JobClass;
use ember_core::event::{keys, names};
use ember_core::job::signal_name;
use ember_core::{
    Effect, ExitStatus, ExpectMode, Goal, JobEnvironment, JobInstance, JobResult, JobState,
    ProcessKind, TimerId,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// SIGKILL, for kill-timeout escalation.
const SIGKILL: i32 = 9;

/// SIGCONT, issued after an `expect stop` readiness SIGSTOP.
const SIGCONT: i32 = 18;

/// Everything a transition needs besides the instance itself.
pub(crate) struct MachineCtx<'a> {
    pub class: &'a JobClass,
    pub global_env: &'a JobEnvironment,
    pub session: &'a str,
    pub log_dir: &'a Path,
    pub now_ms: u64,
}

/// Apply a goal change.
///
/// Repeating the current goal is a no-op. The opposite flip acts immediately
/// from at-rest states (`waiting`, `spawned`, `post-start`, `running`) and is
/// otherwise honored at the next state boundary.
pub(crate) fn set_goal(inst: &mut JobInstance, ctx: &MachineCtx, goal: Goal) -> Vec<Effect> {
    if inst.goal == goal {
        return Vec::new();
    }
    inst.goal = goal;
    debug!(instance = %inst.id, %goal, state = %inst.state, "goal changed");

    match (goal, inst.state) {
        (Goal::Start, JobState::Waiting) => begin_start_cycle(inst, ctx),
        (Goal::Stop, JobState::Spawned | JobState::PostStart | JobState::Running) => {
            begin_stop_cycle(inst, ctx)
        }
        // Everything else resolves at the next state boundary
        _ => Vec::new(),
    }
}

/// The emission this instance was holding for has been handled.
pub(crate) fn emission_acked(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    inst.blocked_on = None;
    match inst.state {
        JobState::Starting => {
            if inst.goal == Goal::Stop {
                enter_stopping(inst, ctx)
            } else {
                enter_pre_start(inst, ctx)
            }
        }
        JobState::Stopping => enter_killed(inst, ctx),
        state => {
            warn!(instance = %inst.id, %state, "stray emission acknowledgement");
            Vec::new()
        }
    }
}

/// A requested fork completed.
pub(crate) fn process_spawned(
    inst: &mut JobInstance,
    ctx: &MachineCtx,
    kind: ProcessKind,
    pid: u32,
) -> Vec<Effect> {
    inst.set_pid(kind, pid);
    if kind == ProcessKind::Main && inst.state == JobState::Spawned {
        return match ctx.class.expect {
            ExpectMode::None => enter_post_start(inst, ctx),
            // Readiness contract outstanding: hold in spawned under a watchdog
            ExpectMode::Fork | ExpectMode::Daemon | ExpectMode::Stop => {
                vec![Effect::SetTimer {
                    id: TimerId::expect_watchdog(&inst.id),
                    duration: Duration::from_secs(u64::from(ctx.class.kill_timeout)),
                }]
            }
        };
    }
    Vec::new()
}

/// A requested fork could not be carried out.
pub(crate) fn spawn_failed(
    inst: &mut JobInstance,
    ctx: &MachineCtx,
    kind: ProcessKind,
) -> Vec<Effect> {
    warn!(instance = %inst.id, %kind, "spawn failed");
    inst.mark_failed(kind, None);
    match kind {
        ProcessKind::PreStart | ProcessKind::Main => {
            inst.goal = Goal::Stop;
            enter_stopping(inst, ctx)
        }
        // The start carries on without its helper
        ProcessKind::PostStart => enter_running(inst, ctx),
        ProcessKind::PreStop => enter_stopping(inst, ctx),
        ProcessKind::PostStop => finish_stop(inst, ctx),
    }
}

/// A child of this instance exited. The pid table entry has already been
/// cleared by the caller.
pub(crate) fn child_exited(
    inst: &mut JobInstance,
    ctx: &MachineCtx,
    kind: ProcessKind,
    status: ExitStatus,
) -> Vec<Effect> {
    match (inst.state, kind) {
        (JobState::PreStart, ProcessKind::PreStart) => {
            if inst.goal == Goal::Stop {
                enter_stopping(inst, ctx)
            } else if status.is_clean() {
                enter_spawned(inst, ctx)
            } else {
                inst.mark_failed(ProcessKind::PreStart, Some(status));
                inst.goal = Goal::Stop;
                enter_stopping(inst, ctx)
            }
        }

        (JobState::Spawned, ProcessKind::Main) => match ctx.class.expect {
            ExpectMode::Fork | ExpectMode::Daemon => {
                if status.is_clean() {
                    // Initial process forked away; supervision continues at
                    // process-group granularity.
                    inst.daemonized = true;
                    let mut effects = vec![Effect::CancelTimer {
                        id: TimerId::expect_watchdog(&inst.id),
                    }];
                    effects.extend(enter_post_start(inst, ctx));
                    effects
                } else {
                    inst.mark_failed(ProcessKind::Main, Some(status));
                    inst.goal = Goal::Stop;
                    let mut effects = vec![Effect::CancelTimer {
                        id: TimerId::expect_watchdog(&inst.id),
                    }];
                    effects.extend(enter_stopping(inst, ctx));
                    effects
                }
            }
            ExpectMode::Stop => {
                // Died before raising SIGSTOP
                inst.mark_failed(ProcessKind::Main, Some(status));
                inst.goal = Goal::Stop;
                let mut effects = vec![Effect::CancelTimer {
                    id: TimerId::expect_watchdog(&inst.id),
                }];
                effects.extend(enter_stopping(inst, ctx));
                effects
            }
            ExpectMode::None => main_exited(inst, ctx, status),
        },

        (JobState::PostStart | JobState::Running, ProcessKind::Main) => {
            main_exited(inst, ctx, status)
        }

        (JobState::PreStop | JobState::Stopping, ProcessKind::Main) => {
            // Main died while the stop cycle was already underway
            inst.exit_status = Some(status);
            Vec::new()
        }

        (JobState::Killed, ProcessKind::Main) => {
            let mut effects = vec![Effect::CancelTimer {
                id: TimerId::kill_timeout(&inst.id),
            }];
            effects.extend(enter_post_stop(inst, ctx));
            effects
        }

        (JobState::PostStart, ProcessKind::PostStart) => enter_running(inst, ctx),

        (JobState::PreStop, ProcessKind::PreStop) => {
            if inst.goal == Goal::Start {
                // Stop cancelled while pre-stop ran; main never went away
                info!(instance = %inst.id, "stop cancelled during pre-stop");
                inst.state = JobState::Running;
                Vec::new()
            } else {
                enter_stopping(inst, ctx)
            }
        }

        (JobState::PostStop, ProcessKind::PostStop) => {
            if !status.is_clean() {
                inst.mark_failed(ProcessKind::PostStop, Some(status));
            }
            finish_stop(inst, ctx)
        }

        (state, kind) => {
            // Late helper exits during teardown are unremarkable
            debug!(instance = %inst.id, %state, %kind, %status, "ignoring stray exit");
            Vec::new()
        }
    }
}

/// A child raised SIGSTOP (the `expect stop` readiness signal).
pub(crate) fn child_stopped(inst: &mut JobInstance, ctx: &MachineCtx, pid: u32) -> Vec<Effect> {
    if inst.state == JobState::Spawned
        && ctx.class.expect == ExpectMode::Stop
        && inst.pid_of(ProcessKind::Main) == Some(pid)
    {
        let mut effects = vec![
            Effect::CancelTimer {
                id: TimerId::expect_watchdog(&inst.id),
            },
            Effect::Signal {
                pid,
                signal: SIGCONT,
                group: false,
            },
        ];
        effects.extend(enter_post_start(inst, ctx));
        return effects;
    }
    debug!(instance = %inst.id, pid, "ignoring stop notification");
    Vec::new()
}

/// A timer owned by this instance fired.
pub(crate) fn timer_expired(
    inst: &mut JobInstance,
    ctx: &MachineCtx,
    timer: &TimerId,
) -> Vec<Effect> {
    if timer.is_kill_timeout() && inst.state == JobState::Killed {
        // Escalate to SIGKILL on the whole process group
        let target = inst
            .main_pgid
            .or_else(|| inst.pid_of(ProcessKind::Main));
        if let Some(pid) = target {
            warn!(instance = %inst.id, pid, "kill timeout expired, escalating to SIGKILL");
            return vec![Effect::Signal {
                pid,
                signal: SIGKILL,
                group: true,
            }];
        }
        return Vec::new();
    }

    if timer.is_expect_watchdog() && inst.state == JobState::Spawned {
        warn!(
            instance = %inst.id,
            expect = %ctx.class.expect,
            "readiness contract not met within the expect window"
        );
        inst.mark_failed(ProcessKind::Main, None);
        inst.goal = Goal::Stop;
        return enter_stopping(inst, ctx);
    }

    debug!(instance = %inst.id, %timer, "stale timer ignored");
    Vec::new()
}

// ---------------------------------------------------------------------------
// Cycle phases
// ---------------------------------------------------------------------------

fn begin_start_cycle(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    inst.reset_cycle();
    inst.state = JobState::Starting;
    info!(instance = %inst.id, "starting");
    vec![emit_progress(inst, ctx, names::STARTING)]
}

fn enter_pre_start(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    match ctx.class.pre_start.clone() {
        Some(command) => {
            inst.state = JobState::PreStart;
            vec![spawn_effect(inst, ctx, ProcessKind::PreStart, command)]
        }
        None => enter_spawned(inst, ctx),
    }
}

fn enter_spawned(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    match ctx.class.main.clone() {
        Some(command) => {
            inst.state = JobState::Spawned;
            vec![spawn_effect(inst, ctx, ProcessKind::Main, command)]
        }
        None if ctx.class.task => {
            // A task with no main has nothing left to do
            inst.goal = Goal::Stop;
            begin_stop_cycle(inst, ctx)
        }
        // A service with no main is a synthetic state holder
        None => enter_running(inst, ctx),
    }
}

fn enter_post_start(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    match ctx.class.post_start.clone() {
        Some(command) => {
            inst.state = JobState::PostStart;
            vec![spawn_effect(inst, ctx, ProcessKind::PostStart, command)]
        }
        None => enter_running(inst, ctx),
    }
}

fn enter_running(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    inst.state = JobState::Running;
    info!(instance = %inst.id, "running");
    vec![emit_progress(inst, ctx, names::STARTED)]
}

fn begin_stop_cycle(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    let use_pre_stop = inst.result == JobResult::Ok
        && ctx.class.pre_stop.is_some()
        && inst.pid_of(ProcessKind::Main).is_some();
    if use_pre_stop {
        inst.state = JobState::PreStop;
        // Checked above
        match ctx.class.pre_stop.clone() {
            Some(command) => vec![spawn_effect(inst, ctx, ProcessKind::PreStop, command)],
            None => enter_stopping(inst, ctx),
        }
    } else {
        enter_stopping(inst, ctx)
    }
}

fn enter_stopping(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    inst.state = JobState::Stopping;
    info!(instance = %inst.id, result = %inst.result, "stopping");
    vec![emit_result(inst, ctx, names::STOPPING)]
}

fn enter_killed(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    if let Some(main_pid) = inst.pid_of(ProcessKind::Main) {
        inst.state = JobState::Killed;
        let target = inst.main_pgid.unwrap_or(main_pid);
        vec![
            Effect::Signal {
                pid: target,
                signal: ctx.class.kill_signal,
                group: true,
            },
            Effect::SetTimer {
                id: TimerId::kill_timeout(&inst.id),
                duration: Duration::from_secs(u64::from(ctx.class.kill_timeout)),
            },
        ]
    } else if inst.daemonized {
        // No tracked pid; signal the remembered process group and move on
        let mut effects = Vec::new();
        if let Some(pgid) = inst.main_pgid {
            effects.push(Effect::Signal {
                pid: pgid,
                signal: ctx.class.kill_signal,
                group: true,
            });
        }
        effects.extend(enter_post_stop(inst, ctx));
        effects
    } else {
        enter_post_stop(inst, ctx)
    }
}

fn enter_post_stop(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    match ctx.class.post_stop.clone() {
        Some(command) => {
            inst.state = JobState::PostStop;
            vec![spawn_effect(inst, ctx, ProcessKind::PostStop, command)]
        }
        None => finish_stop(inst, ctx),
    }
}

fn finish_stop(inst: &mut JobInstance, ctx: &MachineCtx) -> Vec<Effect> {
    info!(instance = %inst.id, result = %inst.result, "stopped");
    let mut effects = vec![emit_result(inst, ctx, names::STOPPED)];
    if inst.goal == Goal::Start {
        // Respawn, or a start requested while the stop cycle ran
        effects.extend(begin_start_cycle(inst, ctx));
    } else {
        inst.state = JobState::Waiting;
        inst.main_pgid = None;
    }
    effects
}

// ---------------------------------------------------------------------------
// Main-process exit policy
// ---------------------------------------------------------------------------

fn main_exited(inst: &mut JobInstance, ctx: &MachineCtx, status: ExitStatus) -> Vec<Effect> {
    inst.exit_status = Some(status);

    if inst.goal == Goal::Stop {
        return enter_stopping(inst, ctx);
    }

    let normal = status.is_clean() || ctx.class.is_normal_exit(status);

    if ctx.class.respawn && !normal {
        let (limit, window) = ctx.class.respawn_limit;
        let count = inst.respawn.record(ctx.now_ms, window);
        if limit > 0 && count > limit {
            warn!(
                instance = %inst.id,
                count,
                limit,
                window,
                "respawn limit reached, giving up"
            );
            inst.result = JobResult::RespawnLimit;
            inst.goal = Goal::Stop;
        } else {
            info!(instance = %inst.id, %status, "main process died, respawning");
            inst.result = JobResult::Respawn;
            // Goal stays start: the stop cycle loops back into starting
        }
        return begin_stop_cycle(inst, ctx);
    }

    if !normal {
        inst.mark_failed(ProcessKind::Main, Some(status));
    }
    inst.goal = Goal::Stop;
    begin_stop_cycle(inst, ctx)
}

// ---------------------------------------------------------------------------
// Effect construction
// ---------------------------------------------------------------------------

fn spawn_effect(
    inst: &JobInstance,
    ctx: &MachineCtx,
    kind: ProcessKind,
    command: ember_core::CommandLine,
) -> Effect {
    Effect::Spawn {
        request: build_spawn_request(
            ctx.class,
            inst,
            kind,
            command,
            ctx.global_env,
            ctx.session,
            ctx.log_dir,
        ),
    }
}

/// `starting`/`started` event environment: identification plus exported
/// trigger variables.
fn emit_progress(inst: &JobInstance, ctx: &MachineCtx, name: &str) -> Effect {
    Effect::Emit {
        name: name.to_string(),
        env: progress_env(inst, ctx),
    }
}

/// `stopping`/`stopped` event environment: identification, result, and the
/// failing process details when applicable.
fn emit_result(inst: &JobInstance, ctx: &MachineCtx, name: &str) -> Effect {
    let mut env = progress_env(inst, ctx);
    env.push((keys::RESULT.to_string(), inst.result.to_string()));
    if inst.result != JobResult::Ok {
        if let Some(kind) = inst.failed_process {
            env.push((keys::PROCESS.to_string(), kind.to_string()));
        }
        match inst.exit_status {
            Some(ExitStatus::Code(code)) => {
                env.push((keys::EXIT_STATUS.to_string(), code.to_string()));
            }
            Some(ExitStatus::Signal(signal)) => {
                env.push((keys::EXIT_SIGNAL.to_string(), signal_name(signal).to_string()));
            }
            None => {}
        }
    }
    Effect::Emit {
        name: name.to_string(),
        env,
    }
}

fn progress_env(inst: &JobInstance, ctx: &MachineCtx) -> Vec<(String, String)> {
    let mut env = vec![
        (keys::JOB.to_string(), inst.id.class.clone()),
        (keys::INSTANCE.to_string(), inst.id.instance.clone()),
    ];
    for key in &ctx.class.export {
        if let Some((_, value)) = inst.env.iter().find(|(k, _)| k == key) {
            env.push((key.clone(), value.clone()));
        }
    }
    env
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
