// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SIGCHLD reaping.
//!
//! All child exits are collected here, in the main process, with
//! `waitpid(-1, WNOHANG | WUNTRACED)` driven by tokio's SIGCHLD stream. No
//! state is mutated in signal context: the drain runs on the event loop and
//! forwards typed events into the engine. `WUNTRACED` also surfaces the
//! SIGSTOP an `expect stop` job raises when it is ready.
//!
//! This also covers children inherited across re-exec: they are still our
//! children, so `waitpid` keeps reporting them without any handle
//! bookkeeping.

use ember_core::{Event, ExitStatus};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Drain every reapable child, converting each into a loop event.
pub fn drain() -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match waitpid(
            Pid::from_raw(-1),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        ) {
            Ok(WaitStatus::Exited(pid, code)) => {
                events.push(Event::ChildExited {
                    pid: pid.as_raw() as u32,
                    status: ExitStatus::Code(code),
                });
            }
            Ok(WaitStatus::Signaled(pid, signal, _core)) => {
                events.push(Event::ChildExited {
                    pid: pid.as_raw() as u32,
                    status: ExitStatus::Signal(signal as i32),
                });
            }
            Ok(WaitStatus::Stopped(pid, Signal::SIGSTOP)) => {
                events.push(Event::ChildStopped {
                    pid: pid.as_raw() as u32,
                });
            }
            Ok(WaitStatus::Stopped(pid, signal)) => {
                // Stopped by something other than the readiness contract;
                // not ours to manage.
                debug!(pid = pid.as_raw(), %signal, "child stopped, ignoring");
            }
            Ok(WaitStatus::StillAlive) => break,
            Ok(other) => {
                debug!(?other, "unhandled wait status");
            }
            Err(nix::errno::Errno::ECHILD) => break,
            Err(e) => {
                warn!(error = %e, "waitpid failed");
                break;
            }
        }
    }
    events
}

/// Run the reaper: on every SIGCHLD, drain and forward the exits.
///
/// Returns when the event channel closes (daemon shutdown).
pub async fn run(event_tx: mpsc::Sender<Event>) {
    let mut sigchld = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::child()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "cannot install SIGCHLD handler");
            return;
        }
    };

    while sigchld.recv().await.is_some() {
        for event in drain() {
            if event_tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
