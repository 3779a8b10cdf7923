// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket listener: accepts connections and dispatches requests.
//!
//! Queries read engine state directly under its mutex. Mutations travel as
//! events into the main loop; waiting operations register a reply channel
//! keyed by a [`WaiterId`], resolved when the engine produces the matching
//! completion effect.

use crate::lifecycle::DaemonEngine;
use crate::protocol::{wire, InstanceEntry, JobEntry, Request, Response};
use ember_catalog::JobClass;
use ember_core::{parse_env_pair, Event, JobInstance, WaiterId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, warn};

/// Reply channels for callers blocked on emissions or commands.
#[derive(Default)]
pub struct Waiters {
    next: AtomicU64,
    table: Mutex<HashMap<WaiterId, oneshot::Sender<Response>>>,
}

impl Waiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reply channel; returns the id the engine will echo back.
    pub fn register(&self, tx: oneshot::Sender<Response>) -> WaiterId {
        let id = WaiterId(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        self.table.lock().insert(id, tx);
        id
    }

    /// Resolve a waiter; unknown ids are stale (connection went away).
    pub fn resolve(&self, id: WaiterId, response: Response) {
        match self.table.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => debug!(waiter = %id, "completion for unknown waiter"),
        }
    }
}

/// Shared context for every connection task.
pub struct ListenCtx {
    pub engine: Arc<Mutex<DaemonEngine>>,
    pub event_tx: mpsc::Sender<Event>,
    pub waiters: Arc<Waiters>,
    /// Graceful shutdown request from `EndSession`
    pub shutdown: Arc<Notify>,
    /// Re-exec request from `RestartSupervisor`
    pub reexec: Arc<Notify>,
    pub log_control: Arc<crate::log_control::LogControl>,
}

/// Accept loop: one task per connection.
pub async fn run(listener: UnixListener, ctx: Arc<ListenCtx>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, ctx).await {
                        match e {
                            wire::ProtocolError::ConnectionClosed => {}
                            other => debug!(error = %other, "connection ended"),
                        }
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                return;
            }
        }
    }
}

/// Serve one connection until it closes.
async fn serve_connection(
    mut stream: UnixStream,
    ctx: Arc<ListenCtx>,
) -> Result<(), wire::ProtocolError> {
    loop {
        let bytes = wire::read_message(&mut stream).await?;
        let request: Request = wire::decode(&bytes)?;
        debug!(?request, "request");
        let response = handle_request(&ctx, request).await;
        let data = wire::encode(&response)?;
        wire::write_message(&mut stream, &data).await?;
    }
}

/// Dispatch one request to a response.
pub async fn handle_request(ctx: &ListenCtx, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::GetVersion => Response::Version {
            version: format!("ember {}", env!("CARGO_PKG_VERSION")),
        },

        Request::EmitEvent { name, env, wait } => {
            let env = match parse_pairs(&env) {
                Ok(env) => env,
                Err(message) => return Response::error(message),
            };
            if name.is_empty() {
                return Response::error("missing event name");
            }
            if wait {
                let (reply_tx, reply_rx) = oneshot::channel();
                let waiter = ctx.waiters.register(reply_tx);
                let event = Event::Emit {
                    name,
                    env,
                    wait: true,
                    waiter: Some(waiter),
                };
                if ctx.event_tx.send(event).await.is_err() {
                    return Response::error("supervisor is shutting down");
                }
                await_reply(reply_rx).await
            } else {
                let event = Event::Emit {
                    name,
                    env,
                    wait: false,
                    waiter: None,
                };
                if ctx.event_tx.send(event).await.is_err() {
                    return Response::error("supervisor is shutting down");
                }
                Response::Ok
            }
        }

        Request::ReloadConfiguration => {
            let report = ctx.engine.lock().reload();
            Response::Reloaded {
                errors: report
                    .errors
                    .iter()
                    .map(|(path, error)| format!("{}: {}", path.display(), error))
                    .collect(),
            }
        }

        Request::GetAllJobs => {
            let engine = ctx.engine.lock();
            let jobs = engine
                .catalog()
                .classes()
                .iter()
                .map(|class| job_entry(&engine, class))
                .collect();
            Response::Jobs { jobs }
        }

        Request::GetJobByName { name } => {
            let engine = ctx.engine.lock();
            match engine.get_class(&name) {
                Ok(class) => Response::Job {
                    job: job_entry(&engine, &class),
                },
                Err(e) => Response::error(e.to_string()),
            }
        }

        Request::GetAllInstances { name } => {
            let engine = ctx.engine.lock();
            if engine.catalog().lookup_any(&name).is_none() {
                return Response::error(format!("unknown job: {name}"));
            }
            Response::Instances {
                instances: engine
                    .instances()
                    .of_class(&name)
                    .into_iter()
                    .map(instance_entry)
                    .collect(),
            }
        }

        Request::GetInstanceByName { name, instance } => {
            let engine = ctx.engine.lock();
            match engine.find_instance(&name, &instance) {
                Ok(inst) => Response::Instance {
                    instance: instance_entry(inst),
                },
                Err(e) => Response::error(e.to_string()),
            }
        }

        Request::GetInstance { name, env } => {
            let env = match parse_pairs(&env) {
                Ok(env) => env,
                Err(message) => return Response::error(message),
            };
            let engine = ctx.engine.lock();
            match engine.find_instance_by_env(&name, &env) {
                Ok(inst) => Response::Instance {
                    instance: instance_entry(inst),
                },
                Err(e) => Response::error(e.to_string()),
            }
        }

        Request::Start { name, env, wait } => {
            let env = match parse_pairs(&env) {
                Ok(env) => env,
                Err(message) => return Response::error(message),
            };
            command(ctx, wait, |waiter| Event::StartJob {
                class: name,
                env,
                waiter,
            })
            .await
        }

        Request::Stop {
            name,
            instance,
            wait,
        } => {
            command(ctx, wait, |waiter| Event::StopJob {
                class: name,
                instance,
                waiter,
            })
            .await
        }

        Request::Restart {
            name,
            instance,
            wait,
        } => {
            command(ctx, wait, |waiter| Event::RestartJob {
                class: name,
                instance,
                env: Vec::new(),
                waiter,
            })
            .await
        }

        Request::GetEnv { key } => {
            let engine = ctx.engine.lock();
            Response::EnvValue {
                value: engine.global_env().get(&key).map(String::from),
            }
        }

        Request::SetEnv { pair, replace } => {
            let (key, value) = match parse_env_pair(&pair) {
                Ok(parsed) => parsed,
                Err(e) => return Response::error(e.to_string()),
            };
            let mut engine = ctx.engine.lock();
            match engine.global_env_mut().set(&key, &value, replace) {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e.to_string()),
            }
        }

        Request::UnsetEnv { key } => {
            let mut engine = ctx.engine.lock();
            match engine.global_env_mut().unset(&key) {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e.to_string()),
            }
        }

        Request::ListEnv => {
            let engine = ctx.engine.lock();
            Response::EnvList {
                entries: engine.global_env().list(),
            }
        }

        Request::ResetEnv => {
            ctx.engine.lock().global_env_mut().reset();
            Response::Ok
        }

        Request::NotifyDiskWriteable => {
            // Console logs are written straight through append-only fds, so
            // there is nothing buffered to flush; acknowledge for protocol
            // compatibility.
            tracing::info!("log storage reported writable");
            Response::Ok
        }

        Request::EndSession => {
            ctx.shutdown.notify_one();
            Response::Ok
        }

        Request::RestartSupervisor => {
            ctx.reexec.notify_one();
            Response::Ok
        }

        Request::GetLogPriority => Response::LogPriority {
            priority: ctx.log_control.get(),
        },

        Request::SetLogPriority { priority } => match ctx.log_control.set(&priority) {
            Ok(()) => Response::Ok,
            Err(message) => Response::error(message),
        },
    }
}

/// Send an operator command, optionally waiting for settle.
async fn command<F>(ctx: &ListenCtx, wait: bool, build: F) -> Response
where
    F: FnOnce(Option<WaiterId>) -> Event,
{
    if wait {
        let (reply_tx, reply_rx) = oneshot::channel();
        let waiter = ctx.waiters.register(reply_tx);
        if ctx.event_tx.send(build(Some(waiter))).await.is_err() {
            return Response::error("supervisor is shutting down");
        }
        await_reply(reply_rx).await
    } else {
        if ctx.event_tx.send(build(None)).await.is_err() {
            return Response::error("supervisor is shutting down");
        }
        Response::Ok
    }
}

async fn await_reply(reply_rx: oneshot::Receiver<Response>) -> Response {
    match reply_rx.await {
        Ok(response) => response,
        Err(_) => Response::error("supervisor restarted while waiting"),
    }
}

fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>, String> {
    pairs
        .iter()
        .map(|pair| parse_env_pair(pair).map_err(|e| e.to_string()))
        .collect()
}

fn instance_entry(inst: &JobInstance) -> InstanceEntry {
    InstanceEntry {
        name: inst.id.class.clone(),
        instance: inst.id.instance.clone(),
        goal: inst.goal,
        state: inst.state,
        processes: inst
            .pids
            .iter()
            .map(|(kind, pid)| (kind.to_string(), *pid))
            .collect(),
    }
}

fn job_entry(engine: &DaemonEngine, class: &JobClass) -> JobEntry {
    JobEntry {
        name: class.name.clone(),
        description: class.description.clone(),
        usage: class.usage.clone(),
        task: class.task,
        instances: engine
            .instances()
            .of_class(&class.name)
            .into_iter()
            .map(instance_entry)
            .collect(),
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
