// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! emberd — the Ember service supervisor.
//!
//! Architecture:
//! - Listener task: socket I/O, turns requests into loop events
//! - Reaper task: SIGCHLD → child-exit events
//! - Main loop: processes events sequentially through the engine and
//!   executes the resulting effects

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ember_core::Event;
use ember_daemon::lifecycle::{self, Config, DaemonState, LifecycleError};
use ember_daemon::log_control::LogControl;
use ember_daemon::protocol::Response;
use ember_daemon::{listener, reaper};
use ember_engine::QUIESCE_INTERVAL;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info};

/// How often fired timers are collected (1-second resolution).
const TIMER_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Hard deadline after the quiesce escalation before the supervisor exits
/// even if an unkillable child lingers.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

struct Args {
    restore: Option<PathBuf>,
    conf_dirs: Vec<PathBuf>,
    inherit_env: bool,
}

fn usage() {
    println!("emberd {}", env!("CARGO_PKG_VERSION"));
    println!("Ember service supervisor - drives jobs through their state machines");
    println!();
    println!("USAGE:");
    println!("    emberd [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --confdir <DIR>      Configuration root (repeatable, ascending priority)");
    println!("    --no-inherit-env     Seed the job environment from built-in defaults only");
    println!("    --restore <PATH>     Resume from a re-exec runtime image (internal)");
    println!("    -h, --help           Print help information");
    println!("    -V, --version        Print version information");
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        restore: None,
        conf_dirs: Vec::new(),
        inherit_env: true,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("emberd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--restore" => {
                let path = iter.next().ok_or("--restore requires a path")?;
                args.restore = Some(PathBuf::from(path));
            }
            "--confdir" => {
                let dir = iter.next().ok_or("--confdir requires a directory")?;
                args.conf_dirs.push(PathBuf::from(dir));
            }
            "--no-inherit-env" => {
                args.inherit_env = false;
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("Usage: emberd [--confdir DIR]... [--no-inherit-env]");
            std::process::exit(1);
        }
    };

    let config = Config::load(args.conf_dirs, args.inherit_env);
    lifecycle::rotate_log_if_needed(&config.log_path);
    let (_log_guard, log_control) = setup_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting supervisor");

    let (mut daemon, unix_listener) = match lifecycle::startup(&config, args.restore) {
        Ok(result) => result,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path).unwrap_or_default();
            eprintln!("emberd is already running");
            if !pid.trim().is_empty() {
                eprintln!("  pid: {}", pid.trim());
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start supervisor: {}", e);
            return Err(e.into());
        }
    };

    // Event channel feeding the main loop (listener commands, reaped exits)
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(256);
    let waiters = Arc::new(listener::Waiters::new());
    let shutdown_notify = Arc::new(Notify::new());
    let reexec_notify = Arc::new(Notify::new());

    let ctx = Arc::new(listener::ListenCtx {
        engine: Arc::clone(&daemon.engine),
        event_tx: event_tx.clone(),
        waiters: Arc::clone(&waiters),
        shutdown: Arc::clone(&shutdown_notify),
        reexec: Arc::clone(&reexec_notify),
        log_control: Arc::clone(&log_control),
    });
    tokio::spawn(listener::run(unix_listener, Arc::clone(&ctx)));
    tokio::spawn(reaper::run(event_tx.clone()));

    // Timers already armed before re-exec come back from the restored state
    let initial_effects = std::mem::take(&mut daemon.initial_effects);
    perform_effects(&mut daemon, &waiters, initial_effects).await;

    if daemon.restored {
        info!("resumed supervision after re-exec");
    } else {
        // Catalogs sequence their boot jobs from this
        process_event(
            &mut daemon,
            &waiters,
            Event::Emit {
                name: ember_core::event::names::STARTUP.to_string(),
                env: vec![],
                wait: false,
                waiter: None,
            },
        )
        .await;
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;

    // NOTE: created outside the loop — select! re-evaluates branches each
    // iteration, and a fresh sleep would reset on every event.
    let mut timer_check = tokio::time::interval(TIMER_CHECK_INTERVAL);

    // Armed only once shutdown begins; parked far in the future until then
    let far_future = Duration::from_secs(60 * 60 * 24 * 365);
    let mut shutdown_deadline = Box::pin(tokio::time::sleep(far_future));
    let arm_deadline = |sleep: &mut std::pin::Pin<Box<tokio::time::Sleep>>| {
        sleep
            .as_mut()
            .reset(tokio::time::Instant::now() + QUIESCE_INTERVAL + SHUTDOWN_DEADLINE);
    };

    info!(
        socket = %config.socket_path.display(),
        "supervisor ready"
    );

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(event) => process_event(&mut daemon, &waiters, event).await,
                    None => break,
                }
            }

            _ = shutdown_notify.notified() => {
                info!("shutdown requested over the control socket");
                process_event(&mut daemon, &waiters, Event::Shutdown).await;
                arm_deadline(&mut shutdown_deadline);
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                process_event(&mut daemon, &waiters, Event::Shutdown).await;
                arm_deadline(&mut shutdown_deadline);
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                process_event(&mut daemon, &waiters, Event::Shutdown).await;
                arm_deadline(&mut shutdown_deadline);
            }

            _ = sighup.recv() => {
                info!("received SIGHUP, reloading configuration");
                process_event(&mut daemon, &waiters, Event::ReloadConfiguration).await;
            }

            _ = sigusr1.recv() => {
                // Classic bridge-reconnect signal; nothing to reconnect
                // here, but acknowledge it in the log.
                info!("received SIGUSR1");
            }

            _ = reexec_notify.notified() => {
                // Only returns on failure; supervision continues
                let error = daemon.reexec();
                error!("re-exec failed: {}", error);
            }

            _ = timer_check.tick() => {
                let now = ember_core::Clock::now(daemon.executor.clock());
                let fired = {
                    let scheduler = daemon.executor.scheduler();
                    let mut guard = scheduler.lock();
                    guard.fired_timers(now)
                };
                for event in fired {
                    process_event(&mut daemon, &waiters, event).await;
                }
            }

            _ = shutdown_deadline.as_mut() => {
                error!("shutdown deadline lapsed with children remaining, exiting anyway");
                break;
            }
        }

        if daemon.engine.lock().shutdown_complete() {
            break;
        }
    }

    daemon.shutdown();
    info!("supervisor stopped");
    Ok(())
}

/// Run one event through the engine, then execute every effect it and its
/// feedback events produce.
async fn process_event(daemon: &mut DaemonState, waiters: &listener::Waiters, event: Event) {
    let mut pending = VecDeque::from([event]);
    while let Some(event) = pending.pop_front() {
        let effects = daemon.engine.lock().handle_event(event);
        let feedback = perform_effects_inner(daemon, waiters, effects).await;
        pending.extend(feedback);
    }
}

/// Execute effects, resolving completions and collecting feedback events.
async fn perform_effects(
    daemon: &mut DaemonState,
    waiters: &listener::Waiters,
    effects: Vec<ember_core::Effect>,
) {
    let feedback = perform_effects_inner(daemon, waiters, effects).await;
    for event in feedback {
        process_event(daemon, waiters, event).await;
    }
}

async fn perform_effects_inner(
    daemon: &mut DaemonState,
    waiters: &listener::Waiters,
    effects: Vec<ember_core::Effect>,
) -> Vec<Event> {
    let mut feedback = Vec::new();
    for effect in effects {
        match effect {
            ember_core::Effect::CompleteEmission { waiter, outcome, .. } => {
                waiters.resolve(
                    waiter,
                    Response::EventDone {
                        failed: outcome == ember_core::EmissionOutcome::Failed,
                    },
                );
            }
            ember_core::Effect::CompleteCommand { waiter, outcome } => {
                let response = match outcome {
                    ember_core::CommandOutcome::Ok => Response::Ok,
                    ember_core::CommandOutcome::Failed(message) => Response::Error { message },
                };
                waiters.resolve(waiter, response);
            }
            other => {
                if let Some(event) = daemon.executor.execute(other).await {
                    feedback.push(event);
                }
            }
        }
    }
    feedback
}

fn setup_logging(
    config: &Config,
) -> Result<(tracing_appender::non_blocking::WorkerGuard, Arc<LogControl>), LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().unwrap_or(&config.runtime_dir),
        config
            .log_path
            .file_name()
            .unwrap_or(std::ffi::OsStr::new("emberd.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, reload_handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok((guard, Arc::new(LogControl::new(reload_handle, "info"))))
}
