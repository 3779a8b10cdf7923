// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, shutdown, and controlled re-execution.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use ember_catalog::Catalog;
use ember_core::{Effect, JobEnvironment, SystemClock};
use ember_engine::{Engine, EngineState, Executor, NativeProcessAdapter, Scheduler, SessionInfo};
use ember_storage::RuntimeImage;
use fs2::FileExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Daemon engine with concrete adapter types.
pub type DaemonEngine = Engine<SystemClock>;

/// Daemon executor with concrete adapter types.
pub type DaemonExecutor = Executor<NativeProcessAdapter, SystemClock>;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Runtime directory (socket, lock, image, session files)
    pub runtime_dir: PathBuf,
    /// Path to the control socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to the re-exec runtime image
    pub image_path: PathBuf,
    /// Per-session run-files for client discovery
    pub sessions_dir: PathBuf,
    /// Path to the daemon's own log file
    pub log_path: PathBuf,
    /// Directory for per-job console log files
    pub job_log_dir: PathBuf,
    /// Configuration roots in ascending priority order
    pub conf_dirs: Vec<PathBuf>,
    /// Seed the default job environment from our own environment
    pub inherit_env: bool,
}

impl Config {
    /// Assemble paths from the environment (XDG-aware, root-aware).
    pub fn load(conf_dirs: Vec<PathBuf>, inherit_env: bool) -> Self {
        let runtime_dir = crate::env::runtime_dir();
        let state_dir = crate::env::state_dir();
        let conf_dirs = if conf_dirs.is_empty() {
            crate::env::conf_dirs()
        } else {
            conf_dirs
        };

        Self {
            socket_path: runtime_dir.join("emberd.sock"),
            lock_path: runtime_dir.join("emberd.pid"),
            image_path: runtime_dir.join("emberd.image"),
            sessions_dir: runtime_dir.join("sessions"),
            log_path: state_dir.join("emberd.log"),
            job_log_dir: state_dir.join("logs"),
            runtime_dir,
            conf_dirs,
            inherit_env,
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: supervisor already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] ember_storage::SnapshotError),

    #[error("Corrupt runtime image: {0}")]
    BadImage(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Live daemon state after startup.
pub struct DaemonState {
    pub config: Config,
    pub engine: Arc<Mutex<DaemonEngine>>,
    pub executor: DaemonExecutor,
    /// True when this process resumed from a re-exec image.
    pub restored: bool,
    /// Effects the restore produced (re-armed timers); run them first.
    pub initial_effects: Vec<Effect>,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

/// Start the daemon.
///
/// With `restore` set, runtime state is rehydrated from the re-exec image
/// at that path instead of starting cold.
pub fn startup(
    config: &Config,
    restore: Option<PathBuf>,
) -> Result<(DaemonState, UnixListener), LifecycleError> {
    std::fs::create_dir_all(&config.runtime_dir)?;
    std::fs::create_dir_all(&config.sessions_dir)?;
    std::fs::create_dir_all(&config.job_log_dir)?;

    // Lock first: everything after this is ours to clean up. Opened
    // without truncation so a losing race does not wipe the winner's pid.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // Load the configuration catalog; invalid files are reported, never fatal
    let mut catalog = Catalog::new(config.conf_dirs.clone());
    let report = catalog.load_all();
    info!(
        classes = report.added.len(),
        errors = report.errors.len(),
        "configuration loaded"
    );
    for (path, error) in &report.errors {
        warn!(path = %path.display(), error, "configuration file skipped");
    }

    let global_env = JobEnvironment::with_defaults(config.inherit_env);
    let session = SessionInfo::new(uuid::Uuid::new_v4().to_string());
    let mut engine = Engine::new(
        catalog,
        SystemClock,
        config.job_log_dir.clone(),
        global_env,
        session,
    );

    // Rehydrate from the re-exec image when asked
    let mut restored = false;
    let mut initial_effects = Vec::new();
    if let Some(image_path) = restore {
        match RuntimeImage::take(&image_path)? {
            Some(image) => {
                for (class, hash) in engine.catalog().hashes() {
                    if image.class_hashes.get(&class) != Some(&hash) {
                        warn!(class, "definition changed across re-exec");
                    }
                }
                let state: EngineState = serde_json::from_value(image.engine)?;
                initial_effects = engine.restore_state(state);
                engine.session_mut().generation += 1;
                restored = true;
            }
            None => {
                warn!(path = %image_path.display(), "no runtime image to restore, starting cold");
            }
        }
    }

    // Bind the control socket last, once startup can no longer fail
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    write_session_file(config)?;

    let executor = Executor::new(
        NativeProcessAdapter::new(),
        Arc::new(Mutex::new(Scheduler::new())),
        SystemClock,
    );

    info!(
        socket = %config.socket_path.display(),
        restored,
        "supervisor started"
    );

    Ok((
        DaemonState {
            config: config.clone(),
            engine: Arc::new(Mutex::new(engine)),
            executor,
            restored,
            initial_effects,
            lock_file,
        },
        listener,
    ))
}

impl DaemonState {
    /// Remove the run files. The lock releases when the state drops.
    pub fn shutdown(&mut self) {
        info!("supervisor shutting down");
        let session_file = self
            .config
            .sessions_dir
            .join(format!("{}.session", std::process::id()));
        for path in [
            &self.config.socket_path,
            &self.config.lock_path,
            &session_file,
        ] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "cleanup failed");
                }
            }
        }
    }

    /// Serialize runtime state and replace the supervisor binary in place.
    ///
    /// On success this never returns: the process image is replaced and the
    /// replacement resumes from the written image. On failure the image file
    /// is removed and the error returned, leaving supervision undisturbed.
    pub fn reexec(&mut self) -> LifecycleError {
        let image = {
            let engine = self.engine.lock();
            RuntimeImage::new(
                engine.catalog().roots().to_vec(),
                engine.catalog().hashes(),
                match serde_json::to_value(engine.export_state()) {
                    Ok(value) => value,
                    Err(e) => return LifecycleError::BadImage(e),
                },
            )
        };
        if let Err(e) = image.save(&self.config.image_path) {
            return LifecycleError::Snapshot(e);
        }

        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                let _ = std::fs::remove_file(&self.config.image_path);
                return LifecycleError::Io(e);
            }
        };

        info!(exe = %exe.display(), "re-executing supervisor");
        // The lock file descriptor survives exec; the replacement inherits
        // the lock along with the children.
        let error = std::os::unix::process::CommandExt::exec(
            std::process::Command::new(exe)
                .arg("--restore")
                .arg(&self.config.image_path),
        );

        // exec only returns on failure
        let _ = std::fs::remove_file(&self.config.image_path);
        LifecycleError::Io(error)
    }
}

/// Write the discovery run-file: one line holding the socket path.
fn write_session_file(config: &Config) -> Result<(), LifecycleError> {
    let path = config.sessions_dir.join(format!("{}.session", std::process::id()));
    let mut file = File::create(&path)?;
    writeln!(file, "{}", config.socket_path.display())?;
    Ok(())
}

/// Remove run-files whose supervisor is gone.
pub fn prune_dead_sessions(sessions_dir: &std::path::Path) -> Vec<(u32, PathBuf)> {
    let mut live = Vec::new();
    let Ok(entries) = std::fs::read_dir(sessions_dir) else {
        return live;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(pid) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".session"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok();
        if alive {
            live.push((pid, path));
        } else {
            let _ = std::fs::remove_file(&path);
        }
    }
    live.sort();
    live
}

/// Maximum daemon log size before startup rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log at startup if it has grown too large.
///
/// Best-effort: rotation failures never block startup.
pub fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let _ = std::fs::rename(format!("{log_str}.{i}"), format!("{log_str}.{}", i + 1));
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
