// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervision adapters.
//!
//! [`NativeProcessAdapter`] forks real children with the full attribute set
//! (process group, credentials, umask/chroot/nice/oom/rlimits, console
//! routing). [`FakeProcessAdapter`] records spawn requests and hands out
//! deterministic pids for state-machine tests.
//!
//! Children are deliberately spawned through `std::process` and never
//! awaited here: the daemon's SIGCHLD reaper owns `waitpid`, which also
//! covers children inherited across re-exec.

use async_trait::async_trait;
use ember_core::{CommandLine, SpawnRequest};
use thiserror::Error;

/// Errors from process operations
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("fork/exec failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("unknown resource limit: {0}")]
    UnknownResource(String),

    #[error("cannot open console log {path}: {source}")]
    ConsoleLog {
        path: String,
        source: std::io::Error,
    },

    #[error("signal delivery failed: {0}")]
    Signal(String),
}

/// Adapter for forking and signalling supervised processes.
#[async_trait]
pub trait ProcessAdapter: Clone + Send + Sync + 'static {
    /// Fork one child; returns its pid.
    async fn spawn(&self, request: &SpawnRequest) -> Result<u32, SpawnError>;

    /// Deliver a signal to a pid, or to its whole process group.
    fn signal(&self, pid: u32, signal: i32, group: bool) -> Result<(), SpawnError>;
}

/// Shell metacharacters that force an `exec` line through `sh -c`.
const SHELL_METACHARS: &[char] = &[
    '~', '`', '!', '$', '^', '&', '*', '(', ')', '=', '|', '\\', '{', '}', '[', ']', ';', '"',
    '\'', '<', '>', '?', '#',
];

/// Split an `exec` line into argv, or defer to the shell.
///
/// Returns `(program, args)`.
pub(crate) fn command_argv(command: &CommandLine) -> (String, Vec<String>) {
    match command {
        CommandLine::Script(body) => (
            "/bin/sh".to_string(),
            vec!["-e".to_string(), "-c".to_string(), body.clone()],
        ),
        CommandLine::Exec(line) => {
            if line.contains(SHELL_METACHARS) {
                (
                    "/bin/sh".to_string(),
                    vec!["-c".to_string(), line.clone()],
                )
            } else {
                let mut words = line.split_whitespace().map(String::from);
                let program = words.next().unwrap_or_default();
                (program, words.collect())
            }
        }
    }
}

pub use native::NativeProcessAdapter;

mod native {
    use super::{command_argv, ProcessAdapter, SpawnError};
    use async_trait::async_trait;
    use ember_core::{ConsoleMode, SpawnRequest};
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use std::fs::OpenOptions;
    use std::process::{Command, Stdio};

    /// The real thing: `fork`/`exec` with attribute setup.
    #[derive(Clone, Default)]
    pub struct NativeProcessAdapter;

    impl NativeProcessAdapter {
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl ProcessAdapter for NativeProcessAdapter {
        async fn spawn(&self, request: &SpawnRequest) -> Result<u32, SpawnError> {
            let (program, args) = command_argv(&request.command);
            let mut cmd = Command::new(program);
            cmd.args(args);

            cmd.env_clear();
            for (key, value) in &request.env {
                cmd.env(key, value);
            }

            // Each child leads its own process group so the kill discipline
            // can signal the whole tree.
            std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

            configure_stdio(&mut cmd, request)?;
            configure_credentials(&mut cmd, request)?;
            configure_attributes(&mut cmd, request)?;

            if request.chroot.is_none() {
                if let Some(dir) = &request.chdir {
                    cmd.current_dir(dir);
                }
            }

            let child = cmd.spawn()?;
            Ok(child.id())
        }

        fn signal(&self, pid: u32, signal: i32, group: bool) -> Result<(), SpawnError> {
            let signal =
                Signal::try_from(signal).map_err(|e| SpawnError::Signal(e.to_string()))?;
            let pid = Pid::from_raw(pid as i32);
            let result = if group {
                killpg(pid, signal)
            } else {
                kill(pid, signal)
            };
            match result {
                Ok(()) => Ok(()),
                // Already gone: the reaper will deliver the exit
                Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(e) => Err(SpawnError::Signal(e.to_string())),
            }
        }
    }

    /// Wire the child's stdio per the console mode.
    fn configure_stdio(cmd: &mut Command, request: &SpawnRequest) -> Result<(), SpawnError> {
        cmd.stdin(Stdio::null());
        match request.console {
            ConsoleMode::None => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
            // Owner keeps the controlling terminal; output shares ours.
            // Both inherit the supervisor's descriptors.
            ConsoleMode::Owner | ConsoleMode::Output => {}
            ConsoleMode::Log => {
                let Some(path) = &request.log_path else {
                    cmd.stdout(Stdio::null());
                    cmd.stderr(Stdio::null());
                    return Ok(());
                };
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|source| SpawnError::ConsoleLog {
                        path: path.display().to_string(),
                        source,
                    })?;
                }
                // Append-only; the kernel writes bytes verbatim, so the
                // child's CRLF discipline survives into the log.
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| SpawnError::ConsoleLog {
                        path: path.display().to_string(),
                        source,
                    })?;
                let err = file.try_clone().map_err(|source| SpawnError::ConsoleLog {
                    path: path.display().to_string(),
                    source,
                })?;
                cmd.stdout(Stdio::from(file));
                cmd.stderr(Stdio::from(err));
            }
        }
        Ok(())
    }

    /// Resolve setuid/setgid names and apply them via the safe CommandExt
    /// hooks.
    fn configure_credentials(cmd: &mut Command, request: &SpawnRequest) -> Result<(), SpawnError> {
        use std::os::unix::process::CommandExt;

        if let Some(group) = &request.setgid {
            let resolved = nix::unistd::Group::from_name(group)
                .map_err(|e| SpawnError::Signal(e.to_string()))?
                .ok_or_else(|| SpawnError::UnknownGroup(group.clone()))?;
            cmd.gid(resolved.gid.as_raw());
        }
        if let Some(user) = &request.setuid {
            let resolved = nix::unistd::User::from_name(user)
                .map_err(|e| SpawnError::Signal(e.to_string()))?
                .ok_or_else(|| SpawnError::UnknownUser(user.clone()))?;
            cmd.uid(resolved.uid.as_raw());
            if request.setgid.is_none() {
                cmd.gid(resolved.gid.as_raw());
            }
        }
        Ok(())
    }

    /// umask, chroot, nice, oom score, and rlimits all have to happen in
    /// the child between fork and exec, which is what `pre_exec` is for.
    #[allow(unsafe_code)]
    fn configure_attributes(cmd: &mut Command, request: &SpawnRequest) -> Result<(), SpawnError> {
        use std::os::unix::process::CommandExt;

        let umask = request.umask;
        let chroot = request.chroot.clone();
        let chdir_in_root = request.chdir.clone();
        let nice = request.nice;
        let oom_score = request.oom_score;
        let limits: Vec<(nix::sys::resource::Resource, u64, u64)> = request
            .limits
            .iter()
            .map(|limit| {
                resource_by_name(&limit.resource)
                    .map(|resource| (resource, limit.soft, limit.hard))
                    .ok_or_else(|| SpawnError::UnknownResource(limit.resource.clone()))
            })
            .collect::<Result<_, _>>()?;

        if umask.is_none()
            && chroot.is_none()
            && nice.is_none()
            && oom_score.is_none()
            && limits.is_empty()
        {
            return Ok(());
        }

        // SAFETY: the closure runs in the forked child before exec and only
        // performs async-signal-safe syscalls (umask/chroot/chdir/
        // setpriority/setrlimit) plus one short write to procfs.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(mask) = umask {
                    nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(mask));
                }
                for (resource, soft, hard) in &limits {
                    nix::sys::resource::setrlimit(*resource, *soft, *hard)
                        .map_err(std::io::Error::from)?;
                }
                if let Some(value) = oom_score {
                    std::fs::write("/proc/self/oom_score_adj", value.to_string())?;
                }
                if let Some(increment) = nice {
                    // nice(2) legitimately returns -1; errno disambiguates
                    nix::errno::Errno::clear();
                    if nix::libc::nice(increment) == -1 {
                        let err = std::io::Error::last_os_error();
                        if err.raw_os_error().unwrap_or(0) != 0 {
                            return Err(err);
                        }
                    }
                }
                if let Some(root) = &chroot {
                    nix::unistd::chroot(root.as_path()).map_err(std::io::Error::from)?;
                    let target = chdir_in_root.as_deref().unwrap_or(std::path::Path::new("/"));
                    nix::unistd::chdir(target).map_err(std::io::Error::from)?;
                }
                Ok(())
            });
        }
        Ok(())
    }

    /// Resource limit names as written in `limit` stanzas.
    fn resource_by_name(name: &str) -> Option<nix::sys::resource::Resource> {
        use nix::sys::resource::Resource;
        let resource = match name {
            "as" => Resource::RLIMIT_AS,
            "core" => Resource::RLIMIT_CORE,
            "cpu" => Resource::RLIMIT_CPU,
            "data" => Resource::RLIMIT_DATA,
            "fsize" => Resource::RLIMIT_FSIZE,
            "memlock" => Resource::RLIMIT_MEMLOCK,
            "nofile" => Resource::RLIMIT_NOFILE,
            "nproc" => Resource::RLIMIT_NPROC,
            "rss" => Resource::RLIMIT_RSS,
            "stack" => Resource::RLIMIT_STACK,
            _ => return None,
        };
        Some(resource)
    }
}

// ---------------------------------------------------------------------------
// Fake adapter for tests
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessAdapter, SpawnCall};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{ProcessAdapter, SpawnError};
    use async_trait::async_trait;
    use ember_core::SpawnRequest;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded adapter call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SpawnCall {
        Spawn { request: Box<SpawnRequest>, pid: u32 },
        Signal { pid: u32, signal: i32, group: bool },
    }

    /// Fake process adapter: deterministic pids, recorded calls, optional
    /// scripted spawn failures.
    #[derive(Clone, Default)]
    pub struct FakeProcessAdapter {
        state: Arc<Mutex<FakeState>>,
    }

    #[derive(Default)]
    struct FakeState {
        next_pid: u32,
        calls: Vec<SpawnCall>,
        fail_next: bool,
    }

    impl FakeProcessAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next spawn fail with an IO error.
        pub fn fail_next_spawn(&self) {
            self.state.lock().fail_next = true;
        }

        pub fn calls(&self) -> Vec<SpawnCall> {
            self.state.lock().calls.clone()
        }

        /// Signals delivered so far, as `(pid, signal, group)`.
        pub fn signals(&self) -> Vec<(u32, i32, bool)> {
            self.state
                .lock()
                .calls
                .iter()
                .filter_map(|call| match call {
                    SpawnCall::Signal { pid, signal, group } => Some((*pid, *signal, *group)),
                    _ => None,
                })
                .collect()
        }

        /// Pid handed out by the most recent spawn.
        pub fn last_pid(&self) -> u32 {
            self.state.lock().next_pid + 10_000
        }
    }

    #[async_trait]
    impl ProcessAdapter for FakeProcessAdapter {
        async fn spawn(&self, request: &SpawnRequest) -> Result<u32, SpawnError> {
            let mut state = self.state.lock();
            if state.fail_next {
                state.fail_next = false;
                return Err(SpawnError::Io(std::io::Error::other("scripted failure")));
            }
            state.next_pid += 1;
            let pid = state.next_pid + 10_000;
            state.calls.push(SpawnCall::Spawn {
                request: Box::new(request.clone()),
                pid,
            });
            Ok(pid)
        }

        fn signal(&self, pid: u32, signal: i32, group: bool) -> Result<(), SpawnError> {
            self.state
                .lock()
                .calls
                .push(SpawnCall::Signal { pid, signal, group });
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
