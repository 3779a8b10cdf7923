// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path discovery for the supervisor and its clients.
//!
//! The runtime directory holds the control socket, the lock file, the
//! re-exec image, and the per-session run-files clients use for discovery.

use std::path::PathBuf;

/// Runtime directory: `$XDG_RUNTIME_DIR/ember`, falling back to a uid-keyed
/// directory under /tmp when no runtime dir is available.
pub fn runtime_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("EMBER_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::runtime_dir() {
        Some(dir) => dir.join("ember"),
        None => {
            let uid = nix::unistd::Uid::current();
            PathBuf::from(format!("/tmp/ember-{}", uid))
        }
    }
}

/// State directory for logs: `$XDG_STATE_HOME/ember` (usually
/// `~/.local/state/ember`), or `/var/log/ember` for root.
pub fn state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("EMBER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if nix::unistd::Uid::current().is_root() {
        return PathBuf::from("/var/log/ember");
    }
    dirs::state_dir()
        .map(|dir| dir.join("ember"))
        .unwrap_or_else(|| runtime_dir().join("state"))
}

/// Configuration roots in ascending priority order.
///
/// `$EMBER_CONF_DIR` overrides everything; otherwise the system supervisor
/// reads `/etc/ember`, a session supervisor `~/.config/ember`.
pub fn conf_dirs() -> Vec<PathBuf> {
    if let Some(dir) = std::env::var_os("EMBER_CONF_DIR") {
        return vec![PathBuf::from(dir)];
    }
    if nix::unistd::Uid::current().is_root() {
        return vec![PathBuf::from("/etc/ember")];
    }
    let mut roots = vec![PathBuf::from("/usr/share/ember/sessions")];
    if let Some(config) = dirs::config_dir() {
        roots.push(config.join("ember"));
    }
    roots
}

/// Directory of per-session run-files.
pub fn sessions_dir() -> PathBuf {
    runtime_dir().join("sessions")
}

/// Run-file for this supervisor process.
pub fn session_file(pid: u32) -> PathBuf {
    sessions_dir().join(format!("{}.session", pid))
}

/// Control socket path.
pub fn socket_path() -> PathBuf {
    runtime_dir().join("emberd.sock")
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
