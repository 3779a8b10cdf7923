// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! list-sessions

use anyhow::Result;

/// Enumerate per-session run-files, pruning entries whose supervisor died.
pub fn list_sessions() -> Result<()> {
    let sessions_dir = ember_daemon::env::sessions_dir();
    for (pid, path) in ember_daemon::lifecycle::prune_dead_sessions(&sessions_dir) {
        let socket = std::fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        println!("{} {}", pid, socket);
    }
    Ok(())
}
