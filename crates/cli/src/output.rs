// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status line formatting.
//!
//! One instance renders as `CLASS [(INSTANCE)] GOAL/STATE[, [(KIND) ]process
//! PID]`, with one additional indented `KIND process PID` line per
//! simultaneously running auxiliary process.

use ember_daemon::protocol::{InstanceEntry, JobEntry};

/// Render one instance, including auxiliary process lines.
pub fn format_instance(entry: &InstanceEntry) -> String {
    let mut head = if entry.instance.is_empty() {
        format!("{} {}/{}", entry.name, entry.goal, entry.state)
    } else {
        format!(
            "{} ({}) {}/{}",
            entry.name, entry.instance, entry.goal, entry.state
        )
    };

    let main = entry
        .processes
        .iter()
        .find(|(kind, _)| kind == "main")
        .map(|(_, pid)| *pid);
    let mut aux: Vec<&(String, u32)> = entry
        .processes
        .iter()
        .filter(|(kind, _)| kind != "main")
        .collect();
    aux.sort_by(|a, b| a.0.cmp(&b.0));

    match main {
        Some(pid) => {
            head.push_str(&format!(", process {}", pid));
        }
        None => {
            // No main: the first auxiliary rides the head line, tagged
            if !aux.is_empty() {
                let (kind, pid) = aux.remove(0);
                head.push_str(&format!(", ({}) process {}", kind, pid));
            }
        }
    }
    for (kind, pid) in aux {
        head.push_str(&format!("\n\t{} process {}", kind, pid));
    }
    head
}

/// Render a job for `list`: each live instance, or the idle singleton line.
pub fn format_job(entry: &JobEntry) -> String {
    if entry.instances.is_empty() {
        return format!("{} stop/waiting", entry.name);
    }
    entry
        .instances
        .iter()
        .map(format_instance)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
