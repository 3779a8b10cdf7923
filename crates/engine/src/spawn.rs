// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn planning: instance-name templates and child environment assembly.

use ember_catalog::JobClass;
use ember_core::{JobEnvironment, JobInstance, ProcessKind, SpawnRequest};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from instance-template expansion
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown variable ${0} in instance template")]
    UnknownVariable(String),

    #[error("unterminated ${{...}} reference in instance template")]
    Unterminated,
}

/// Expand `$KEY` / `${KEY}` references against an environment.
///
/// `$$` produces a literal dollar sign. Unknown variables are an error: an
/// instance name that silently collapsed to the empty string would alias
/// unrelated starts onto one singleton.
pub fn expand_template(
    template: &str,
    env: &[(String, String)],
) -> Result<String, TemplateError> {
    let lookup = |key: &str| -> Option<&str> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => key.push(c),
                        None => return Err(TemplateError::Unterminated),
                    }
                }
                let value = lookup(&key).ok_or(TemplateError::UnknownVariable(key))?;
                out.push_str(value);
            }
            _ => {
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        key.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if key.is_empty() {
                    out.push('$');
                    continue;
                }
                let value = lookup(&key).ok_or(TemplateError::UnknownVariable(key))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// Synthetic variables every supervised process receives.
pub const VAR_JOB: &str = "EMBER_JOB";
pub const VAR_INSTANCE: &str = "EMBER_INSTANCE";
pub const VAR_SESSION: &str = "EMBER_SESSION";

/// Assemble the environment a child sees.
///
/// Overlay order, later entries winning on key collision: global job
/// environment, class `env` defaults, the class's `export` selections from
/// the trigger, the full trigger environment, and the synthetic
/// identification variables.
pub fn build_child_env(
    class: &JobClass,
    instance: &JobInstance,
    global_env: &JobEnvironment,
    session: &str,
) -> Vec<(String, String)> {
    let mut env: IndexMap<String, String> = IndexMap::new();

    for (key, value) in global_env.iter() {
        env.insert(key.to_string(), value.to_string());
    }
    for (key, value) in &class.env {
        env.insert(key.clone(), value.clone());
    }
    for key in &class.export {
        if let Some((_, value)) = instance.env.iter().find(|(k, _)| k == key) {
            env.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in &instance.env {
        env.insert(key.clone(), value.clone());
    }
    env.insert(VAR_JOB.to_string(), instance.id.class.clone());
    env.insert(VAR_INSTANCE.to_string(), instance.id.instance.clone());
    env.insert(VAR_SESSION.to_string(), session.to_string());

    env.into_iter().collect()
}

/// Per-job console log file: `<job>.log`, with an instance suffix for
/// multi-instance classes. Path separators in class names become dashes.
pub fn console_log_path(log_dir: &Path, instance: &JobInstance) -> PathBuf {
    let class = instance.id.class.replace('/', "-");
    let file = if instance.id.instance.is_empty() {
        format!("{}.log", class)
    } else {
        format!("{}-{}.log", class, instance.id.instance.replace('/', "-"))
    };
    log_dir.join(file)
}

/// Build the full spawn request for one process of an instance.
pub fn build_spawn_request(
    class: &JobClass,
    instance: &JobInstance,
    kind: ProcessKind,
    command: ember_core::CommandLine,
    global_env: &JobEnvironment,
    session: &str,
    log_dir: &Path,
) -> SpawnRequest {
    let log_path = matches!(class.console, ember_core::ConsoleMode::Log)
        .then(|| console_log_path(log_dir, instance));

    SpawnRequest {
        id: instance.id.clone(),
        kind,
        command,
        env: build_child_env(class, instance, global_env, session),
        console: class.console,
        log_path,
        chdir: class.chdir.clone(),
        chroot: class.chroot.clone(),
        umask: class.umask,
        nice: class.nice,
        oom_score: class.oom_score,
        limits: class.limits.clone(),
        setuid: class.setuid.clone(),
        setgid: class.setgid.clone(),
    }
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
