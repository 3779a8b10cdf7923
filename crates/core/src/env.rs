// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide job environment table.
//!
//! Every supervised process starts from this table, overlaid with the job
//! class defaults and the trigger environment. Keys are case-sensitive,
//! values may be empty, and insertion order is preserved for overlays while
//! `list()` reports keys in ascending lexicographic order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `PATH` guaranteed to exist even when the supervisor's own environment is
/// not inherited.
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// `TERM` guaranteed to exist even when the supervisor's own environment is
/// not inherited.
pub const DEFAULT_TERM: &str = "linux";

/// Errors from environment mutation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("variable not set: {0}")]
    NotFound(String),
    #[error("invalid variable name: {0:?}")]
    InvalidName(String),
    #[error("expected KEY=VALUE, got {0:?}")]
    MissingValue(String),
}

/// The process-wide job environment.
///
/// Holds both the default table captured at supervisor start (the target of
/// `reset`) and the live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobEnvironment {
    defaults: IndexMap<String, String>,
    table: IndexMap<String, String>,
}

impl JobEnvironment {
    /// Build the startup environment.
    ///
    /// With `inherit` the supervisor's own environment seeds the table;
    /// without it only the compile-time `PATH` and `TERM` defaults do. Either
    /// way `PATH` and `TERM` are guaranteed present.
    pub fn with_defaults(inherit: bool) -> Self {
        let mut defaults = IndexMap::new();
        if inherit {
            for (key, value) in std::env::vars() {
                if is_valid_name(&key) {
                    defaults.insert(key, value);
                }
            }
        }
        defaults
            .entry("PATH".to_string())
            .or_insert_with(|| DEFAULT_PATH.to_string());
        defaults
            .entry("TERM".to_string())
            .or_insert_with(|| DEFAULT_TERM.to_string());

        Self {
            table: defaults.clone(),
            defaults,
        }
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.table.get(key).map(String::as_str)
    }

    /// Set a variable.
    ///
    /// With `replace` an existing value is overwritten; without it (the
    /// retain semantics) an existing value is left untouched.
    pub fn set(&mut self, key: &str, value: &str, replace: bool) -> Result<(), EnvError> {
        if !is_valid_name(key) {
            return Err(EnvError::InvalidName(key.to_string()));
        }
        if replace {
            self.table.insert(key.to_string(), value.to_string());
        } else {
            self.table
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
        Ok(())
    }

    /// Remove a variable.
    pub fn unset(&mut self, key: &str) -> Result<(), EnvError> {
        // shift_remove keeps insertion order for the remaining keys
        self.table
            .shift_remove(key)
            .map(|_| ())
            .ok_or_else(|| EnvError::NotFound(key.to_string()))
    }

    /// Restore the table captured at supervisor start.
    pub fn reset(&mut self) {
        self.table = self.defaults.clone();
    }

    /// `KEY=VALUE` pairs in ascending lexicographic key order.
    pub fn list(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .table
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        pairs.sort();
        pairs
    }

    /// Iterate pairs in insertion order (overlay semantics).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.table.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Split a `KEY=VALUE` string, validating the key.
///
/// A bare `KEY` (no `=`) is rejected; callers that want pass-through
/// semantics resolve the value themselves first.
pub fn parse_env_pair(pair: &str) -> Result<(String, String), EnvError> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| EnvError::MissingValue(pair.to_string()))?;
    if !is_valid_name(key) {
        return Err(EnvError::InvalidName(key.to_string()));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Shell-style variable name: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
