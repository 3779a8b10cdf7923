// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types

use thiserror::Error;

/// Errors surfaced to control-interface callers.
///
/// State-machine actions never raise: a failing transition records its
/// failure on the instance and synthesizes a `stopped RESULT=failed` event
/// instead. These errors cover operator requests against missing names and
/// malformed input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("unknown instance: {0}")]
    UnknownInstance(String),

    #[error("job is marked deleted: {0}")]
    JobDeleted(String),

    #[error("instance template expansion failed: {0}")]
    Template(#[from] crate::spawn::TemplateError),

    #[error("{0}")]
    Environment(#[from] ember_core::EnvError),
}
