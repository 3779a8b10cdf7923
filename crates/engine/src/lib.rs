// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ember-engine: the job state engine of the Ember supervisor.
//!
//! The [`Engine`] is a pure, synchronous state machine: it consumes
//! [`ember_core::Event`]s and returns [`ember_core::Effect`]s. The async
//! [`Executor`] carries effects out against the OS through a
//! [`ProcessAdapter`] and feeds resulting events back into the loop.

mod error;
mod executor;
mod instances;
mod machine;
mod process;
mod queue;
mod runtime;
mod scheduler;
mod spawn;

pub use error::RuntimeError;
pub use executor::Executor;
pub use instances::InstanceTable;
pub use process::{NativeProcessAdapter, ProcessAdapter, SpawnError};
pub use queue::{EventQueue, ParkedEmission};
pub use runtime::{Engine, EngineState, SessionInfo, QUIESCE_INTERVAL};
pub use scheduler::Scheduler;
pub use spawn::{build_spawn_request, expand_template, TemplateError};

#[cfg(any(test, feature = "test-support"))]
pub use process::{FakeProcessAdapter, SpawnCall};
