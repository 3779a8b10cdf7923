// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! emit

use crate::client::Client;
use crate::missing;
use anyhow::{anyhow, Result};
use clap::Args;
use ember_daemon::protocol::{Request, Response};

#[derive(Args)]
pub struct EmitArgs {
    /// Event name
    pub name: Option<String>,
    /// KEY=VALUE pairs forming the event environment
    pub env: Vec<String>,
    /// Return immediately instead of waiting for triggered jobs to settle
    #[arg(long = "no-wait")]
    pub no_wait: bool,
}

pub async fn emit(client: &Client, args: EmitArgs) -> Result<()> {
    let name = args.name.ok_or_else(|| missing("event", "emit"))?;
    let wait = !args.no_wait;
    let response = client
        .request(
            Request::EmitEvent {
                name,
                env: args.env,
                wait,
            },
            !wait,
        )
        .await?;
    match response {
        Response::Ok => Ok(()),
        Response::EventDone { failed: false } => Ok(()),
        Response::EventDone { failed: true } => Err(anyhow!("event failed")),
        Response::Error { message } => Err(anyhow!(message)),
        other => Err(anyhow!("unexpected response: {other:?}")),
    }
}
