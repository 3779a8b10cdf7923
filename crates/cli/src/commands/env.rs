// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! list-env / get-env / set-env / unset-env / reset-env

use crate::client::{expect, Client};
use crate::missing;
use anyhow::{anyhow, Result};
use clap::Args;
use ember_daemon::protocol::{Request, Response};

#[derive(Args)]
pub struct GetEnvArgs {
    /// Variable name
    pub key: Option<String>,
}

#[derive(Args)]
pub struct SetEnvArgs {
    /// KEY=VALUE pair
    pub pair: Option<String>,
    /// Keep an existing value instead of replacing it
    #[arg(long)]
    pub retain: bool,
}

#[derive(Args)]
pub struct UnsetEnvArgs {
    /// Variable name
    pub key: Option<String>,
}

pub async fn list_env(client: &Client) -> Result<()> {
    let response = client.request(Request::ListEnv, true).await?;
    let entries = expect(response, |r| match r {
        Response::EnvList { entries } => Some(entries),
        _ => None,
    })?;
    for entry in entries {
        println!("{}", entry);
    }
    Ok(())
}

pub async fn get_env(client: &Client, args: GetEnvArgs) -> Result<()> {
    let key = args.key.ok_or_else(|| missing("variable", "get-env"))?;
    let response = client
        .request(Request::GetEnv { key: key.clone() }, true)
        .await?;
    let value = expect(response, |r| match r {
        Response::EnvValue { value } => Some(value),
        _ => None,
    })?;
    match value {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => Err(anyhow!("variable not set: {key}")),
    }
}

pub async fn set_env(client: &Client, args: SetEnvArgs) -> Result<()> {
    let pair = args.pair.ok_or_else(|| missing("variable", "set-env"))?;
    client
        .expect_ok(
            Request::SetEnv {
                pair,
                replace: !args.retain,
            },
            true,
        )
        .await
}

pub async fn unset_env(client: &Client, args: UnsetEnvArgs) -> Result<()> {
    let key = args.key.ok_or_else(|| missing("variable", "unset-env"))?;
    client.expect_ok(Request::UnsetEnv { key }, true).await
}

pub async fn reset_env(client: &Client) -> Result<()> {
    client.expect_ok(Request::ResetEnv, true).await
}
