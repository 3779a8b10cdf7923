// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! start / stop / restart / reload / status / list / usage

use crate::client::{expect, Client};
use crate::missing;
use crate::output::{format_instance, format_job};
use anyhow::{anyhow, Result};
use clap::Args;
use ember_daemon::protocol::{Request, Response};

#[derive(Args)]
pub struct StartArgs {
    /// Job name
    pub name: Option<String>,
    /// KEY=VALUE pairs forming the start environment
    pub env: Vec<String>,
    /// Return immediately instead of waiting for the job to settle
    #[arg(long = "no-wait")]
    pub no_wait: bool,
}

#[derive(Args)]
pub struct StopArgs {
    /// Job name
    pub name: Option<String>,
    /// Instance name, for multi-instance jobs
    #[arg(long, default_value = "")]
    pub instance: String,
    /// Return immediately instead of waiting for the stop to finish
    #[arg(long = "no-wait")]
    pub no_wait: bool,
}

#[derive(Args)]
pub struct RestartArgs {
    /// Job name
    pub name: Option<String>,
    /// Instance name, for multi-instance jobs
    #[arg(long, default_value = "")]
    pub instance: String,
    /// Return immediately instead of waiting for the restart to finish
    #[arg(long = "no-wait")]
    pub no_wait: bool,
}

#[derive(Args)]
pub struct ReloadArgs {
    /// Job name
    pub name: Option<String>,
    /// Instance name, for multi-instance jobs
    #[arg(long, default_value = "")]
    pub instance: String,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Job name
    pub name: Option<String>,
    /// Instance name, for multi-instance jobs
    #[arg(long, default_value = "")]
    pub instance: String,
}

#[derive(Args)]
pub struct UsageArgs {
    /// Job name
    pub name: Option<String>,
}

pub async fn start(client: &Client, args: StartArgs) -> Result<()> {
    let name = args.name.ok_or_else(|| missing("job", "start"))?;
    let wait = !args.no_wait;
    client
        .expect_ok(
            Request::Start {
                name: name.clone(),
                env: args.env,
                wait,
            },
            !wait,
        )
        .await?;
    print_status(client, &name, "").await
}

pub async fn stop(client: &Client, args: StopArgs) -> Result<()> {
    let name = args.name.ok_or_else(|| missing("job", "stop"))?;
    let wait = !args.no_wait;
    client
        .expect_ok(
            Request::Stop {
                name: name.clone(),
                instance: args.instance,
                wait,
            },
            !wait,
        )
        .await?;
    if wait {
        println!("{} stop/waiting", name);
    }
    Ok(())
}

pub async fn restart(client: &Client, args: RestartArgs) -> Result<()> {
    let name = args.name.ok_or_else(|| missing("job", "restart"))?;
    let wait = !args.no_wait;
    client
        .expect_ok(
            Request::Restart {
                name: name.clone(),
                instance: args.instance.clone(),
                wait,
            },
            !wait,
        )
        .await?;
    print_status(client, &name, &args.instance).await
}

/// Deliver SIGHUP to the job's main process (configuration nudge).
pub async fn reload(client: &Client, args: ReloadArgs) -> Result<()> {
    let name = args.name.ok_or_else(|| missing("job", "reload"))?;
    let response = client
        .request(
            Request::GetInstanceByName {
                name,
                instance: args.instance,
            },
            true,
        )
        .await?;
    let instance = expect(response, |r| match r {
        Response::Instance { instance } => Some(instance),
        _ => None,
    })?;

    let main = instance
        .processes
        .iter()
        .find(|(kind, _)| kind == "main")
        .map(|(_, pid)| *pid)
        .ok_or_else(|| anyhow!("job has no main process"))?;

    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(main as i32),
        nix::sys::signal::Signal::SIGHUP,
    )
    .map_err(|e| anyhow!("cannot signal process {main}: {e}"))?;
    Ok(())
}

pub async fn status(client: &Client, args: StatusArgs) -> Result<()> {
    let name = args.name.ok_or_else(|| missing("job", "status"))?;
    print_status(client, &name, &args.instance).await
}

pub async fn list(client: &Client) -> Result<()> {
    let response = client.request(Request::GetAllJobs, true).await?;
    let jobs = expect(response, |r| match r {
        Response::Jobs { jobs } => Some(jobs),
        _ => None,
    })?;
    for job in jobs {
        println!("{}", format_job(&job));
    }
    Ok(())
}

pub async fn usage(client: &Client, args: UsageArgs) -> Result<()> {
    let name = args.name.ok_or_else(|| missing("job", "usage"))?;
    let response = client
        .request(Request::GetJobByName { name: name.clone() }, true)
        .await?;
    let job = expect(response, |r| match r {
        Response::Job { job } => Some(job),
        _ => None,
    })?;
    match job.usage {
        Some(text) => println!("Usage: {}", text),
        None => println!("Usage: {}", name),
    }
    Ok(())
}

/// Fetch and print one instance's status line.
async fn print_status(client: &Client, name: &str, instance: &str) -> Result<()> {
    let response = client
        .request(
            Request::GetInstanceByName {
                name: name.to_string(),
                instance: instance.to_string(),
            },
            true,
        )
        .await?;
    match response {
        Response::Instance { instance } => {
            println!("{}", format_instance(&instance));
            Ok(())
        }
        // No live instance: report the idle form rather than failing
        Response::Error { message } if message.contains("unknown instance") => {
            println!("{} stop/waiting", name);
            Ok(())
        }
        Response::Error { message } => Err(anyhow!(message)),
        other => Err(anyhow!("unexpected response: {other:?}")),
    }
}
