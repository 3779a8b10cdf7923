// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! reload-configuration / version / log-priority / show-config /
//! check-config / notify-disk-writeable
//!
//! `show-config` and `check-config` run against the configuration tree
//! locally, so they work without a running supervisor.

use crate::client::{expect, Client};
use anyhow::{anyhow, Result};
use clap::Args;
use ember_catalog::{check_catalog, Catalog};
use ember_daemon::protocol::{Request, Response};
use std::path::PathBuf;

#[derive(Args)]
pub struct LogPriorityArgs {
    /// New priority (debug, info, message, warn, error, fatal); omit to query
    pub priority: Option<String>,
}

#[derive(Args)]
pub struct ShowConfigArgs {
    /// Job name; omit to show every class
    pub name: Option<String>,
    /// Configuration root override (repeatable, ascending priority)
    #[arg(long = "confdir", value_name = "DIR")]
    pub conf_dirs: Vec<PathBuf>,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Configuration root override (repeatable, ascending priority)
    #[arg(long = "confdir", value_name = "DIR")]
    pub conf_dirs: Vec<PathBuf>,
}

pub async fn reload_configuration(client: &Client) -> Result<()> {
    let response = client.request(Request::ReloadConfiguration, true).await?;
    let errors = expect(response, |r| match r {
        Response::Reloaded { errors } => Some(errors),
        _ => None,
    })?;
    for error in &errors {
        eprintln!("{}", error);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("{} configuration file(s) skipped", errors.len()))
    }
}

pub async fn version(client: &Client) -> Result<()> {
    let response = client.request(Request::GetVersion, true).await?;
    let version = expect(response, |r| match r {
        Response::Version { version } => Some(version),
        _ => None,
    })?;
    println!("{}", version);
    Ok(())
}

pub async fn log_priority(client: &Client, args: LogPriorityArgs) -> Result<()> {
    match args.priority {
        Some(priority) => {
            client
                .expect_ok(Request::SetLogPriority { priority }, true)
                .await
        }
        None => {
            let response = client.request(Request::GetLogPriority, true).await?;
            let priority = expect(response, |r| match r {
                Response::LogPriority { priority } => Some(priority),
                _ => None,
            })?;
            println!("{}", priority);
            Ok(())
        }
    }
}

pub async fn notify_disk_writeable(client: &Client) -> Result<()> {
    client.expect_ok(Request::NotifyDiskWriteable, true).await
}

/// Load the local catalog the same way the supervisor would.
fn local_catalog(conf_dirs: Vec<PathBuf>) -> (Catalog, Vec<String>) {
    let roots = if conf_dirs.is_empty() {
        ember_daemon::env::conf_dirs()
    } else {
        conf_dirs
    };
    let mut catalog = Catalog::new(roots);
    let report = catalog.load_all();
    let errors = report
        .errors
        .iter()
        .map(|(path, error)| format!("{}: {}", path.display(), error))
        .collect();
    (catalog, errors)
}

pub fn show_config(args: ShowConfigArgs) -> Result<()> {
    let (catalog, errors) = local_catalog(args.conf_dirs);
    for error in &errors {
        eprintln!("{}", error);
    }

    let classes = match &args.name {
        Some(name) => {
            let class = catalog
                .lookup(name)
                .ok_or_else(|| anyhow!("unknown job: {name}"))?;
            vec![class]
        }
        None => catalog.classes(),
    };

    for class in classes {
        println!("{}", class.name);
        if let Some(expr) = &class.start_on {
            println!("  start on {}", expr);
        }
        if let Some(expr) = &class.stop_on {
            println!("  stop on {}", expr);
        }
        if !class.emits.is_empty() {
            println!("  emits {}", class.emits.join(" "));
        }
    }
    Ok(())
}

pub fn check_config(args: CheckConfigArgs) -> Result<()> {
    let (catalog, errors) = local_catalog(args.conf_dirs);
    for error in &errors {
        eprintln!("{}", error);
    }

    let report = check_catalog(&catalog);
    for (class, warnings) in &report.entries {
        println!("{}", class);
        for warning in warnings {
            println!("  {}", warning);
        }
    }
    if report.is_clean() && errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("configuration check found problems"))
    }
}
