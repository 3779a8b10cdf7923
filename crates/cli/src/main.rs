// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ember - control CLI for the Ember service supervisor

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{config, env, events, jobs, sessions};

#[derive(Parser)]
#[command(
    name = "ember",
    version,
    about = "Control the Ember service supervisor"
)]
struct Cli {
    /// Control socket path override
    #[arg(long = "socket", global = true, value_name = "PATH")]
    socket: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a job
    Start(jobs::StartArgs),
    /// Stop a job instance
    Stop(jobs::StopArgs),
    /// Restart a job instance
    Restart(jobs::RestartArgs),
    /// Send SIGHUP to a job's main process
    Reload(jobs::ReloadArgs),
    /// Query the status of a job
    Status(jobs::StatusArgs),
    /// List all known jobs
    List,
    /// Emit an event
    Emit(events::EmitArgs),
    /// Re-scan the job configuration tree
    ReloadConfiguration,
    /// Show the supervisor version
    Version,
    /// Show or change the supervisor log priority
    LogPriority(config::LogPriorityArgs),
    /// Print parsed job configuration without a running supervisor
    ShowConfig(config::ShowConfigArgs),
    /// Report unreachable event expressions in the configuration
    CheckConfig(config::CheckConfigArgs),
    /// List the supervisor's job environment
    ListEnv,
    /// Look up one job environment variable
    GetEnv(env::GetEnvArgs),
    /// Set a job environment variable
    SetEnv(env::SetEnvArgs),
    /// Remove a job environment variable
    UnsetEnv(env::UnsetEnvArgs),
    /// Restore the job environment to startup defaults
    ResetEnv,
    /// Show a job's usage string
    Usage(jobs::UsageArgs),
    /// Tell the supervisor log storage is writable
    NotifyDiskWriteable,
    /// List running supervisor sessions
    ListSessions,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::Client::new(cli.socket);
    match cli.command {
        Commands::Start(args) => jobs::start(&client, args).await,
        Commands::Stop(args) => jobs::stop(&client, args).await,
        Commands::Restart(args) => jobs::restart(&client, args).await,
        Commands::Reload(args) => jobs::reload(&client, args).await,
        Commands::Status(args) => jobs::status(&client, args).await,
        Commands::List => jobs::list(&client).await,
        Commands::Emit(args) => events::emit(&client, args).await,
        Commands::ReloadConfiguration => config::reload_configuration(&client).await,
        Commands::Version => config::version(&client).await,
        Commands::LogPriority(args) => config::log_priority(&client, args).await,
        Commands::ShowConfig(args) => config::show_config(args),
        Commands::CheckConfig(args) => config::check_config(args),
        Commands::ListEnv => env::list_env(&client).await,
        Commands::GetEnv(args) => env::get_env(&client, args).await,
        Commands::SetEnv(args) => env::set_env(&client, args).await,
        Commands::UnsetEnv(args) => env::unset_env(&client, args).await,
        Commands::ResetEnv => env::reset_env(&client).await,
        Commands::Usage(args) => jobs::usage(&client, args).await,
        Commands::NotifyDiskWriteable => config::notify_disk_writeable(&client).await,
        Commands::ListSessions => sessions::list_sessions(),
    }
}

/// A mandatory name argument was omitted: print the classic diagnostic and
/// a help hint.
pub(crate) fn missing(what: &str, command: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "missing {what} name\nTry 'ember {command} --help' for more information."
    )
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
