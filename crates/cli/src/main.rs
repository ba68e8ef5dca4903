// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! orc - task orchestrator control plane CLI
//!
//! Every command prints a single-line JSON envelope on stdout and exits 0
//! on success; failures print `{"ok":false,"error":...}` and exit nonzero.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "orc",
    version,
    about = "orc - a multi-agent task orchestrator control plane"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the state directory under a run root
    Init(commands::InitArgs),
    /// Route one line of text into an intent (no state change)
    Route(commands::RouteArgs),
    /// Route and apply one line of text to the task board
    Apply(commands::ApplyArgs),
    /// Dispatch one task to a worker agent
    Dispatch(commands::DispatchArgs),
    /// Run a batch of dispatcher iterations
    Autopilot(commands::AutopilotArgs),
    /// Control or tick the interval scheduler
    Scheduler(commands::SchedulerArgs),
    /// Execute a governance command
    Governance(commands::GovernanceArgs),
    /// Aggregate operational metrics over a window
    Metrics(commands::MetricsArgs),
    /// Rebuild the snapshot by replaying the journal
    Rebuild(commands::RebuildArgs),
    /// Verify the governance audit hash chain
    AuditVerify(commands::AuditVerifyArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Init(args) => commands::init(args),
        Commands::Route(args) => commands::route(args),
        Commands::Apply(args) => commands::apply(args),
        Commands::Dispatch(args) => commands::dispatch(args).await,
        Commands::Autopilot(args) => commands::autopilot(args).await,
        Commands::Scheduler(args) => commands::scheduler(args).await,
        Commands::Governance(args) => commands::governance(args),
        Commands::Metrics(args) => commands::metrics(args),
        Commands::Rebuild(args) => commands::rebuild(args),
        Commands::AuditVerify(args) => commands::audit_verify(args),
    };
    std::process::exit(code);
}
