//! hpc-access CLI: the `hpc-access` command.

mod cli;
mod commands;
mod config;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_tracing(cli.verbose);
    let config = cli.config;

    match cli.command {
        Commands::StateSync {
            sources,
            account_ops,
            group_ops,
            directory_ops,
            dry_run,
            json,
        } => commands::state_sync::run(commands::state_sync::Args {
            config,
            sources,
            account_ops,
            group_ops,
            directory_ops,
            dry_run,
            json,
        }),

        Commands::StorageUsageSync {
            sources,
            dry_run,
            json,
        } => commands::storage_usage_sync::run(config, sources, dry_run, json),

        Commands::StateDump { system_snapshot } => {
            commands::state_dump::run(config, system_snapshot)
        }

        Commands::Snapshot { kind, out, json } => commands::snapshot::run(config, kind, out, json),
    }
}
