use clap::{Args, Parser, Subcommand, ValueEnum};
use hpc_access_core::OpKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hpc-access",
    about = "Reconcile cluster accounts, groups, and storage with the hpc-access registry",
    version
)]
pub struct Cli {
    /// Settings file (JSON, or TOML by extension); falls back to
    /// HPC_ACCESS_CONFIG, then /etc/hpc-access-cli/config.json
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Read state from snapshot files instead of the live systems.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Directory-service and filesystem state snapshot (JSON)
    #[arg(long)]
    pub system_snapshot: Option<PathBuf>,

    /// Registry state snapshot (JSON)
    #[arg(long)]
    pub registry_snapshot: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Converge directory service and storage towards the registry
    StateSync {
        #[command(flatten)]
        sources: SourceArgs,

        /// Operation kinds applied to accounts (comma separated)
        #[arg(long, value_delimiter = ',')]
        account_ops: Option<Vec<OpKind>>,

        /// Operation kinds applied to groups (comma separated)
        #[arg(long, value_delimiter = ',')]
        group_ops: Option<Vec<OpKind>>,

        /// Operation kinds applied to directories (comma separated)
        #[arg(long, value_delimiter = ',')]
        directory_ops: Option<Vec<OpKind>>,

        /// Only log the actions
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write observed storage usage back to the registry
    StorageUsageSync {
        #[command(flatten)]
        sources: SourceArgs,

        /// Compute the usage but push nothing
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the current state as registry records (JSON)
    StateDump {
        /// Directory-service and filesystem state snapshot (JSON)
        #[arg(long)]
        system_snapshot: Option<PathBuf>,
    },

    /// Save live state to a snapshot file for offline use
    Snapshot {
        /// Which state to capture
        #[arg(value_enum)]
        kind: SnapshotKind,

        /// Output file
        #[arg(long)]
        out: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SnapshotKind {
    System,
    Registry,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::System => "system",
            SnapshotKind::Registry => "registry",
        }
    }
}
