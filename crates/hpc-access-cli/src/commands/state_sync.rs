use crate::cli::SourceArgs;
use crate::config::Settings;
use crate::support::{
    fail, ldap_or_exit, print_json_or_exit, registry_state_or_exit, settings_or_exit,
    system_state_or_exit, yes_no,
};
use hpc_access_core::{
    DirectoryWriter, ExecutionOptions, ExecutionReport, Executor, FilesystemWriter, OpFilter,
    OpKind, OperationSet, ReadOnly, TargetStateBuilder, compare_states,
};
use hpc_access_fs::CephFs;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

pub struct Args {
    pub config: Option<PathBuf>,
    pub sources: SourceArgs,
    pub account_ops: Option<Vec<OpKind>>,
    pub group_ops: Option<Vec<OpKind>>,
    pub directory_ops: Option<Vec<OpKind>>,
    pub dry_run: bool,
    pub json: bool,
}

/// Flags override the settings file; either one can request a dry run.
pub fn execution_options(settings: &Settings, args: &Args) -> ExecutionOptions {
    let pick = |flag: &Option<Vec<OpKind>>, configured: &OpFilter| match flag {
        Some(kinds) => kinds.iter().copied().collect(),
        None => configured.clone(),
    };
    ExecutionOptions {
        dry_run: args.dry_run || settings.dry_run,
        account_ops: pick(&args.account_ops, &settings.account_ops),
        group_ops: pick(&args.group_ops, &settings.group_ops),
        directory_ops: pick(&args.directory_ops, &settings.directory_ops),
    }
}

fn execute<D, F>(
    directory: D,
    filesystem: F,
    options: ExecutionOptions,
    ops: &OperationSet,
) -> ExecutionReport
where
    D: DirectoryWriter,
    F: FilesystemWriter,
{
    let mut executor = Executor::new(directory, filesystem, options);
    if let Err(err) = executor.apply(ops) {
        fail(err);
    }
    let (_, _, report) = executor.into_parts();
    report
}

pub fn run(args: Args) {
    let settings = settings_or_exit(args.config.as_deref());
    let options = execution_options(&settings, &args);
    if !options.dry_run && args.sources.system_snapshot.is_some() {
        fail("--system-snapshot can only be planned against; pass --dry-run true");
    }

    let current = system_state_or_exit(&settings, args.sources.system_snapshot.as_deref());
    let registry = registry_state_or_exit(&settings, args.sources.registry_snapshot.as_deref());
    let outcome = TargetStateBuilder::new(&registry, &current)
        .build()
        .unwrap_or_else(|e| fail(e));
    outcome.diagnostics.log();

    let ops = compare_states(&current, &outcome.state);
    info!(
        accounts = ops.accounts.len(),
        groups = ops.groups.len(),
        directories = ops.directories.len(),
        "computed operations"
    );

    let report = if options.dry_run {
        execute(ReadOnly, ReadOnly, options, &ops)
    } else {
        warn!("applying operations to live systems");
        let directory = ldap_or_exit(&settings);
        let filesystem = CephFs::new(&settings.filesystem);
        execute(directory, filesystem, options, &ops)
    };

    if args.json {
        print_json_or_exit(&json!({
            "operations": ops,
            "report": report,
            "warnings": outcome.diagnostics.findings(),
        }));
        return;
    }

    println!("hpc-access state-sync");
    println!();
    println!("  dry run: {}", yes_no(report.dry_run));
    println!(
        "  operations: {} (accounts {}, groups {}, directories {})",
        ops.len(),
        ops.accounts.len(),
        ops.groups.len(),
        ops.directories.len()
    );
    println!(
        "  applied: {}  filtered: {}  noop: {}",
        report.applied, report.filtered, report.noop
    );
    println!("  warnings: {}", outcome.diagnostics.len());
    if !report.actions.is_empty() {
        println!("  actions:");
        for action in &report.actions {
            println!("    + {action}");
        }
    }
}
