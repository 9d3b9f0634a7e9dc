use crate::cli::SourceArgs;
use crate::support::{
    fail, print_json_or_exit, registry_client_or_exit, registry_state_or_exit, settings_or_exit,
    system_state_or_exit, yes_no,
};
use hpc_access_core::{ReadOnly, RegistryState, UsageFold, fold_usage, push_usage};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::info;

/// The records whose usage changed, as they now read.
fn changed_records(registry: &RegistryState, fold: &UsageFold) -> Value {
    let users: Vec<_> = fold
        .users
        .iter()
        .filter_map(|uuid| registry.users.get(uuid))
        .collect();
    let groups: Vec<_> = fold
        .groups
        .iter()
        .filter_map(|uuid| registry.groups.get(uuid))
        .collect();
    let projects: Vec<_> = fold
        .projects
        .iter()
        .filter_map(|uuid| registry.projects.get(uuid))
        .collect();
    json!({
        "users": users,
        "groups": groups,
        "projects": projects,
    })
}

pub fn run(config: Option<PathBuf>, sources: SourceArgs, dry_run: bool, json: bool) {
    let settings = settings_or_exit(config.as_deref());
    let dry_run = dry_run || settings.dry_run;
    let system = system_state_or_exit(&settings, sources.system_snapshot.as_deref());
    let mut registry = registry_state_or_exit(&settings, sources.registry_snapshot.as_deref());

    let fold = fold_usage(&mut registry, &system);
    fold.diagnostics.log();

    let pushed = if dry_run {
        info!(changed = fold.changed(), "dry run, usage not pushed");
        push_usage(&mut ReadOnly, &registry, &fold, true)
    } else {
        let mut client = registry_client_or_exit(&settings);
        push_usage(&mut client, &registry, &fold, false)
    }
    .unwrap_or_else(|e| fail(e));

    if json {
        let mut output = changed_records(&registry, &fold);
        output["pushed"] = json!(pushed);
        output["dryRun"] = json!(dry_run);
        print_json_or_exit(&output);
        return;
    }

    println!("hpc-access storage-usage-sync");
    println!();
    println!("  dry run: {}", yes_no(dry_run));
    println!("  changed records: {}", fold.changed());
    println!("  pushed: {pushed}");
    println!("  warnings: {}", fold.diagnostics.len());
    for uuid in &fold.users {
        if let Some(user) = registry.users.get(uuid) {
            let used = user.resources_used.unwrap_or_default();
            println!("  user {}: tier1_home {:.2} GB", user.username, used.tier1_home);
        }
    }
    let shares = fold
        .groups
        .iter()
        .filter_map(|uuid| registry.groups.get(uuid))
        .map(|g| ("group", &g.name, g.resources_used))
        .chain(
            fold.projects
                .iter()
                .filter_map(|uuid| registry.projects.get(uuid))
                .map(|p| ("project", &p.name, p.resources_used)),
        );
    for (kind, name, used) in shares {
        let used = used.unwrap_or_default();
        println!(
            "  {kind} {name}: work {:.2} TB, scratch {:.2} TB, mirrored {:.2} TB, unmirrored {:.2} TB",
            used.tier1_work, used.tier1_scratch, used.tier2_mirrored, used.tier2_unmirrored
        );
    }
}
