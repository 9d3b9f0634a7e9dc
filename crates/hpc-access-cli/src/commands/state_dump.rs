use crate::support::{print_json_or_exit, settings_or_exit, system_state_or_exit};
use chrono::Utc;
use hpc_access_core::dump_registry_state;
use std::path::PathBuf;
use tracing::info;

pub fn run(config: Option<PathBuf>, system_snapshot: Option<PathBuf>) {
    let settings = settings_or_exit(config.as_deref());
    let system = system_state_or_exit(&settings, system_snapshot.as_deref());
    let outcome = dump_registry_state(&system, Utc::now());
    outcome.diagnostics.log();
    info!(
        users = outcome.state.users.len(),
        groups = outcome.state.groups.len(),
        projects = outcome.state.projects.len(),
        "dumped registry state"
    );
    print_json_or_exit(&outcome.state);
}
