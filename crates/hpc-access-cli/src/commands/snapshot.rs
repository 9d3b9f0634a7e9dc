use crate::cli::SnapshotKind;
use crate::support::{
    fail, print_json_or_exit, registry_state_or_exit, settings_or_exit, system_state_or_exit,
};
use hpc_access_core::write_snapshot;
use serde_json::json;
use std::path::PathBuf;

pub fn run(config: Option<PathBuf>, kind: SnapshotKind, out: PathBuf, json: bool) {
    let settings = settings_or_exit(config.as_deref());
    let records = match kind {
        SnapshotKind::System => {
            let state = system_state_or_exit(&settings, None);
            write_snapshot(&out, &state).unwrap_or_else(|e| fail(e));
            state.accounts.len() + state.groups.len() + state.directories.len()
        }
        SnapshotKind::Registry => {
            let state = registry_state_or_exit(&settings, None);
            write_snapshot(&out, &state).unwrap_or_else(|e| fail(e));
            state.users.len() + state.groups.len() + state.projects.len()
        }
    };

    if json {
        print_json_or_exit(&json!({
            "kind": kind.as_str(),
            "path": out.display().to_string(),
            "records": records,
        }));
    } else {
        println!(
            "wrote {} snapshot ({records} records) to {}",
            kind.as_str(),
            out.display()
        );
    }
}
