use serde_json::{Value, json};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

const ALICE: &str = "00000000-0000-0000-0000-000000000001";
const DOE: &str = "00000000-0000-0000-0000-000000000011";
const ALICE_DN: &str = "cn=Alice Doe,ou=Charite,ou=Users,dc=hpc,dc=bihealth,dc=org";
const FIVE_TIB: u64 = 5 * 1024 * 1024 * 1024 * 1024;

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "hpc-access-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_hpc_access<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_hpc-access");
    Command::new(bin)
        .args(args)
        .env_remove("HPC_ACCESS_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("hpc-access command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn write_json(path: &Path, value: &Value) {
    fs::write(
        path,
        serde_json::to_string_pretty(value).expect("fixture should serialize"),
    )
    .expect("fixture should be written");
}

/// An empty settings file, so no test picks up a host configuration.
fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, "dry_run = false\n").expect("config should be written");
    path
}

fn registry_fixture() -> Value {
    json!({
        "users": {
            ALICE: {
                "uuid": ALICE,
                "primary_group": DOE,
                "full_name": "Alice Doe",
                "first_name": "Alice",
                "last_name": "Doe",
                "email": "alice@example.org",
                "status": "ACTIVE",
                "uid": 2001,
                "username": "alice_c",
                "expiration": "2030-01-01T00:00:00Z"
            }
        },
        "groups": {
            DOE: {
                "uuid": DOE,
                "owner": ALICE,
                "status": "ACTIVE",
                "gid": 5000,
                "name": "doe",
                "expiration": "2030-01-01T00:00:00Z",
                "resources_requested": {"tier1_work": 1.0, "tier1_scratch": 1.0}
            }
        },
        "projects": {}
    })
}

fn system_fixture() -> Value {
    let scratch = "/data/cephfs-1/scratch/groups/ag-doe";
    json!({
        "accounts": {
            "alice_c": {
                "dn": ALICE_DN,
                "cn": "Alice Doe",
                "uid": "alice_c",
                "uid_number": 2001,
                "gid_number": 5000,
                "home_directory": "/data/cephfs-1/home/users/alice_c",
                "login_shell": "/usr/bin/bash"
            }
        },
        "groups": {
            "hpc-ag-doe": {
                "dn": "cn=hpc-ag-doe,ou=Teams,ou=Groups,dc=hpc,dc=bihealth,dc=org",
                "cn": "hpc-ag-doe",
                "gid_number": 5000,
                "owner_dn": ALICE_DN
            }
        },
        "directories": {
            scratch: {
                "path": scratch,
                "owner_name": "alice_c",
                "owner_uid": 2001,
                "group_name": "hpc-ag-doe",
                "group_gid": 5000,
                "perms": "drwxrwS---",
                "rbytes": FIVE_TIB,
                "quota_bytes": 1099511627776u64
            }
        }
    })
}

struct Fixtures {
    _dir: TempDirGuard,
    config: PathBuf,
    registry: PathBuf,
    system: PathBuf,
    empty_system: PathBuf,
}

fn fixtures(prefix: &str) -> Fixtures {
    let dir = TempDirGuard::new(prefix);
    let config = write_config(dir.path());
    let registry = dir.path().join("registry.json");
    let system = dir.path().join("system.json");
    let empty_system = dir.path().join("empty-system.json");
    write_json(&registry, &registry_fixture());
    write_json(&system, &system_fixture());
    write_json(&empty_system, &json!({}));
    Fixtures {
        _dir: dir,
        config,
        registry,
        system,
        empty_system,
    }
}

fn has_op(ops: &Value, operation: &str, field: &str, key: &str) -> bool {
    ops.as_array()
        .expect("operation list")
        .iter()
        .any(|op| op["operation"] == operation && op["entity"][field] == key)
}

#[test]
fn state_sync_plans_creates_for_an_empty_cluster() {
    let f = fixtures("plan");
    let output = run_hpc_access([
        OsStr::new("state-sync"),
        OsStr::new("--config"),
        f.config.as_os_str(),
        OsStr::new("--system-snapshot"),
        f.empty_system.as_os_str(),
        OsStr::new("--registry-snapshot"),
        f.registry.as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_success(&output);
    let body = parse_json_stdout(&output);

    let ops = &body["operations"];
    assert!(has_op(&ops["groups"], "CREATE", "cn", "hpc-ag-doe"));
    assert!(has_op(&ops["groups"], "CREATE", "cn", "hpc-users"));
    assert!(has_op(&ops["accounts"], "CREATE", "uid", "alice_c"));
    assert!(has_op(
        &ops["directories"],
        "CREATE",
        "path",
        "/data/cephfs-1/home/users/alice_c"
    ));
    assert!(has_op(
        &ops["directories"],
        "CREATE",
        "path",
        "/data/cephfs-1/work/groups/ag-doe"
    ));

    let report = &body["report"];
    assert_eq!(report["dryRun"], true);
    assert_eq!(report["filtered"], 0);
    let actions = report["actions"].as_array().expect("actions");
    assert!(actions.iter().any(|a| {
        a.as_str()
            .is_some_and(|a| a.starts_with("ldapadd cn=hpc-ag-doe,"))
    }));
    assert!(actions.iter().any(|a| {
        a.as_str()
            .is_some_and(|a| a.starts_with("mkdir -v -p -m"))
    }));
}

#[test]
fn state_sync_filters_operation_kinds() {
    let f = fixtures("filter");
    let output = run_hpc_access([
        OsStr::new("state-sync"),
        OsStr::new("--config"),
        f.config.as_os_str(),
        OsStr::new("--system-snapshot"),
        f.empty_system.as_os_str(),
        OsStr::new("--registry-snapshot"),
        f.registry.as_os_str(),
        OsStr::new("--account-ops"),
        OsStr::new("update,disable"),
        OsStr::new("--group-ops"),
        OsStr::new("UPDATE"),
        OsStr::new("--directory-ops"),
        OsStr::new("disable"),
        OsStr::new("--json"),
    ]);
    assert_success(&output);
    let report = &parse_json_stdout(&output)["report"];
    assert_eq!(report["applied"], 0);
    assert!(report["filtered"].as_u64().expect("filtered count") >= 5);
    assert!(report["actions"].as_array().expect("actions").is_empty());
}

#[test]
fn state_sync_rejects_unknown_operation_kind() {
    let f = fixtures("bad-op");
    let output = run_hpc_access([
        OsStr::new("state-sync"),
        OsStr::new("--config"),
        f.config.as_os_str(),
        OsStr::new("--account-ops"),
        OsStr::new("delete"),
    ]);
    assert_failure(&output);
}

#[test]
fn state_sync_refuses_to_apply_against_a_snapshot() {
    let f = fixtures("live-snapshot");
    let output = run_hpc_access([
        OsStr::new("state-sync"),
        OsStr::new("--config"),
        f.config.as_os_str(),
        OsStr::new("--system-snapshot"),
        f.system.as_os_str(),
        OsStr::new("--registry-snapshot"),
        f.registry.as_os_str(),
        OsStr::new("--dry-run"),
        OsStr::new("false"),
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("error: --system-snapshot"));
}

#[test]
fn storage_usage_sync_folds_scratch_usage_without_pushing() {
    let f = fixtures("usage");
    let output = run_hpc_access([
        OsStr::new("storage-usage-sync"),
        OsStr::new("--config"),
        f.config.as_os_str(),
        OsStr::new("--system-snapshot"),
        f.system.as_os_str(),
        OsStr::new("--registry-snapshot"),
        f.registry.as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_success(&output);
    let body = parse_json_stdout(&output);
    assert_eq!(body["dryRun"], true);
    assert_eq!(body["pushed"], 0);
    assert!(stderr_text(&output).contains("+ PATCH adminsec/api/hpcgroup/"));
    let groups = body["groups"].as_array().expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], "doe");
    assert_eq!(groups[0]["resources_used"]["tier1_scratch"], 5.0);
    assert_eq!(groups[0]["resources_used"]["tier1_work"], 0.0);
    assert!(body["users"].as_array().expect("users").is_empty());
}

#[test]
fn state_dump_renders_registry_records() {
    let f = fixtures("dump");
    let output = run_hpc_access([
        OsStr::new("state-dump"),
        OsStr::new("--config"),
        f.config.as_os_str(),
        OsStr::new("--system-snapshot"),
        f.system.as_os_str(),
    ]);
    assert_success(&output);
    let body = parse_json_stdout(&output);
    let users: Vec<&Value> = body["users"].as_object().expect("users").values().collect();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["username"], "alice_c");
    assert_eq!(users[0]["status"], "ACTIVE");
    let groups: Vec<&Value> = body["groups"].as_object().expect("groups").values().collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], "doe");
    assert_eq!(groups[0]["owner"], users[0]["uuid"]);
}

#[test]
fn missing_snapshot_file_fails_with_error_line() {
    let f = fixtures("missing");
    let output = run_hpc_access([
        OsStr::new("state-dump"),
        OsStr::new("--config"),
        f.config.as_os_str(),
        OsStr::new("--system-snapshot"),
        f.config.with_file_name("absent.json").as_os_str(),
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("error:"));
}

#[test]
fn explicit_missing_config_fails() {
    let output = run_hpc_access([
        "state-dump",
        "--config",
        "/nonexistent/hpc-access/config.json",
        "--system-snapshot",
        "/nonexistent/system.json",
    ]);
    assert_failure(&output);
    assert!(stderr_text(&output).contains("does not exist"));
}
