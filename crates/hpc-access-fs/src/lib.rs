//! CephFS adapter for the managed storage directories.
//!
//! This crate is thin: it walks the five volume roots, shells out to `stat`
//! and `getfattr` to observe each directory, and runs the command behind
//! every [`FsAction`] it is asked to execute.

use hpc_access_core::collaborators::SYSTEM_FILESYSTEM;
use hpc_access_core::conventions::{
    XATTR_QUOTA_BYTES, XATTR_QUOTA_FILES, XATTR_USAGE_BYTES, XATTR_USAGE_FILES,
};
use hpc_access_core::{
    FilesystemReader, FilesystemWriter, FsAction, ReconcileError, StorageDirectory, Volume,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

const VOLUMES: [Volume; 5] = [
    Volume::Home,
    Volume::Work,
    Volume::Scratch,
    Volume::Mirrored,
    Volume::Unmirrored,
];

/// Errors from observing or changing the filesystem.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("{program} executable is not available in PATH")]
    NotInstalled { program: String },

    #[error("command failed: {command} ({message})")]
    CommandFailed { command: String, message: String },

    #[error("unable to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("unable to parse {what} output: {output}")]
    Parse { what: &'static str, output: String },
}

impl From<FsError> for ReconcileError {
    fn from(err: FsError) -> Self {
        ReconcileError::collaborator(SYSTEM_FILESYSTEM, err)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FsConfig {
    /// Prepended to every managed path, e.g. a mount of the cluster storage
    /// on a workstation. Empty on the cluster itself.
    #[serde(default)]
    pub root_prefix: String,
}

/// Ownership and mode as reported by `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub owner_name: String,
    pub owner_uid: u32,
    pub group_name: String,
    pub group_gid: u32,
    pub perms: String,
}

/// The managed CephFS trees, optionally below a root prefix.
#[derive(Debug, Clone, Default)]
pub struct CephFs {
    root_prefix: String,
}

impl CephFs {
    pub fn new(config: &FsConfig) -> Self {
        Self {
            root_prefix: config.root_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root_prefix(&self) -> &str {
        &self.root_prefix
    }

    /// Volume roots as seen on this host.
    fn volume_roots(&self) -> Vec<PathBuf> {
        VOLUMES
            .iter()
            .map(|volume| {
                PathBuf::from(format!(
                    "{}{}/{}",
                    self.root_prefix,
                    volume.tier().base_path(),
                    volume.as_str()
                ))
            })
            .collect()
    }

    /// Host path back to the cluster path the rest of the system uses.
    fn logical_path(&self, host_path: &Path) -> String {
        let rendered = host_path.to_string_lossy().into_owned();
        if self.root_prefix.is_empty() {
            return rendered;
        }
        rendered
            .strip_prefix(self.root_prefix.as_str())
            .map(str::to_string)
            .unwrap_or(rendered.clone())
    }

    fn observe(&self, host_path: &Path) -> Result<StorageDirectory, FsError> {
        let path = host_path.to_string_lossy().into_owned();
        let stat = run_command("stat", &["-c", "%U:%u:%G:%g:%A", path.as_str()])?;
        let ownership = parse_stat(&stat)?;
        Ok(StorageDirectory {
            path: self.logical_path(host_path),
            owner_name: ownership.owner_name,
            owner_uid: ownership.owner_uid,
            group_name: ownership.group_name,
            group_gid: ownership.group_gid,
            perms: ownership.perms,
            rbytes: read_xattr(&path, XATTR_USAGE_BYTES)?,
            rfiles: read_xattr(&path, XATTR_USAGE_FILES)?,
            quota_bytes: read_xattr(&path, XATTR_QUOTA_BYTES)?,
            quota_files: read_xattr(&path, XATTR_QUOTA_FILES)?,
        })
    }
}

impl FilesystemReader for CephFs {
    type Error = FsError;

    fn list_directories(&mut self) -> Result<Vec<StorageDirectory>, FsError> {
        let mut directories = Vec::new();
        for root in self.volume_roots() {
            for host_path in managed_paths(&root)? {
                directories.push(self.observe(&host_path)?);
            }
        }
        directories.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(directories)
    }
}

impl FilesystemWriter for CephFs {
    type Error = FsError;

    fn execute(&mut self, action: &FsAction) -> Result<(), FsError> {
        let argv = action.relocated(&self.root_prefix).argv();
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = run_command(program, &args)?;
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            debug!(program = %program, "{line}");
        }
        Ok(())
    }
}

/// Directories two levels below `root` (`<entity>/<folder>`). A missing root
/// yields nothing.
pub fn managed_paths(root: &Path) -> Result<Vec<PathBuf>, FsError> {
    if !root.is_dir() {
        debug!(root = %root.display(), "volume root absent, skipping");
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entity in subdirectories(root)? {
        paths.extend(subdirectories(&entity)?);
    }
    paths.sort();
    Ok(paths)
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, FsError> {
    let io_error = |err: std::io::Error| FsError::Io {
        path: dir.display().to_string(),
        message: err.to_string(),
    };
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_dir() {
            found.push(path);
        }
    }
    Ok(found)
}

/// Parse `stat -c %U:%u:%G:%g:%A` output.
pub fn parse_stat(output: &str) -> Result<Ownership, FsError> {
    let parse_error = || FsError::Parse {
        what: "stat",
        output: output.trim().to_string(),
    };
    let line = first_nonempty_line(output).ok_or_else(parse_error)?;
    let fields: Vec<&str> = line.splitn(5, ':').collect();
    let [owner_name, owner_uid, group_name, group_gid, perms] = fields.as_slice() else {
        return Err(parse_error());
    };
    Ok(Ownership {
        owner_name: owner_name.to_string(),
        owner_uid: owner_uid.parse().map_err(|_| parse_error())?,
        group_name: group_name.to_string(),
        group_gid: group_gid.parse().map_err(|_| parse_error())?,
        perms: perms.to_string(),
    })
}

/// Parse the value printed by `getfattr --only-values`.
pub fn parse_xattr_value(output: &str) -> Result<u64, FsError> {
    output.trim().parse().map_err(|_| FsError::Parse {
        what: "getfattr",
        output: output.trim().to_string(),
    })
}

fn read_xattr(path: &str, attribute: &str) -> Result<Option<u64>, FsError> {
    match run_command(
        "getfattr",
        &["--only-values", "--absolute-names", "-n", attribute, path],
    ) {
        Ok(output) => parse_xattr_value(&output).map(Some),
        Err(FsError::CommandFailed { message, .. }) if is_missing_attribute(&message) => Ok(None),
        Err(err) => Err(err),
    }
}

fn is_missing_attribute(message: &str) -> bool {
    message.contains("No such attribute") || message.contains("No data available")
}

fn run_command(program: &str, args: &[&str]) -> Result<String, FsError> {
    let command = || format!("{program} {}", args.join(" "));
    let output = Command::new(program).args(args).output().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            FsError::NotInstalled {
                program: program.to_string(),
            }
        } else {
            FsError::CommandFailed {
                command: command(),
                message: err.to_string(),
            }
        }
    })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            "unknown error".to_string()
        } else {
            stderr
        };
        Err(FsError::CommandFailed {
            command: command(),
            message,
        })
    }
}

fn first_nonempty_line(input: &str) -> Option<&str> {
    input.lines().map(str::trim).find(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempDirGuard(PathBuf);

    impl TempDirGuard {
        fn new(label: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "hpc-access-fs-{label}-{}-{}",
                std::process::id(),
                NEXT_DIR.fetch_add(1, Ordering::SeqCst)
            ));
            std::fs::create_dir_all(&dir).expect("temp dir should be created");
            Self(dir)
        }
    }

    impl Drop for TempDirGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn parse_stat_reads_all_fields() {
        let ownership = parse_stat("alice_c:2001:hpc-ag-doe:1007:drwxrwS---\n")
            .expect("stat output should parse");
        assert_eq!(
            ownership,
            Ownership {
                owner_name: "alice_c".to_string(),
                owner_uid: 2001,
                group_name: "hpc-ag-doe".to_string(),
                group_gid: 1007,
                perms: "drwxrwS---".to_string(),
            }
        );
    }

    #[test]
    fn parse_stat_rejects_short_or_non_numeric_output() {
        assert!(parse_stat("alice_c:2001:hpc-ag-doe").is_err());
        assert!(parse_stat("alice_c:x:hpc-ag-doe:1007:drwx------").is_err());
        assert!(parse_stat("\n").is_err());
    }

    #[test]
    fn xattr_values_are_trimmed_integers() {
        assert_eq!(parse_xattr_value("1099511627776").expect("number"), 1 << 40);
        assert_eq!(parse_xattr_value(" 0\n").expect("number"), 0);
        assert!(parse_xattr_value("lots").is_err());
    }

    #[test]
    fn missing_attribute_messages_are_recognised() {
        assert!(is_missing_attribute(
            "/data/cephfs-1/work/groups/ag-doe: ceph.quota.max_bytes: No such attribute"
        ));
        assert!(!is_missing_attribute("Permission denied"));
    }

    #[test]
    fn logical_path_strips_root_prefix() {
        let fs = CephFs::new(&FsConfig {
            root_prefix: "/data/sshfs/".to_string(),
        });
        assert_eq!(fs.root_prefix(), "/data/sshfs");
        assert_eq!(
            fs.logical_path(Path::new("/data/sshfs/data/cephfs-1/home/users/alice_c")),
            "/data/cephfs-1/home/users/alice_c"
        );
        let bare = CephFs::default();
        assert_eq!(
            bare.logical_path(Path::new("/data/cephfs-1/home/users/alice_c")),
            "/data/cephfs-1/home/users/alice_c"
        );
    }

    #[test]
    fn volume_roots_cover_both_tiers() {
        let fs = CephFs::new(&FsConfig {
            root_prefix: "/mnt".to_string(),
        });
        let roots: Vec<String> = fs
            .volume_roots()
            .iter()
            .map(|root| root.display().to_string())
            .collect();
        assert_eq!(
            roots,
            vec![
                "/mnt/data/cephfs-1/home",
                "/mnt/data/cephfs-1/work",
                "/mnt/data/cephfs-1/scratch",
                "/mnt/data/cephfs-2/mirrored",
                "/mnt/data/cephfs-2/unmirrored",
            ]
        );
    }

    #[test]
    fn managed_paths_lists_two_levels_of_directories() {
        let tmp = TempDirGuard::new("walk");
        let root = tmp.0.join("work");
        std::fs::create_dir_all(root.join("groups/ag-doe")).expect("mkdir");
        std::fs::create_dir_all(root.join("projects/x/nested")).expect("mkdir");
        std::fs::write(root.join("groups/README"), "not a directory").expect("write");

        let paths = managed_paths(&root).expect("walk should succeed");
        assert_eq!(
            paths,
            vec![root.join("groups/ag-doe"), root.join("projects/x")]
        );
        assert!(
            managed_paths(&tmp.0.join("missing"))
                .expect("missing root is fine")
                .is_empty()
        );
    }

    #[test]
    fn config_defaults_to_no_prefix() {
        let config: FsConfig = serde_json::from_str("{}").expect("config should parse");
        assert_eq!(config.root_prefix, "");
    }
}
