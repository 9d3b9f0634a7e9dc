//! Fixed naming, path, and quota conventions of the cluster.
//!
//! These values are shared by the target-state builder (which produces
//! names and paths) and the usage fold (which parses them back).

/// POSIX name prefix for organizational groups.
pub const POSIX_AG_PREFIX: &str = "hpc-ag-";
/// POSIX name prefix for projects.
pub const POSIX_PROJECT_PREFIX: &str = "hpc-prj-";
/// Folder name prefix for organizational groups on the storage tiers.
pub const FOLDER_AG_PREFIX: &str = "ag-";

pub const BASE_DN_GROUPS: &str = "ou=Teams,ou=Groups,dc=hpc,dc=bihealth,dc=org";
pub const BASE_DN_PROJECTS: &str = "ou=Projects,ou=Groups,dc=hpc,dc=bihealth,dc=org";
pub const BASE_DN_CHARITE: &str = "ou=Charite,ou=Users,dc=hpc,dc=bihealth,dc=org";
pub const BASE_DN_MDC: &str = "ou=MDC,ou=Users,dc=hpc,dc=bihealth,dc=org";

/// Login names with this suffix live below [`BASE_DN_MDC`].
pub const MDC_LOGIN_SUFFIX: &str = "_m";

pub const BASE_PATH_TIER1: &str = "/data/cephfs-1";
pub const BASE_PATH_TIER2: &str = "/data/cephfs-2";

pub const GIB: u64 = 1024 * 1024 * 1024;
pub const TIB: u64 = 1024 * GIB;

/// Byte quota on every home directory (1 GiB).
pub const QUOTA_HOME_BYTES: u64 = GIB;

pub const HPC_ALUMNIS_GROUP: &str = "hpc-alumnis";
pub const HPC_ALUMNIS_GID: u32 = 1_030_001;

pub const HPC_USERS_GROUP: &str = "hpc-users";
pub const HPC_USERS_GID: u32 = 1_005_269;
pub const HPC_USERS_DN: &str = "cn=hpc-users,ou=Groups,dc=hpc,dc=bihealth,dc=org";
pub const HPC_USERS_DESCRIPTION: &str = "users allowed to login (active+have group)";

pub const LOGIN_SHELL_DEFAULT: &str = "/usr/bin/bash";
pub const LOGIN_SHELL_DISABLED: &str = "/usr/sbin/nologin";

pub const PERMS_USER_HOME: &str = "drwx--S---";
pub const PERMS_GROUP_DIR: &str = "drwxrwS---";

/// First gid handed out when the current state carries no numeric ids.
pub const FIRST_GID: u32 = 1000;

pub const XATTR_QUOTA_BYTES: &str = "ceph.quota.max_bytes";
pub const XATTR_QUOTA_FILES: &str = "ceph.quota.max_files";
pub const XATTR_USAGE_BYTES: &str = "ceph.dir.rbytes";
pub const XATTR_USAGE_FILES: &str = "ceph.dir.rfiles";

/// Object classes for newly created accounts.
pub const ACCOUNT_OBJECT_CLASSES: &[&str] = &[
    "inetOrgPerson",
    "posixAccount",
    "ldapPublicKey",
    "bih-expireDates",
    "top",
];

/// Object classes for newly created groups and projects.
pub const GROUP_OBJECT_CLASSES: &[&str] = &["posixGroup", "bih-groupExtensions", "top"];

/// Strip `prefix` from `name`, or any known POSIX group prefix when `None`.
pub fn strip_prefix<'a>(name: &'a str, prefix: Option<&str>) -> &'a str {
    match prefix {
        Some(prefix) => name.strip_prefix(prefix).unwrap_or(name),
        None => name
            .strip_prefix(POSIX_AG_PREFIX)
            .or_else(|| name.strip_prefix(POSIX_PROJECT_PREFIX))
            .unwrap_or(name),
    }
}

/// Distinguished name of an account from its login and full name.
pub fn account_dn(login: &str, full_name: &str) -> String {
    let base = if login.ends_with(MDC_LOGIN_SUFFIX) {
        BASE_DN_MDC
    } else {
        BASE_DN_CHARITE
    };
    format!("cn={full_name},{base}")
}

pub fn group_cn(name: &str) -> String {
    format!("{POSIX_AG_PREFIX}{name}")
}

pub fn group_dn(name: &str) -> String {
    format!("cn={},{BASE_DN_GROUPS}", group_cn(name))
}

pub fn project_cn(name: &str) -> String {
    format!("{POSIX_PROJECT_PREFIX}{name}")
}

pub fn project_dn(name: &str) -> String {
    format!("cn={},{BASE_DN_PROJECTS}", project_cn(name))
}

pub fn user_home(login: &str) -> String {
    format!("{BASE_PATH_TIER1}/home/users/{login}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_prefix_handles_known_and_explicit_prefixes() {
        assert_eq!(strip_prefix("hpc-ag-foo", None), "foo");
        assert_eq!(strip_prefix("hpc-prj-bar", None), "bar");
        assert_eq!(strip_prefix("hpc-prj-bar", Some(POSIX_AG_PREFIX)), "hpc-prj-bar");
        assert_eq!(strip_prefix("plain", None), "plain");
    }

    #[test]
    fn account_dn_depends_on_login_suffix() {
        assert_eq!(
            account_dn("alice_m", "Alice Doe"),
            "cn=Alice Doe,ou=MDC,ou=Users,dc=hpc,dc=bihealth,dc=org"
        );
        assert_eq!(
            account_dn("alice_c", "Alice Doe"),
            "cn=Alice Doe,ou=Charite,ou=Users,dc=hpc,dc=bihealth,dc=org"
        );
    }
}
