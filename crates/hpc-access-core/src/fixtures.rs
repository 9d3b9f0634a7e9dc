//! Record constructors shared by unit tests.

use crate::conventions::{LOGIN_SHELL_DEFAULT, PERMS_GROUP_DIR, user_home};
use crate::directory::{DirectoryAccount, DirectoryGroup};
use crate::registry::{
    GroupFolders, RegistryGroup, RegistryProject, RegistryUser, ResourceData, Status,
};
use crate::storage::StorageDirectory;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn registry_user(n: u128, username: &str, primary_group: Option<u128>) -> RegistryUser {
    RegistryUser {
        uuid: id(n),
        primary_group: primary_group.map(id),
        description: None,
        email: Some(format!("{username}@example.org")),
        full_name: format!("User {username}"),
        first_name: Some("User".to_string()),
        last_name: Some(username.to_string()),
        phone_number: None,
        resources_requested: None,
        resources_used: None,
        status: Status::Active,
        uid: 2000 + n as u32,
        username: username.to_string(),
        expiration: DateTime::<Utc>::default(),
        home_directory: String::new(),
        login_shell: String::new(),
        current_version: 1,
    }
}

pub fn resources(work: f64, scratch: f64, mirrored: f64, unmirrored: f64) -> ResourceData {
    ResourceData {
        tier1_work: work,
        tier1_scratch: scratch,
        tier2_mirrored: mirrored,
        tier2_unmirrored: unmirrored,
    }
}

pub fn registry_group(n: u128, name: &str, owner: u128, gid: Option<u32>) -> RegistryGroup {
    RegistryGroup {
        uuid: id(n),
        owner: id(owner),
        description: Some(format!("group {name}")),
        delegate: None,
        resources_requested: Some(resources(1.0, 1.0, 0.0, 0.0)),
        resources_used: None,
        status: Status::Active,
        gid,
        name: name.to_string(),
        folders: GroupFolders::default(),
        expiration: DateTime::<Utc>::default(),
        current_version: 1,
    }
}

pub fn registry_project(
    n: u128,
    name: &str,
    group: Option<u128>,
    members: &[u128],
    gid: Option<u32>,
) -> RegistryProject {
    RegistryProject {
        uuid: id(n),
        group: group.map(id),
        description: Some(format!("project {name}")),
        delegate: None,
        resources_requested: Some(resources(1.0, 1.0, 0.0, 0.0)),
        resources_used: None,
        status: Status::Active,
        gid,
        name: name.to_string(),
        folders: GroupFolders::default(),
        expiration: DateTime::<Utc>::default(),
        current_version: 1,
        members: members.iter().copied().map(id).collect(),
    }
}

pub fn account(uid: &str, gid: Option<u32>) -> DirectoryAccount {
    DirectoryAccount {
        dn: format!("cn={uid},ou=Charite,ou=Users,dc=hpc,dc=bihealth,dc=org"),
        cn: uid.to_string(),
        uid: uid.to_string(),
        mail: None,
        sn: None,
        given_name: None,
        uid_number: 3000,
        gid_number: gid,
        home_directory: user_home(uid),
        login_shell: LOGIN_SHELL_DEFAULT.to_string(),
        gecos: None,
        ssh_public_key: Vec::new(),
    }
}

pub fn group(cn: &str, gid: u32) -> DirectoryGroup {
    DirectoryGroup {
        dn: format!("cn={cn},ou=Teams,ou=Groups,dc=hpc,dc=bihealth,dc=org"),
        cn: cn.to_string(),
        gid_number: gid,
        description: None,
        owner_dn: None,
        delegate_dns: Vec::new(),
        member_uids: Vec::new(),
    }
}

pub fn directory(path: &str, owner: &str, group: &str, gid: u32) -> StorageDirectory {
    StorageDirectory {
        path: path.to_string(),
        owner_name: owner.to_string(),
        owner_uid: 3000,
        group_name: group.to_string(),
        group_gid: gid,
        perms: PERMS_GROUP_DIR.to_string(),
        rbytes: None,
        rfiles: None,
        quota_bytes: None,
        quota_files: None,
    }
}
