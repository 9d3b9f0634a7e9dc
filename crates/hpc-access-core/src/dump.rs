//! Convert live directory and filesystem state into registry records.
//!
//! Used to seed a fresh registry from an existing cluster. Uuids are
//! generated, so two dumps of the same state differ in identifiers only.

use crate::conventions::{
    FOLDER_AG_PREFIX, GIB, POSIX_AG_PREFIX, POSIX_PROJECT_PREFIX, TIB, strip_prefix,
};
use crate::diagnostics::{Diagnostics, WARNING_CLASS_DUMP_SKIPPED};
use crate::directory::{DirectoryAccount, DirectoryGroup};
use crate::registry::{
    GroupFolders, RegistryGroup, RegistryProject, RegistryUser, ResourceData, ResourceDataUser,
    Status,
};
use crate::state::{RegistryState, SystemState};
use crate::storage::{EntityKind, StoragePath, UsageField, Volume};
use crate::usage::{classify, entity_name};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

/// Registry-shaped view of the system plus skipped records.
#[derive(Debug, Clone)]
pub struct DumpOutcome {
    pub state: RegistryState,
    pub diagnostics: Diagnostics,
}

struct Index<'a> {
    system: &'a SystemState,
    user_uuids: BTreeMap<&'a str, Uuid>,
    user_by_dn: BTreeMap<&'a str, &'a DirectoryAccount>,
    group_uuids: BTreeMap<&'a str, Uuid>,
    group_by_gid: BTreeMap<u32, &'a DirectoryGroup>,
}

impl<'a> Index<'a> {
    fn new(system: &'a SystemState) -> Self {
        Self {
            system,
            user_uuids: system
                .accounts
                .keys()
                .map(|uid| (uid.as_str(), Uuid::new_v4()))
                .collect(),
            user_by_dn: system
                .accounts
                .values()
                .map(|account| (account.dn.as_str(), account))
                .collect(),
            group_uuids: system
                .groups
                .keys()
                .filter(|cn| cn.starts_with(POSIX_AG_PREFIX) || cn.starts_with(POSIX_PROJECT_PREFIX))
                .map(|cn| (cn.as_str(), Uuid::new_v4()))
                .collect(),
            group_by_gid: system
                .groups
                .values()
                .map(|group| (group.gid_number, group))
                .collect(),
        }
    }

    fn user_uuid_by_dn(&self, dn: &str) -> Option<Uuid> {
        self.user_by_dn
            .get(dn)
            .and_then(|account| self.user_uuids.get(account.uid.as_str()))
            .copied()
    }

    /// Registry uuid of the organizational group with this gid.
    fn group_uuid_by_gid(&self, gid: u32) -> Option<Uuid> {
        self.group_by_gid
            .get(&gid)
            .filter(|group| group.cn.starts_with(POSIX_AG_PREFIX))
            .and_then(|group| self.group_uuids.get(group.cn.as_str()))
            .copied()
    }
}

/// Requested quotas recovered from the directories' byte quotas.
#[derive(Default)]
struct Quotas {
    users: BTreeMap<String, ResourceDataUser>,
    shares: BTreeMap<(EntityKind, String), ResourceData>,
}

impl Quotas {
    fn collect(system: &SystemState, diagnostics: &mut Diagnostics) -> Self {
        let mut quotas = Self::default();
        for directory in system.directories.values() {
            let Some((path, field)) = classify(directory, diagnostics) else {
                continue;
            };
            let bytes = directory.quota_bytes.unwrap_or(0) as f64;
            let name = entity_name(&path).to_string();
            match field {
                UsageField::Tier1Home => {
                    quotas.users.entry(name).or_default().tier1_home = bytes / GIB as f64;
                }
                share => {
                    let data = quotas.shares.entry((path.entity, name)).or_default();
                    let tb = bytes / TIB as f64;
                    match share {
                        UsageField::Tier1Work => data.tier1_work = tb,
                        UsageField::Tier1Scratch => data.tier1_scratch = tb,
                        UsageField::Tier2Mirrored => data.tier2_mirrored = tb,
                        UsageField::Tier2Unmirrored => data.tier2_unmirrored = tb,
                        UsageField::Tier1Home => {}
                    }
                }
            }
        }
        quotas
    }
}

/// Build registry records from `system`, dated relative to `now`.
pub fn dump_registry_state(system: &SystemState, now: DateTime<Utc>) -> DumpOutcome {
    let mut diagnostics = Diagnostics::new();
    let index = Index::new(system);
    let quotas = Quotas::collect(system, &mut diagnostics);
    let mut state = RegistryState::default();

    for account in system.accounts.values() {
        let user = dump_user(account, &index, &quotas, now);
        state.users.insert(user.uuid, user);
    }
    for group in system.groups.values() {
        if group.cn.starts_with(POSIX_AG_PREFIX) {
            if let Some(record) = dump_group(group, &index, &quotas, now, &mut diagnostics) {
                state.groups.insert(record.uuid, record);
            }
        } else if group.cn.starts_with(POSIX_PROJECT_PREFIX) {
            if let Some(record) = dump_project(group, &index, &quotas, now, &mut diagnostics) {
                state.projects.insert(record.uuid, record);
            }
        }
    }
    info!(
        users = state.users.len(),
        groups = state.groups.len(),
        projects = state.projects.len(),
        skipped = diagnostics.len(),
        "dumped registry state"
    );
    DumpOutcome { state, diagnostics }
}

fn dump_user(
    account: &DirectoryAccount,
    index: &Index<'_>,
    quotas: &Quotas,
    now: DateTime<Utc>,
) -> RegistryUser {
    let (status, expiration) = if account.is_disabled() {
        (Status::Expired, now)
    } else {
        (Status::Active, now + Duration::days(365))
    };
    RegistryUser {
        uuid: index.user_uuids[account.uid.as_str()],
        primary_group: account
            .gid_number
            .and_then(|gid| index.group_uuid_by_gid(gid)),
        description: None,
        email: account.mail.clone(),
        full_name: account.cn.clone(),
        first_name: account.given_name.clone(),
        last_name: account.sn.clone(),
        phone_number: account
            .gecos
            .as_ref()
            .and_then(|gecos| gecos.office_phone.clone()),
        resources_requested: Some(quotas.users.get(&account.uid).copied().unwrap_or_default()),
        resources_used: Some(ResourceDataUser::default()),
        status,
        uid: account.uid_number,
        username: account.uid.clone(),
        expiration,
        home_directory: account.home_directory.clone(),
        login_shell: account.login_shell.clone(),
        current_version: 1,
    }
}

fn folders(entity: EntityKind, folder: &str) -> GroupFolders {
    let path = |volume| StoragePath::new(volume, entity, folder).to_string();
    GroupFolders {
        tier1_work: path(Volume::Work),
        tier1_scratch: path(Volume::Scratch),
        tier2_mirrored: path(Volume::Mirrored),
        tier2_unmirrored: path(Volume::Unmirrored),
    }
}

/// Owner uuid of a group or project, or a warning when it cannot be
/// resolved.
fn owner_uuid(
    group: &DirectoryGroup,
    index: &Index<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<Uuid> {
    let Some(owner_dn) = group.owner_dn.as_deref() else {
        diagnostics.warn(WARNING_CLASS_DUMP_SKIPPED, &group.cn, "no owner DN, skipping");
        return None;
    };
    let owner = index.user_uuid_by_dn(owner_dn);
    if owner.is_none() {
        diagnostics.warn(
            WARNING_CLASS_DUMP_SKIPPED,
            &group.cn,
            format!("owner {owner_dn} is not a known account, skipping"),
        );
    }
    owner
}

fn delegate_uuid(group: &DirectoryGroup, index: &Index<'_>) -> Option<Uuid> {
    group
        .delegate_dns
        .first()
        .and_then(|dn| index.user_uuid_by_dn(dn))
}

fn dump_group(
    group: &DirectoryGroup,
    index: &Index<'_>,
    quotas: &Quotas,
    now: DateTime<Utc>,
    diagnostics: &mut Diagnostics,
) -> Option<RegistryGroup> {
    let owner = owner_uuid(group, index, diagnostics)?;
    let name = strip_prefix(&group.cn, Some(POSIX_AG_PREFIX));
    Some(RegistryGroup {
        uuid: index.group_uuids[group.cn.as_str()],
        owner,
        description: group.description.clone(),
        delegate: delegate_uuid(group, index),
        resources_requested: Some(
            quotas
                .shares
                .get(&(EntityKind::Groups, name.to_string()))
                .copied()
                .unwrap_or_default(),
        ),
        resources_used: Some(ResourceData::default()),
        status: Status::Active,
        gid: Some(group.gid_number),
        name: name.to_string(),
        folders: folders(EntityKind::Groups, &format!("{FOLDER_AG_PREFIX}{name}")),
        expiration: now + Duration::days(365),
        current_version: 1,
    })
}

fn dump_project(
    project: &DirectoryGroup,
    index: &Index<'_>,
    quotas: &Quotas,
    now: DateTime<Utc>,
    diagnostics: &mut Diagnostics,
) -> Option<RegistryProject> {
    owner_uuid(project, index, diagnostics)?;
    let name = strip_prefix(&project.cn, Some(POSIX_PROJECT_PREFIX));
    let owning_group = project
        .owner_dn
        .as_deref()
        .and_then(|dn| index.user_by_dn.get(dn))
        .and_then(|owner| owner.gid_number)
        .and_then(|gid| index.group_uuid_by_gid(gid));

    let mut members = Vec::new();
    for uid in &project.member_uids {
        match index.user_uuids.get(uid.trim()) {
            Some(uuid) => members.push(*uuid),
            None => diagnostics.warn(
                WARNING_CLASS_DUMP_SKIPPED,
                &project.cn,
                format!("member {uid} is not a known account, dropping it"),
            ),
        }
    }

    Some(RegistryProject {
        uuid: index.group_uuids[project.cn.as_str()],
        group: owning_group,
        description: project.description.clone(),
        delegate: delegate_uuid(project, index),
        resources_requested: Some(
            quotas
                .shares
                .get(&(EntityKind::Projects, name.to_string()))
                .copied()
                .unwrap_or_default(),
        ),
        resources_used: Some(ResourceData::default()),
        status: Status::Active,
        gid: Some(project.gid_number),
        name: name.to_string(),
        folders: folders(EntityKind::Projects, name),
        expiration: now + Duration::days(365),
        current_version: 1,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conventions::LOGIN_SHELL_DISABLED;
    use crate::fixtures::{account, directory, group};

    fn system() -> SystemState {
        let alice = account("alice", Some(1100));
        let mut bob = account("bob", None);
        bob.login_shell = LOGIN_SHELL_DISABLED.to_string();

        let mut foo = group("hpc-ag-foo", 1100);
        foo.owner_dn = Some(alice.dn.clone());
        let mut atlas = group("hpc-prj-atlas", 1200);
        atlas.owner_dn = Some(alice.dn.clone());
        atlas.member_uids = vec!["alice".into(), "bob".into(), "ghost".into()];
        let ownerless = group("hpc-ag-ownerless", 1300);

        let mut work = directory("/data/cephfs-1/work/groups/ag-foo", "alice", "hpc-ag-foo", 1100);
        work.quota_bytes = Some(3 * TIB);
        let mut home = directory("/data/cephfs-1/home/users/alice", "alice", "hpc-ag-foo", 1100);
        home.quota_bytes = Some(GIB);

        SystemState::from_entities(
            [alice, bob],
            [foo, atlas, ownerless, group("hpc-users", 1_005_269)],
            [work, home],
        )
    }

    #[test]
    fn dump_links_users_groups_and_projects() {
        let now = DateTime::<Utc>::default();
        let outcome = dump_registry_state(&system(), now);
        let state = &outcome.state;

        let alice = state
            .user_by_username("alice")
            .expect("alice should be dumped");
        let bob = state.user_by_username("bob").expect("bob should be dumped");
        assert_eq!(alice.status, Status::Active);
        assert_eq!(alice.expiration, now + Duration::days(365));
        assert_eq!(alice.resources_requested, Some(ResourceDataUser { tier1_home: 1.0 }));
        assert_eq!(bob.status, Status::Expired);
        assert_eq!(bob.primary_group, None);

        assert_eq!(state.groups.len(), 1);
        let foo = state.groups.values().next().expect("one group");
        assert_eq!(foo.name, "foo");
        assert_eq!(foo.owner, alice.uuid);
        assert_eq!(alice.primary_group, Some(foo.uuid));
        assert_eq!(foo.resources_requested.map(|r| r.tier1_work), Some(3.0));
        assert_eq!(foo.folders.tier1_work, "/data/cephfs-1/work/groups/ag-foo");

        let atlas = state.projects.values().next().expect("one project");
        assert_eq!(atlas.group, Some(foo.uuid));
        assert_eq!(atlas.members, vec![alice.uuid, bob.uuid]);

        let skipped: Vec<&str> = outcome
            .diagnostics
            .of_class(WARNING_CLASS_DUMP_SKIPPED)
            .map(|finding| finding.subject.as_str())
            .collect();
        assert_eq!(skipped, vec!["hpc-ag-ownerless", "hpc-prj-atlas"]);
    }
}
