//! Derive the desired system state from the registry.
//!
//! Order matters: group and project gids are settled first, because
//! accounts and directories refer to them.

use crate::conventions::{
    FOLDER_AG_PREFIX, HPC_ALUMNIS_GID, HPC_ALUMNIS_GROUP, HPC_USERS_DESCRIPTION, HPC_USERS_DN,
    HPC_USERS_GID, HPC_USERS_GROUP, LOGIN_SHELL_DEFAULT, LOGIN_SHELL_DISABLED, PERMS_GROUP_DIR,
    PERMS_USER_HOME, POSIX_AG_PREFIX, POSIX_PROJECT_PREFIX, QUOTA_HOME_BYTES, TIB, account_dn,
    group_cn, group_dn, project_cn, project_dn, strip_prefix, user_home,
};
use crate::diagnostics::{Diagnostics, WARNING_CLASS_OWNER_MISSING, WARNING_CLASS_QUOTA_MISSING};
use crate::directory::{DirectoryAccount, DirectoryGroup, Gecos};
use crate::error::{ReconcileError, ReconcileResult};
use crate::registry::{RegistryGroup, RegistryUser, ResourceData};
use crate::state::{RegistryState, SystemState};
use crate::storage::{EntityKind, StorageDirectory, StoragePath, Volume};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Hands out fresh gids for groups and projects within one build.
///
/// A gid is never handed out twice, nor when it has been [claimed](Self::claim).
#[derive(Debug, Clone)]
pub struct GidAllocator {
    next: u32,
    claimed: BTreeSet<u32>,
}

impl GidAllocator {
    /// Seed at one past the largest gid in `current`, or at
    /// [`crate::conventions::FIRST_GID`] when it has none.
    pub fn seeded_from(current: &SystemState) -> Self {
        let next = current
            .max_gid()
            .map_or(crate::conventions::FIRST_GID, |max| max + 1);
        Self {
            next,
            claimed: BTreeSet::new(),
        }
    }

    /// Mark `gid` as held by some record so it is skipped.
    pub fn claim(&mut self, gid: u32) {
        self.claimed.insert(gid);
    }

    /// Next gid [`allocate`](Self::allocate) would return.
    pub fn peek(&self) -> u32 {
        let mut gid = self.next;
        while self.claimed.contains(&gid) {
            gid += 1;
        }
        gid
    }

    pub fn allocate(&mut self) -> u32 {
        let gid = self.peek();
        self.claimed.insert(gid);
        self.next = gid + 1;
        gid
    }
}

/// Result of a build: the desired state plus what was learned on the way.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub state: SystemState,
    pub diagnostics: Diagnostics,
    /// Gid of every registry group and project, by registry uuid.
    pub gids: BTreeMap<Uuid, u32>,
}

/// Derives the desired [`SystemState`] from registry records.
pub struct TargetStateBuilder<'a> {
    registry: &'a RegistryState,
    current: &'a SystemState,
}

/// Owner and gid a shared directory is created with.
struct ShareOwner<'a> {
    user: &'a RegistryUser,
    group_name: String,
    gid: u32,
}

impl<'a> TargetStateBuilder<'a> {
    pub fn new(registry: &'a RegistryState, current: &'a SystemState) -> Self {
        Self { registry, current }
    }

    pub fn build(&self) -> ReconcileResult<BuildOutcome> {
        let mut diagnostics = Diagnostics::new();
        let gids = self.assign_gids();

        let mut groups = self.build_groups(&gids)?;
        let accounts = self.build_accounts(&gids)?;
        groups.insert(HPC_USERS_GROUP.to_string(), active_users_group(&accounts));
        let directories = self.build_directories(&gids, &mut diagnostics)?;

        info!(
            accounts = accounts.len(),
            groups = groups.len(),
            directories = directories.len(),
            "built target state"
        );
        Ok(BuildOutcome {
            state: SystemState {
                accounts,
                groups,
                directories,
            },
            diagnostics,
            gids,
        })
    }

    /// Keep registry gids, reuse gids of groups that already exist under the
    /// same POSIX name, and allocate the rest: groups first, then projects,
    /// each in uuid order. Allocation skips every gid already held.
    fn assign_gids(&self) -> BTreeMap<Uuid, u32> {
        let mut allocator = GidAllocator::seeded_from(self.current);

        let groups = self.registry.groups.values().map(|group| {
            let cn = group_cn(strip_prefix(&group.name, Some(POSIX_AG_PREFIX)));
            (group.uuid, group.gid, cn)
        });
        let projects = self.registry.projects.values().map(|project| {
            let cn = project_cn(strip_prefix(&project.name, Some(POSIX_PROJECT_PREFIX)));
            (project.uuid, project.gid, cn)
        });
        let known: Vec<(Uuid, Option<u32>, String)> = groups
            .chain(projects)
            .map(|(uuid, registry_gid, cn)| {
                let gid =
                    registry_gid.or_else(|| self.current.groups.get(&cn).map(|g| g.gid_number));
                (uuid, gid, cn)
            })
            .collect();

        let held = self
            .current
            .groups
            .values()
            .map(|group| group.gid_number)
            .chain(self.current.accounts.values().filter_map(|a| a.gid_number))
            .chain(known.iter().filter_map(|(_, gid, _)| *gid));
        for gid in held {
            allocator.claim(gid);
        }
        debug!(next_gid = allocator.peek(), "seeded gid allocator");

        let mut gids = BTreeMap::new();
        for (uuid, gid, cn) in known {
            let gid = gid.unwrap_or_else(|| {
                let gid = allocator.allocate();
                info!(%cn, gid, "allocated gid");
                gid
            });
            gids.insert(uuid, gid);
        }
        gids
    }

    fn user(
        &self,
        relation: &'static str,
        from: &str,
        uuid: Uuid,
    ) -> ReconcileResult<&'a RegistryUser> {
        self.registry
            .users
            .get(&uuid)
            .ok_or_else(|| ReconcileError::DanglingReference {
                relation,
                from: from.to_string(),
                target: uuid,
            })
    }

    fn group(
        &self,
        relation: &'static str,
        from: &str,
        uuid: Uuid,
    ) -> ReconcileResult<&'a RegistryGroup> {
        self.registry
            .groups
            .get(&uuid)
            .ok_or_else(|| ReconcileError::DanglingReference {
                relation,
                from: from.to_string(),
                target: uuid,
            })
    }

    fn delegate_dns(&self, from: &str, delegate: Option<Uuid>) -> ReconcileResult<Vec<String>> {
        match delegate {
            Some(uuid) => Ok(vec![user_dn(self.user("delegate", from, uuid)?)]),
            None => Ok(Vec::new()),
        }
    }

    fn build_groups(
        &self,
        gids: &BTreeMap<Uuid, u32>,
    ) -> ReconcileResult<BTreeMap<String, DirectoryGroup>> {
        let mut result = BTreeMap::new();
        for group in self.registry.groups.values() {
            let name = strip_prefix(&group.name, Some(POSIX_AG_PREFIX));
            let owner = self.user("owner", &group.name, group.owner)?;
            let entry = DirectoryGroup {
                dn: group_dn(name),
                cn: group_cn(name),
                gid_number: gids[&group.uuid],
                description: group.description.clone(),
                owner_dn: Some(user_dn(owner)),
                delegate_dns: self.delegate_dns(&group.name, group.delegate)?,
                member_uids: Vec::new(),
            };
            result.insert(entry.cn.clone(), entry);
        }

        for project in self.registry.projects.values() {
            let name = strip_prefix(&project.name, Some(POSIX_PROJECT_PREFIX));
            let owner_dn = match project.group {
                Some(group) => {
                    let group = self.group("group", &project.name, group)?;
                    Some(user_dn(self.user("owner", &group.name, group.owner)?))
                }
                None => None,
            };
            let mut member_uids = project
                .members
                .iter()
                .map(|member| {
                    self.user("member", &project.name, *member)
                        .map(|user| user.username.clone())
                })
                .collect::<ReconcileResult<Vec<_>>>()?;
            member_uids.sort();
            member_uids.dedup();
            let entry = DirectoryGroup {
                dn: project_dn(name),
                cn: project_cn(name),
                gid_number: gids[&project.uuid],
                description: project.description.clone(),
                owner_dn,
                delegate_dns: self.delegate_dns(&project.name, project.delegate)?,
                member_uids,
            };
            result.insert(entry.cn.clone(), entry);
        }
        Ok(result)
    }

    /// Gid and POSIX group name of a user's primary group.
    fn primary_group(
        &self,
        user: &RegistryUser,
        gids: &BTreeMap<Uuid, u32>,
    ) -> ReconcileResult<(String, u32)> {
        match user.primary_group {
            Some(uuid) => {
                let group = self.group("primary_group", &user.username, uuid)?;
                let name = strip_prefix(&group.name, Some(POSIX_AG_PREFIX));
                Ok((group_cn(name), gids[&uuid]))
            }
            None => Ok((HPC_ALUMNIS_GROUP.to_string(), HPC_ALUMNIS_GID)),
        }
    }

    fn build_accounts(
        &self,
        gids: &BTreeMap<Uuid, u32>,
    ) -> ReconcileResult<BTreeMap<String, DirectoryAccount>> {
        let mut result = BTreeMap::new();
        for user in self.registry.users.values() {
            let (_, gid) = self.primary_group(user, gids)?;
            let login_shell = if user.status.is_retired() {
                LOGIN_SHELL_DISABLED
            } else {
                LOGIN_SHELL_DEFAULT
            };
            let entry = DirectoryAccount {
                dn: user_dn(user),
                cn: user.full_name.clone(),
                uid: user.username.clone(),
                mail: user.email.clone(),
                sn: user.last_name.clone(),
                given_name: user.first_name.clone(),
                uid_number: user.uid,
                gid_number: Some(gid),
                home_directory: user_home(&user.username),
                login_shell: login_shell.to_string(),
                gecos: Some(Gecos {
                    full_name: Some(user.full_name.clone()),
                    office_phone: user.phone_number.clone(),
                    ..Gecos::default()
                }),
                // Keys are maintained in the upstream directory.
                ssh_public_key: Vec::new(),
            };
            result.insert(entry.uid.clone(), entry);
        }
        Ok(result)
    }

    fn build_directories(
        &self,
        gids: &BTreeMap<Uuid, u32>,
        diagnostics: &mut Diagnostics,
    ) -> ReconcileResult<BTreeMap<String, StorageDirectory>> {
        let mut result = BTreeMap::new();

        for user in self.registry.users.values() {
            let (group_name, group_gid) = self.primary_group(user, gids)?;
            let path = user_home(&user.username);
            result.insert(
                path.clone(),
                StorageDirectory {
                    path,
                    owner_name: user.username.clone(),
                    owner_uid: user.uid,
                    group_name,
                    group_gid,
                    perms: PERMS_USER_HOME.to_string(),
                    rbytes: None,
                    rfiles: None,
                    quota_bytes: Some(QUOTA_HOME_BYTES),
                    quota_files: None,
                },
            );
        }

        for group in self.registry.groups.values() {
            let name = strip_prefix(&group.name, Some(POSIX_AG_PREFIX));
            let owner = ShareOwner {
                user: self.user("owner", &group.name, group.owner)?,
                group_name: group_cn(name),
                gid: gids[&group.uuid],
            };
            share_directories(
                EntityKind::Groups,
                &format!("{FOLDER_AG_PREFIX}{name}"),
                &owner,
                group.resources_requested.unwrap_or_default(),
                &mut result,
                diagnostics,
            );
        }

        for project in self.registry.projects.values() {
            let Some(group) = project.group else {
                diagnostics.warn(
                    WARNING_CLASS_OWNER_MISSING,
                    &project.name,
                    "project has no owning group, skipping its directories",
                );
                continue;
            };
            let group = self.group("group", &project.name, group)?;
            let name = strip_prefix(&project.name, Some(POSIX_PROJECT_PREFIX));
            let owner = ShareOwner {
                user: self.user("owner", &group.name, group.owner)?,
                group_name: project_cn(name),
                gid: gids[&project.uuid],
            };
            share_directories(
                EntityKind::Projects,
                name,
                &owner,
                project.resources_requested.unwrap_or_default(),
                &mut result,
                diagnostics,
            );
        }
        Ok(result)
    }
}

/// Tier-1 home/scratch/work plus any requested tier-2 directories of a
/// group or project. Nothing is emitted unless both tier-1 work and
/// scratch quotas were requested.
fn share_directories(
    entity: EntityKind,
    folder: &str,
    owner: &ShareOwner<'_>,
    requested: ResourceData,
    out: &mut BTreeMap<String, StorageDirectory>,
    diagnostics: &mut Diagnostics,
) {
    if requested.tier1_work <= 0.0 || requested.tier1_scratch <= 0.0 {
        diagnostics.warn(
            WARNING_CLASS_QUOTA_MISSING,
            &owner.group_name,
            "no tier-1 work and scratch quota requested, skipping its directories",
        );
        return;
    }

    let tier1 = [
        (Volume::Home, Some(QUOTA_HOME_BYTES)),
        (Volume::Scratch, Some(tb_to_bytes(requested.tier1_scratch))),
        (Volume::Work, Some(tb_to_bytes(requested.tier1_work))),
    ];
    let tier2 = [
        (Volume::Mirrored, requested.tier2_mirrored),
        (Volume::Unmirrored, requested.tier2_unmirrored),
    ]
    .into_iter()
    .filter(|(_, tb)| *tb > 0.0)
    .map(|(volume, tb)| (volume, Some(tb_to_bytes(tb))));

    for (volume, quota_bytes) in tier1.into_iter().chain(tier2) {
        let path = StoragePath::new(volume, entity, folder).to_string();
        out.insert(
            path.clone(),
            StorageDirectory {
                path,
                owner_name: owner.user.username.clone(),
                owner_uid: owner.user.uid,
                group_name: owner.group_name.clone(),
                group_gid: owner.gid,
                perms: PERMS_GROUP_DIR.to_string(),
                rbytes: None,
                rfiles: None,
                quota_bytes,
                quota_files: None,
            },
        );
    }
}

/// The computed group of everyone allowed to log in.
fn active_users_group(accounts: &BTreeMap<String, DirectoryAccount>) -> DirectoryGroup {
    DirectoryGroup {
        dn: HPC_USERS_DN.to_string(),
        cn: HPC_USERS_GROUP.to_string(),
        gid_number: HPC_USERS_GID,
        description: Some(HPC_USERS_DESCRIPTION.to_string()),
        owner_dn: None,
        delegate_dns: Vec::new(),
        member_uids: accounts
            .values()
            .filter(|a| a.gid_number != Some(HPC_ALUMNIS_GID) && !a.is_disabled())
            .map(|a| a.uid.clone())
            .collect(),
    }
}

fn user_dn(user: &RegistryUser) -> String {
    account_dn(&user.username, &user.full_name)
}

/// Convert a registry quota in TB to bytes.
pub fn tb_to_bytes(tb: f64) -> u64 {
    (tb * TIB as f64).round() as u64
}
