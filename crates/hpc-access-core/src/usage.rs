//! Fold observed directory usage into registry records.
//!
//! This flow does not go through the comparator: each current directory
//! is matched against the path convention, resolved to its registry record
//! by name, and its byte count is written into `resources_used`.

use crate::conventions::{
    FOLDER_AG_PREFIX, GIB, POSIX_AG_PREFIX, POSIX_PROJECT_PREFIX, TIB, strip_prefix,
};
use crate::diagnostics::{
    Diagnostics, WARNING_CLASS_NAME_MISMATCH, WARNING_CLASS_PATH_UNMATCHED,
    WARNING_CLASS_PATH_UNTRACKED, WARNING_CLASS_REGISTRY_MISSING, WARNING_CLASS_USAGE_UNMEASURED,
};
use crate::registry::{ResourceData, ResourceDataUser};
use crate::state::{RegistryState, SystemState};
use crate::storage::{EntityKind, StorageDirectory, StoragePath, UsageField};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Records whose usage changed, and everything that was skipped.
#[derive(Debug, Clone, Default)]
pub struct UsageFold {
    pub users: BTreeSet<Uuid>,
    pub groups: BTreeSet<Uuid>,
    pub projects: BTreeSet<Uuid>,
    pub diagnostics: Diagnostics,
}

impl UsageFold {
    /// Number of records with changed usage.
    pub fn changed(&self) -> usize {
        self.users.len() + self.groups.len() + self.projects.len()
    }
}

/// Fold the byte counts of `system`'s directories into `registry`.
///
/// Users are reported in GB (bytes / 2^30), groups and projects in TB
/// (bytes / 2^40). Usage fields without a matching directory keep their
/// previous value.
pub fn fold_usage(registry: &mut RegistryState, system: &SystemState) -> UsageFold {
    let mut fold = UsageFold::default();
    let users = name_index(registry.users.values().map(|u| (u.username.as_str(), u.uuid)));
    let groups = name_index(registry.groups.values().map(|g| (g.name.as_str(), g.uuid)));
    let projects = name_index(registry.projects.values().map(|p| (p.name.as_str(), p.uuid)));

    for directory in system.directories.values() {
        let Some((path, field)) = classify(directory, &mut fold.diagnostics) else {
            continue;
        };
        let Some(rbytes) = directory.rbytes else {
            fold.diagnostics.warn(
                WARNING_CLASS_USAGE_UNMEASURED,
                &directory.path,
                "directory has no observed byte count",
            );
            continue;
        };
        let name = entity_name(&path);
        let index = match path.entity {
            EntityKind::Users => &users,
            EntityKind::Groups => &groups,
            EntityKind::Projects => &projects,
        };
        let Some(uuid) = index.get(name).copied() else {
            fold.diagnostics.warn(
                WARNING_CLASS_REGISTRY_MISSING,
                &directory.path,
                format!("folder not present in registry: {}/{name}", path.entity.as_str()),
            );
            continue;
        };

        let changed = match path.entity {
            EntityKind::Users => registry.users.get_mut(&uuid).is_some_and(|user| {
                let before = user.resources_used;
                let used = user
                    .resources_used
                    .get_or_insert_with(ResourceDataUser::default);
                used.tier1_home = rbytes as f64 / GIB as f64;
                before != user.resources_used
            }),
            EntityKind::Groups => registry.groups.get_mut(&uuid).is_some_and(|group| {
                set_share_usage(&mut group.resources_used, field, rbytes)
            }),
            EntityKind::Projects => registry.projects.get_mut(&uuid).is_some_and(|project| {
                set_share_usage(&mut project.resources_used, field, rbytes)
            }),
        };
        debug!(path = %directory.path, field = field.as_str(), changed, "folded usage");
        if changed {
            match path.entity {
                EntityKind::Users => fold.users.insert(uuid),
                EntityKind::Groups => fold.groups.insert(uuid),
                EntityKind::Projects => fold.projects.insert(uuid),
            };
        }
    }
    info!(
        changed = fold.changed(),
        skipped = fold.diagnostics.len(),
        "folded storage usage"
    );
    fold
}

/// Parse the path and check that the folder name agrees with the
/// directory's owner or group.
pub(crate) fn classify(
    directory: &StorageDirectory,
    diagnostics: &mut Diagnostics,
) -> Option<(StoragePath, UsageField)> {
    let path = match StoragePath::parse(&directory.path) {
        Ok(path) => path,
        Err(err) => {
            diagnostics.warn(WARNING_CLASS_PATH_UNMATCHED, &directory.path, err.to_string());
            return None;
        }
    };
    let Some(field) = path.usage_field() else {
        diagnostics.warn(
            WARNING_CLASS_PATH_UNTRACKED,
            &directory.path,
            "path is not mapped to a usage field",
        );
        return None;
    };
    let recorded = match path.entity {
        EntityKind::Users => directory.owner_name.as_str(),
        EntityKind::Groups => strip_prefix(&directory.group_name, Some(POSIX_AG_PREFIX)),
        EntityKind::Projects => strip_prefix(&directory.group_name, Some(POSIX_PROJECT_PREFIX)),
    };
    if recorded != entity_name(&path) {
        diagnostics.warn(
            WARNING_CLASS_NAME_MISMATCH,
            &directory.path,
            format!("name mismatch: folder {} belongs to {recorded}", path.folder),
        );
        return None;
    }
    Some((path, field))
}

/// Registry name the folder stands for.
pub(crate) fn entity_name(path: &StoragePath) -> &str {
    match path.entity {
        EntityKind::Groups => strip_prefix(&path.folder, Some(FOLDER_AG_PREFIX)),
        EntityKind::Users | EntityKind::Projects => &path.folder,
    }
}

fn set_share_usage(used: &mut Option<ResourceData>, field: UsageField, rbytes: u64) -> bool {
    let before = *used;
    let data = used.get_or_insert_with(ResourceData::default);
    let tb = rbytes as f64 / TIB as f64;
    match field {
        UsageField::Tier1Work => data.tier1_work = tb,
        UsageField::Tier1Scratch => data.tier1_scratch = tb,
        UsageField::Tier2Mirrored => data.tier2_mirrored = tb,
        UsageField::Tier2Unmirrored => data.tier2_unmirrored = tb,
        UsageField::Tier1Home => return false,
    }
    before != *used
}

fn name_index<'a>(entries: impl Iterator<Item = (&'a str, Uuid)>) -> BTreeMap<String, Uuid> {
    entries.map(|(name, uuid)| (name.to_string(), uuid)).collect()
}
