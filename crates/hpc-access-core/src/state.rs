//! Whole-system snapshots.
//!
//! The same [`SystemState`] shape holds both the current state read from
//! the live systems and the desired state derived from the registry, so a
//! single comparator serves both.

use crate::directory::{DirectoryAccount, DirectoryGroup};
use crate::field::Diffable;
use crate::registry::{RegistryGroup, RegistryProject, RegistryUser};
use crate::storage::StorageDirectory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Directory-service and filesystem entities, each keyed by natural key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(default)]
    pub accounts: BTreeMap<String, DirectoryAccount>,
    #[serde(default)]
    pub groups: BTreeMap<String, DirectoryGroup>,
    #[serde(default)]
    pub directories: BTreeMap<String, StorageDirectory>,
}

impl SystemState {
    /// Index entities by natural key. Later duplicates win.
    pub fn from_entities(
        accounts: impl IntoIterator<Item = DirectoryAccount>,
        groups: impl IntoIterator<Item = DirectoryGroup>,
        directories: impl IntoIterator<Item = StorageDirectory>,
    ) -> Self {
        Self {
            accounts: index(accounts),
            groups: index(groups),
            directories: index(directories),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.groups.is_empty() && self.directories.is_empty()
    }

    /// Largest numeric id among group gids and account primary gids.
    pub fn max_gid(&self) -> Option<u32> {
        self.groups
            .values()
            .map(|group| group.gid_number)
            .chain(self.accounts.values().filter_map(|a| a.gid_number))
            .max()
    }
}

fn index<E: Diffable>(entities: impl IntoIterator<Item = E>) -> BTreeMap<String, E> {
    entities
        .into_iter()
        .map(|entity| (entity.key().to_string(), entity))
        .collect()
}

/// Registry records keyed by their uuid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub users: BTreeMap<Uuid, RegistryUser>,
    #[serde(default)]
    pub groups: BTreeMap<Uuid, RegistryGroup>,
    #[serde(default)]
    pub projects: BTreeMap<Uuid, RegistryProject>,
}

impl RegistryState {
    pub fn from_records(
        users: impl IntoIterator<Item = RegistryUser>,
        groups: impl IntoIterator<Item = RegistryGroup>,
        projects: impl IntoIterator<Item = RegistryProject>,
    ) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.uuid, u)).collect(),
            groups: groups.into_iter().map(|g| (g.uuid, g)).collect(),
            projects: projects.into_iter().map(|p| (p.uuid, p)).collect(),
        }
    }

    pub fn user_by_username(&self, username: &str) -> Option<&RegistryUser> {
        self.users.values().find(|user| user.username == username)
    }
}
