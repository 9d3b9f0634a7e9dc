//! Contracts of the external systems and the gatherers built on them.

use crate::directory::{DirectoryAccount, DirectoryGroup};
use crate::error::{ReconcileError, ReconcileResult};
use crate::registry::{
    RegistryGroup, RegistryProject, RegistryUser, ResourceData, ResourceDataUser,
};
use crate::state::{RegistryState, SystemState};
use crate::storage::StorageDirectory;
use crate::usage::UsageFold;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

pub const SYSTEM_DIRECTORY: &str = "directory service";
pub const SYSTEM_FILESYSTEM: &str = "filesystem";
pub const SYSTEM_REGISTRY: &str = "registry";

/// Registry endpoints, relative to the server URL.
pub const USERS_ENDPOINT: &str = "adminsec/api/hpcuser/";
pub const GROUPS_ENDPOINT: &str = "adminsec/api/hpcgroup/";
pub const PROJECTS_ENDPOINT: &str = "adminsec/api/hpcproject/";

/// Reader errors convert into [`ReconcileError`] so adapters decide which
/// failures are integrity errors and which are plain collaborator failures.
pub trait DirectoryReader {
    type Error: Into<ReconcileError>;

    fn list_accounts(&mut self) -> Result<Vec<DirectoryAccount>, Self::Error>;
    fn list_groups(&mut self) -> Result<Vec<DirectoryGroup>, Self::Error>;
}

pub trait FilesystemReader {
    type Error: Into<ReconcileError>;

    /// All managed directories, with quota and usage attributes.
    fn list_directories(&mut self) -> Result<Vec<StorageDirectory>, Self::Error>;
}

pub trait RegistryReader {
    type Error: Into<ReconcileError>;

    fn list_users(&mut self) -> Result<Vec<RegistryUser>, Self::Error>;
    fn list_groups(&mut self) -> Result<Vec<RegistryGroup>, Self::Error>;
    fn list_projects(&mut self) -> Result<Vec<RegistryProject>, Self::Error>;
}

pub trait RegistryWriter {
    type Error: std::error::Error + Send + Sync + 'static;

    fn update_user_resources_used(
        &mut self,
        uuid: Uuid,
        used: &ResourceDataUser,
    ) -> Result<(), Self::Error>;
    fn update_group_resources_used(
        &mut self,
        uuid: Uuid,
        used: &ResourceData,
    ) -> Result<(), Self::Error>;
    fn update_project_resources_used(
        &mut self,
        uuid: Uuid,
        used: &ResourceData,
    ) -> Result<(), Self::Error>;
}

/// Read the current state of the directory service and the filesystem.
pub fn gather_system_state<D, F>(
    directory: &mut D,
    filesystem: &mut F,
) -> ReconcileResult<SystemState>
where
    D: DirectoryReader,
    F: FilesystemReader,
{
    let accounts = directory.list_accounts().map_err(Into::<ReconcileError>::into)?;
    let groups = directory.list_groups().map_err(Into::<ReconcileError>::into)?;
    let directories = filesystem.list_directories().map_err(Into::<ReconcileError>::into)?;
    info!(
        accounts = accounts.len(),
        groups = groups.len(),
        directories = directories.len(),
        "gathered system state"
    );
    Ok(SystemState::from_entities(accounts, groups, directories))
}

/// Fetch every user, group, and project record from the registry.
pub fn gather_registry_state<R: RegistryReader>(
    registry: &mut R,
) -> ReconcileResult<RegistryState> {
    let users = registry.list_users().map_err(Into::<ReconcileError>::into)?;
    let groups = registry.list_groups().map_err(Into::<ReconcileError>::into)?;
    let projects = registry.list_projects().map_err(Into::<ReconcileError>::into)?;
    info!(
        users = users.len(),
        groups = groups.len(),
        projects = projects.len(),
        "gathered registry state"
    );
    Ok(RegistryState::from_records(users, groups, projects))
}

/// The registry request that writes `used` back to one record.
fn render_patch<T: Serialize>(endpoint: &str, uuid: Uuid, used: &T) -> String {
    format!("PATCH {endpoint}{uuid}/ {}", json!({ "resources_used": used }))
}

/// Push the usage of every record the fold changed. Each write is logged on
/// the `audit` target first; under `dry_run` nothing reaches `writer`.
/// Returns the number of records written.
pub fn push_usage<W: RegistryWriter>(
    writer: &mut W,
    registry: &RegistryState,
    fold: &UsageFold,
    dry_run: bool,
) -> ReconcileResult<usize> {
    let wrap = |err: W::Error| ReconcileError::collaborator(SYSTEM_REGISTRY, err);
    let mut pushed = 0;
    for uuid in &fold.users {
        if let Some(used) = registry.users.get(uuid).and_then(|u| u.resources_used.as_ref()) {
            info!(target: "audit", "+ {}", render_patch(USERS_ENDPOINT, *uuid, used));
            if !dry_run {
                writer.update_user_resources_used(*uuid, used).map_err(wrap)?;
                pushed += 1;
            }
        }
    }
    for uuid in &fold.groups {
        if let Some(used) = registry.groups.get(uuid).and_then(|g| g.resources_used.as_ref()) {
            info!(target: "audit", "+ {}", render_patch(GROUPS_ENDPOINT, *uuid, used));
            if !dry_run {
                writer.update_group_resources_used(*uuid, used).map_err(wrap)?;
                pushed += 1;
            }
        }
    }
    for uuid in &fold.projects {
        if let Some(used) = registry.projects.get(uuid).and_then(|p| p.resources_used.as_ref()) {
            info!(target: "audit", "+ {}", render_patch(PROJECTS_ENDPOINT, *uuid, used));
            if !dry_run {
                writer.update_project_resources_used(*uuid, used).map_err(wrap)?;
                pushed += 1;
            }
        }
    }
    Ok(pushed)
}
