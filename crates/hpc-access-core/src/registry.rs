//! Records owned by the hpc-access registry.
//!
//! The registry is authoritative. Reconciliation only reads these records,
//! except for `resources_used`, which the usage fold writes back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Initial,
    Active,
    Deleted,
    Expired,
}

impl Status {
    /// Whether accounts in this status must not be able to log in.
    pub fn is_retired(&self) -> bool {
        matches!(self, Status::Deleted | Status::Expired)
    }
}

/// Storage request or usage of a group or project, in TB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceData {
    pub tier1_work: f64,
    pub tier1_scratch: f64,
    pub tier2_mirrored: f64,
    pub tier2_unmirrored: f64,
}

/// Storage request or usage of a user, in GB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceDataUser {
    pub tier1_home: f64,
}

/// Folder paths the registry records for a group or project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupFolders {
    pub tier1_work: String,
    pub tier1_scratch: String,
    pub tier2_mirrored: String,
    pub tier2_unmirrored: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryUser {
    pub uuid: Uuid,
    #[serde(default)]
    pub primary_group: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub full_name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub resources_requested: Option<ResourceDataUser>,
    #[serde(default)]
    pub resources_used: Option<ResourceDataUser>,
    pub status: Status,
    pub uid: u32,
    pub username: String,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub home_directory: String,
    #[serde(default)]
    pub login_shell: String,
    #[serde(default)]
    pub current_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryGroup {
    pub uuid: Uuid,
    pub owner: Uuid,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub delegate: Option<Uuid>,
    #[serde(default)]
    pub resources_requested: Option<ResourceData>,
    #[serde(default)]
    pub resources_used: Option<ResourceData>,
    pub status: Status,
    #[serde(default)]
    pub gid: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub folders: GroupFolders,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub current_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryProject {
    pub uuid: Uuid,
    /// Owning group; the owner of that group owns the project.
    #[serde(default)]
    pub group: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub delegate: Option<Uuid>,
    #[serde(default)]
    pub resources_requested: Option<ResourceData>,
    #[serde(default)]
    pub resources_used: Option<ResourceData>,
    pub status: Status,
    #[serde(default)]
    pub gid: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub folders: GroupFolders,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub current_version: u32,
    #[serde(default)]
    pub members: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_parses_from_registry_payload() {
        let user: RegistryUser = serde_json::from_value(serde_json::json!({
            "uuid": "4e1f0c3a-8d55-4b5e-9a53-6c1d1b0d2f10",
            "primary_group": null,
            "full_name": "Alice Doe",
            "status": "ACTIVE",
            "uid": 2001,
            "username": "alice_c",
            "expiration": "2030-01-01T00:00:00Z",
            "resources_requested": {"tier1_home": 1.0}
        }))
        .expect("user payload should parse");
        assert_eq!(user.status, Status::Active);
        assert_eq!(user.primary_group, None);
        assert_eq!(user.resources_requested.map(|r| r.tier1_home), Some(1.0));
        assert_eq!(user.current_version, 0);
    }

    #[test]
    fn resource_data_fills_missing_tiers_with_zero() {
        let data: ResourceData = serde_json::from_str(r#"{"tier1_work": 2.5}"#)
            .expect("partial resources should parse");
        assert_eq!(data.tier1_work, 2.5);
        assert_eq!(data.tier2_unmirrored, 0.0);
    }

    #[test]
    fn retired_statuses() {
        assert!(Status::Expired.is_retired());
        assert!(Status::Deleted.is_retired());
        assert!(!Status::Initial.is_retired());
        assert!(!Status::Active.is_retired());
    }
}
