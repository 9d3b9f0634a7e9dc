//! Storage directories and the path convention that names them.
//!
//! ```text
//! /data/cephfs-1/{home,work,scratch}/{users,groups,projects}/<folder>
//! /data/cephfs-2/{mirrored,unmirrored}/{groups,projects}/<folder>
//! ```

use crate::conventions::{BASE_PATH_TIER1, BASE_PATH_TIER2};
use crate::field::{Diffable, FieldValue};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Fields an update may touch. Path and observed usage are never updated.
pub const DIRECTORY_MUTABLE_FIELDS: &[&str] = &[
    "owner_name",
    "owner_uid",
    "group_name",
    "group_gid",
    "perms",
    "quota_bytes",
    "quota_files",
];

/// A quota-managed directory on one of the storage tiers. Keyed by `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDirectory {
    pub path: String,
    pub owner_name: String,
    pub owner_uid: u32,
    pub group_name: String,
    pub group_gid: u32,
    /// `ls -l` style permission string, e.g. `drwxrwS---`.
    pub perms: String,
    /// Observed recursive byte count; absent until measured.
    #[serde(default)]
    pub rbytes: Option<u64>,
    /// Observed recursive file count; absent until measured.
    #[serde(default)]
    pub rfiles: Option<u64>,
    /// Byte quota; absent means unlimited.
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    /// File-count quota; absent means unlimited.
    #[serde(default)]
    pub quota_files: Option<u64>,
}

impl Diffable for StorageDirectory {
    const CLASS: &'static str = "directory";

    fn key(&self) -> &str {
        &self.path
    }

    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("path", (&self.path).into()),
            ("owner_name", (&self.owner_name).into()),
            ("owner_uid", self.owner_uid.into()),
            ("group_name", (&self.group_name).into()),
            ("group_gid", self.group_gid.into()),
            ("perms", (&self.perms).into()),
            ("rbytes", self.rbytes.into()),
            ("rfiles", self.rfiles.into()),
            ("quota_bytes", self.quota_bytes.into()),
            ("quota_files", self.quota_files.into()),
        ]
    }
}

/// Storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Cephfs1,
    Cephfs2,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cephfs1 => "cephfs-1",
            Tier::Cephfs2 => "cephfs-2",
        }
    }

    pub fn base_path(&self) -> &'static str {
        match self {
            Tier::Cephfs1 => BASE_PATH_TIER1,
            Tier::Cephfs2 => BASE_PATH_TIER2,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cephfs-1" => Some(Tier::Cephfs1),
            "cephfs-2" => Some(Tier::Cephfs2),
            _ => None,
        }
    }
}

/// Subdirectory kind below a tier base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volume {
    Home,
    Work,
    Scratch,
    Mirrored,
    Unmirrored,
}

impl Volume {
    pub fn as_str(&self) -> &'static str {
        match self {
            Volume::Home => "home",
            Volume::Work => "work",
            Volume::Scratch => "scratch",
            Volume::Mirrored => "mirrored",
            Volume::Unmirrored => "unmirrored",
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            Volume::Home | Volume::Work | Volume::Scratch => Tier::Cephfs1,
            Volume::Mirrored | Volume::Unmirrored => Tier::Cephfs2,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "home" => Some(Volume::Home),
            "work" => Some(Volume::Work),
            "scratch" => Some(Volume::Scratch),
            "mirrored" => Some(Volume::Mirrored),
            "unmirrored" => Some(Volume::Unmirrored),
            _ => None,
        }
    }
}

/// Kind of registry entity a directory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Users,
    Groups,
    Projects,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Groups => "groups",
            EntityKind::Projects => "projects",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "users" => Some(EntityKind::Users),
            "groups" => Some(EntityKind::Groups),
            "projects" => Some(EntityKind::Projects),
            _ => None,
        }
    }
}

/// Registry usage field a directory's byte count is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageField {
    Tier1Home,
    Tier1Work,
    Tier1Scratch,
    Tier2Mirrored,
    Tier2Unmirrored,
}

impl UsageField {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageField::Tier1Home => "tier1_home",
            UsageField::Tier1Work => "tier1_work",
            UsageField::Tier1Scratch => "tier1_scratch",
            UsageField::Tier2Mirrored => "tier2_mirrored",
            UsageField::Tier2Unmirrored => "tier2_unmirrored",
        }
    }
}

/// Parsed form of a managed storage path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath {
    pub tier: Tier,
    pub volume: Volume,
    pub entity: EntityKind,
    pub folder: String,
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/(?P<tier>cephfs-[12])/(?P<subdir>[^/]+)/(?P<entity>[^/]+)/(?P<name>[^/]+)/?$")
            .expect("storage path regex must compile")
    })
}

/// Why a path could not be parsed as a managed storage path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoragePathError {
    #[error("no match for path {0}")]
    Unmatched(String),

    #[error("unknown subdirectory '{subdir}' in {path}")]
    UnknownVolume { path: String, subdir: String },

    #[error("entity unknown (users/groups/projects): {entity} in {path}")]
    UnknownEntity { path: String, entity: String },

    #[error("subdirectory {volume} does not live on {tier} in {path}")]
    WrongTier {
        path: String,
        tier: &'static str,
        volume: &'static str,
    },
}

impl StoragePath {
    pub fn new(volume: Volume, entity: EntityKind, folder: impl Into<String>) -> Self {
        Self {
            tier: volume.tier(),
            volume,
            entity,
            folder: folder.into(),
        }
    }

    /// Parse the trailing `<tier>/<subdir>/<entity>/<folder>` of `path`.
    ///
    /// Leading components are ignored so that relocated mount points parse
    /// the same way.
    pub fn parse(path: &str) -> Result<Self, StoragePathError> {
        let caps = path_re()
            .captures(path)
            .ok_or_else(|| StoragePathError::Unmatched(path.to_string()))?;
        let tier = Tier::parse(&caps["tier"])
            .ok_or_else(|| StoragePathError::Unmatched(path.to_string()))?;
        let volume =
            Volume::parse(&caps["subdir"]).ok_or_else(|| StoragePathError::UnknownVolume {
                path: path.to_string(),
                subdir: caps["subdir"].to_string(),
            })?;
        let entity =
            EntityKind::parse(&caps["entity"]).ok_or_else(|| StoragePathError::UnknownEntity {
                path: path.to_string(),
                entity: caps["entity"].to_string(),
            })?;
        if volume.tier() != tier {
            return Err(StoragePathError::WrongTier {
                path: path.to_string(),
                tier: tier.as_str(),
                volume: volume.as_str(),
            });
        }
        Ok(Self {
            tier,
            volume,
            entity,
            folder: caps["name"].to_string(),
        })
    }

    /// The usage field this directory reports into, if it is tracked.
    pub fn usage_field(&self) -> Option<UsageField> {
        match (self.volume, self.entity) {
            (Volume::Home, EntityKind::Users) => Some(UsageField::Tier1Home),
            (Volume::Work, EntityKind::Groups | EntityKind::Projects) => Some(UsageField::Tier1Work),
            (Volume::Scratch, EntityKind::Groups | EntityKind::Projects) => {
                Some(UsageField::Tier1Scratch)
            }
            (Volume::Mirrored, EntityKind::Groups | EntityKind::Projects) => {
                Some(UsageField::Tier2Mirrored)
            }
            (Volume::Unmirrored, EntityKind::Groups | EntityKind::Projects) => {
                Some(UsageField::Tier2Unmirrored)
            }
            _ => None,
        }
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.tier.base_path(),
            self.volume.as_str(),
            self.entity.as_str(),
            self.folder
        )
    }
}
