//! Directory-service entities: POSIX accounts and groups.

use crate::field::{Diffable, FieldValue};
use serde::{Deserialize, Serialize};

/// Structured GECOS information of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gecos {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub office_location: Option<String>,
    #[serde(default)]
    pub office_phone: Option<String>,
    #[serde(default)]
    pub home_phone: Option<String>,
    #[serde(default)]
    pub other: Option<String>,
}

impl Gecos {
    /// Parse a comma-separated GECOS string.
    ///
    /// Missing trailing fields, empty fields, and the literal `None` all
    /// parse as absent. The fifth field keeps any further commas.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(5, ',').map(|part| {
            let part = part.trim();
            if part.is_empty() || part == "None" {
                None
            } else {
                Some(part.to_string())
            }
        });
        Self {
            full_name: parts.next().flatten(),
            office_location: parts.next().flatten(),
            office_phone: parts.next().flatten(),
            home_phone: parts.next().flatten(),
            other: parts.next().flatten(),
        }
    }

    /// Render the five fields as a GECOS string.
    pub fn render(&self) -> String {
        [
            &self.full_name,
            &self.office_location,
            &self.office_phone,
            &self.home_phone,
            &self.other,
        ]
        .iter()
        .map(|field| field.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// A login identity in the directory service. Keyed by `uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryAccount {
    pub dn: String,
    pub cn: String,
    /// Login name.
    pub uid: String,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub sn: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    pub uid_number: u32,
    #[serde(default)]
    pub gid_number: Option<u32>,
    pub home_directory: String,
    pub login_shell: String,
    #[serde(default)]
    pub gecos: Option<Gecos>,
    #[serde(default)]
    pub ssh_public_key: Vec<String>,
}

impl DirectoryAccount {
    pub fn is_disabled(&self) -> bool {
        self.login_shell == crate::conventions::LOGIN_SHELL_DISABLED
    }
}

impl Diffable for DirectoryAccount {
    const CLASS: &'static str = "account";

    fn key(&self) -> &str {
        &self.uid
    }

    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("dn", (&self.dn).into()),
            ("cn", (&self.cn).into()),
            ("uid", (&self.uid).into()),
            ("mail", self.mail.as_ref().into()),
            ("sn", self.sn.as_ref().into()),
            ("given_name", self.given_name.as_ref().into()),
            ("uid_number", self.uid_number.into()),
            ("gid_number", self.gid_number.into()),
            ("home_directory", (&self.home_directory).into()),
            ("login_shell", (&self.login_shell).into()),
            ("gecos", self.gecos.as_ref().into()),
            ("ssh_public_key", self.ssh_public_key.as_slice().into()),
        ]
    }
}

/// A POSIX group in the directory service, used for organizational groups
/// and projects alike. Keyed by `cn`.
///
/// Organizational groups keep `member_uids` empty because their members
/// are expressed through the accounts' primary gid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryGroup {
    pub dn: String,
    pub cn: String,
    pub gid_number: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_dn: Option<String>,
    #[serde(default)]
    pub delegate_dns: Vec<String>,
    #[serde(default)]
    pub member_uids: Vec<String>,
}

impl Diffable for DirectoryGroup {
    const CLASS: &'static str = "group";

    fn key(&self) -> &str {
        &self.cn
    }

    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("dn", (&self.dn).into()),
            ("cn", (&self.cn).into()),
            ("gid_number", self.gid_number.into()),
            ("description", self.description.as_ref().into()),
            ("owner_dn", self.owner_dn.as_ref().into()),
            ("delegate_dns", self.delegate_dns.as_slice().into()),
            ("member_uids", self.member_uids.as_slice().into()),
        ]
    }
}
