//! LDAP adapter for the directory service.
//!
//! Reads POSIX accounts and groups below one search base and executes the
//! primitive [`DirectoryAction`]s the executor produces. Uses the blocking
//! `ldap3` connection; reconciliation is a sequential batch.

mod entry;

pub use entry::{account_from_attrs, group_from_attrs};

use hpc_access_core::collaborators::SYSTEM_DIRECTORY;
use hpc_access_core::{
    AttributeChange, DirectoryAccount, DirectoryAction, DirectoryGroup, DirectoryReader,
    DirectoryWriter, ReconcileError,
};
use ldap3::{LdapConn, LdapConnSettings, LdapResult, Mod, Scope, SearchEntry};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

pub const ACCOUNT_FILTER: &str = "(&(objectClass=posixAccount)(uid=*))";
pub const GROUP_FILTER: &str = "(&(objectClass=posixGroup)(cn=*))";

const ACCOUNT_ATTRIBUTES: &[&str] = &[
    "cn",
    "uid",
    "mail",
    "sn",
    "givenName",
    "uidNumber",
    "gidNumber",
    "homeDirectory",
    "loginShell",
    "gecos",
    "sshPublicKey",
];

const GROUP_ATTRIBUTES: &[&str] = &[
    "cn",
    "gidNumber",
    "description",
    "bih-groupOwnerDN",
    "bih-groupDelegateDNs",
    "memberUid",
];

fn default_port() -> u16 {
    389
}

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for the directory service.
#[derive(Clone, Deserialize)]
pub struct LdapConfig {
    pub server_host: String,
    #[serde(default = "default_port")]
    pub server_port: u16,
    pub bind_dn: String,
    #[serde(default)]
    pub bind_pw: String,
    pub search_base: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LdapConfig {
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.server_host, self.server_port)
    }
}

impl fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConfig")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("bind_dn", &self.bind_dn)
            .field("bind_pw", &"[REDACTED]")
            .field("search_base", &self.search_base)
            .field("use_ssl", &self.use_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Errors from the directory service.
#[derive(Debug, thiserror::Error)]
pub enum LdapError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: ldap3::LdapError,
    },

    #[error("LDAP {operation} failed: {source}")]
    Protocol {
        operation: &'static str,
        #[source]
        source: ldap3::LdapError,
    },

    #[error("LDAP {operation} on {dn} failed with code {rc}: {text}")]
    Rejected {
        operation: &'static str,
        dn: String,
        rc: u32,
        text: String,
    },

    #[error("{dn} is missing required attribute {attribute}")]
    MissingAttribute { dn: String, attribute: &'static str },

    #[error("{dn}: attribute {attribute} is not a number: {value}")]
    InvalidNumber {
        dn: String,
        attribute: &'static str,
        value: String,
    },
}

impl From<LdapError> for ReconcileError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::MissingAttribute { dn, attribute } => ReconcileError::MissingAttribute {
                entity: dn,
                attribute: attribute.to_string(),
            },
            other => ReconcileError::collaborator(SYSTEM_DIRECTORY, other),
        }
    }
}

fn protocol(operation: &'static str) -> impl FnOnce(ldap3::LdapError) -> LdapError {
    move |source| LdapError::Protocol { operation, source }
}

fn check(operation: &'static str, dn: &str, result: LdapResult) -> Result<(), LdapError> {
    if result.rc == 0 {
        return Ok(());
    }
    Err(LdapError::Rejected {
        operation,
        dn: dn.to_string(),
        rc: result.rc,
        text: result.text,
    })
}

/// A bound connection to the directory service.
pub struct LdapDirectory {
    conn: LdapConn,
    search_base: String,
}

impl LdapDirectory {
    /// Connect and bind with the configured credentials.
    pub fn connect(config: &LdapConfig) -> Result<Self, LdapError> {
        let url = config.url();
        debug!(%url, "connecting to directory service");
        let settings =
            LdapConnSettings::new().set_conn_timeout(Duration::from_secs(config.timeout_secs));
        let mut conn = LdapConn::with_settings(settings, &url).map_err(|source| {
            LdapError::Connect {
                url: url.clone(),
                source,
            }
        })?;
        let result = conn
            .simple_bind(&config.bind_dn, &config.bind_pw)
            .map_err(protocol("bind"))?;
        check("bind", &config.bind_dn, result)?;
        info!(%url, bind_dn = %config.bind_dn, "bound to directory service");
        Ok(Self {
            conn,
            search_base: config.search_base.clone(),
        })
    }

    fn search(&mut self, filter: &str, attributes: &[&str]) -> Result<Vec<SearchEntry>, LdapError> {
        debug!(base = %self.search_base, filter, "searching directory");
        let (entries, _) = self
            .conn
            .search(&self.search_base, Scope::Subtree, filter, attributes.to_vec())
            .map_err(protocol("search"))?
            .success()
            .map_err(protocol("search"))?;
        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }
}

impl DirectoryReader for LdapDirectory {
    type Error = LdapError;

    fn list_accounts(&mut self) -> Result<Vec<DirectoryAccount>, LdapError> {
        self.search(ACCOUNT_FILTER, ACCOUNT_ATTRIBUTES)?
            .iter()
            .map(|entry| account_from_attrs(&entry.dn, &entry.attrs))
            .collect()
    }

    fn list_groups(&mut self) -> Result<Vec<DirectoryGroup>, LdapError> {
        self.search(GROUP_FILTER, GROUP_ATTRIBUTES)?
            .iter()
            .map(|entry| group_from_attrs(&entry.dn, &entry.attrs))
            .collect()
    }
}

impl DirectoryWriter for LdapDirectory {
    type Error = LdapError;

    fn execute(&mut self, action: &DirectoryAction) -> Result<(), LdapError> {
        match action {
            DirectoryAction::Add { dn, attributes } => {
                let attrs: Vec<(&str, HashSet<&str>)> = attributes
                    .iter()
                    .map(|(name, values)| {
                        (name.as_str(), values.iter().map(String::as_str).collect())
                    })
                    .collect();
                let result = self.conn.add(dn, attrs).map_err(protocol("add"))?;
                check("add", dn, result)
            }
            DirectoryAction::Modify { dn, changes } => {
                let mods: Vec<Mod<&str>> = changes
                    .iter()
                    .map(|change| match change {
                        AttributeChange::Replace { attribute, values } => Mod::Replace(
                            attribute.as_str(),
                            values.iter().map(String::as_str).collect(),
                        ),
                        AttributeChange::Clear { attribute } => {
                            Mod::Delete(attribute.as_str(), HashSet::new())
                        }
                    })
                    .collect();
                let result = self.conn.modify(dn, mods).map_err(protocol("modify"))?;
                check("modify", dn, result)
            }
            DirectoryAction::Rename {
                dn,
                new_rdn,
                new_superior,
            } => {
                let result = self
                    .conn
                    .modifydn(dn, new_rdn, true, new_superior.as_deref())
                    .map_err(protocol("modifydn"))?;
                check("modifydn", dn, result)
            }
        }
    }
}
