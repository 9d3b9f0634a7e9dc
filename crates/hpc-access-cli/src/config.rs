//! Settings file and secret overrides.

use hpc_access_core::OpFilter;
use hpc_access_fs::FsConfig;
use hpc_access_ldap::LdapConfig;
use hpc_access_registry::RegistryConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hpc-access-cli/config.json";
pub const ENV_CONFIG: &str = "HPC_ACCESS_CONFIG";
pub const ENV_LDAP_BIND_PW: &str = "HPC_ACCESS_LDAP_BIND_PW";
pub const ENV_REGISTRY_API_TOKEN: &str = "HPC_ACCESS_REGISTRY_API_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("no `{0}` section configured")]
    MissingSection(&'static str),
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub ldap: Option<LdapConfig>,
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
    #[serde(default)]
    pub filesystem: FsConfig,
    #[serde(default)]
    pub account_ops: OpFilter,
    #[serde(default)]
    pub group_ops: OpFilter,
    #[serde(default)]
    pub directory_ops: OpFilter,
    #[serde(default)]
    pub dry_run: bool,
}

impl Settings {
    /// Load from `explicit`, else from `HPC_ACCESS_CONFIG`, else from the
    /// default path. Only a missing default file is tolerated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let requested = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));
        let mut settings = match requested {
            Some(path) => Self::read(&path)?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::read(&path)?
                } else {
                    tracing::debug!(path = DEFAULT_CONFIG_PATH, "no settings file, using defaults");
                    Self::default()
                }
            }
        };
        settings.apply_secrets(|name| std::env::var(name).ok());
        Ok(settings)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(path, &text)
    }

    /// Parse as TOML when the extension says so, JSON otherwise.
    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(text).map_err(|err| parse_error(err.to_string()))
        } else {
            serde_json::from_str(text).map_err(|err| parse_error(err.to_string()))
        }
    }

    /// Secrets from the environment replace file values when set.
    pub fn apply_secrets(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let (Some(ldap), Some(bind_pw)) = (self.ldap.as_mut(), lookup(ENV_LDAP_BIND_PW)) {
            ldap.bind_pw = bind_pw;
        }
        if let (Some(registry), Some(token)) =
            (self.registry.as_mut(), lookup(ENV_REGISTRY_API_TOKEN))
        {
            registry.api_token = token;
        }
    }

    pub fn ldap(&self) -> Result<&LdapConfig, ConfigError> {
        self.ldap.as_ref().ok_or(ConfigError::MissingSection("ldap"))
    }

    pub fn registry(&self) -> Result<&RegistryConfig, ConfigError> {
        self.registry
            .as_ref()
            .ok_or(ConfigError::MissingSection("registry"))
    }
}
