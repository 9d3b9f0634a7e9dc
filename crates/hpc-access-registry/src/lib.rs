//! REST client for the hpc-access registry.
//!
//! Lists are paginated as `{"results": [...], "next": <url or null>}`;
//! usage is written back with `PATCH {"resources_used": ...}`.

use hpc_access_core::collaborators::{
    GROUPS_ENDPOINT, PROJECTS_ENDPOINT, SYSTEM_REGISTRY, USERS_ENDPOINT,
};
use hpc_access_core::{
    ReconcileError, RegistryGroup, RegistryProject, RegistryReader, RegistryUser,
    RegistryWriter, ResourceData, ResourceDataUser,
};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Deserialize)]
pub struct RegistryConfig {
    pub server_url: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("server_url", &self.server_url)
            .field("api_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid registry configuration: {0}")]
    Config(String),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("unable to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl From<RegistryError> for ReconcileError {
    fn from(err: RegistryError) -> Self {
        ReconcileError::collaborator(SYSTEM_REGISTRY, err)
    }
}

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResourcesUsedPatch<'a, T> {
    resources_used: &'a T,
}

/// Decode one page of `T` records from a response body.
pub fn parse_page<T: DeserializeOwned>(url: &str, body: &str) -> Result<Page<T>, RegistryError> {
    serde_json::from_str(body).map_err(|err| RegistryError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })
}

/// Blocking client authenticated with an API token.
pub struct RegistryClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        if config.server_url.trim().is_empty() {
            return Err(RegistryError::Config("server_url is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| RegistryError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.api_token)
    }

    fn send(
        &self,
        method: &'static str,
        url: &str,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<String, RegistryError> {
        let http_error = |source| RegistryError::Http {
            url: url.to_string(),
            source,
        };
        let response = request
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .map_err(http_error)?;
        let status = response.status();
        let body = response.text().map_err(http_error)?;
        if !status.is_success() {
            return Err(RegistryError::Status {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Follow `next` links until the last page.
    fn list<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, RegistryError> {
        let mut url = self.endpoint_url(endpoint);
        let mut records = Vec::new();
        loop {
            debug!(%url, "fetching registry page");
            let body = self.send("GET", &url, self.client.get(&url))?;
            let page: Page<T> = parse_page(&url, &body)?;
            records.extend(page.results);
            match page.next {
                Some(next) if !next.is_empty() && next != url => url = next,
                _ => break,
            }
        }
        Ok(records)
    }

    fn patch_resources_used<T: Serialize>(
        &self,
        endpoint: &str,
        uuid: Uuid,
        used: &T,
    ) -> Result<(), RegistryError> {
        let url = self.endpoint_url(&format!("{endpoint}{uuid}/"));
        let body = ResourcesUsedPatch {
            resources_used: used,
        };
        self.send("PATCH", &url, self.client.patch(&url).json(&body))?;
        Ok(())
    }
}

impl RegistryReader for RegistryClient {
    type Error = RegistryError;

    fn list_users(&mut self) -> Result<Vec<RegistryUser>, RegistryError> {
        self.list(USERS_ENDPOINT)
    }

    fn list_groups(&mut self) -> Result<Vec<RegistryGroup>, RegistryError> {
        self.list(GROUPS_ENDPOINT)
    }

    fn list_projects(&mut self) -> Result<Vec<RegistryProject>, RegistryError> {
        self.list(PROJECTS_ENDPOINT)
    }
}

impl RegistryWriter for RegistryClient {
    type Error = RegistryError;

    fn update_user_resources_used(
        &mut self,
        uuid: Uuid,
        used: &ResourceDataUser,
    ) -> Result<(), RegistryError> {
        self.patch_resources_used(USERS_ENDPOINT, uuid, used)
    }

    fn update_group_resources_used(
        &mut self,
        uuid: Uuid,
        used: &ResourceData,
    ) -> Result<(), RegistryError> {
        self.patch_resources_used(GROUPS_ENDPOINT, uuid, used)
    }

    fn update_project_resources_used(
        &mut self,
        uuid: Uuid,
        used: &ResourceData,
    ) -> Result<(), RegistryError> {
        self.patch_resources_used(PROJECTS_ENDPOINT, uuid, used)
    }
}
