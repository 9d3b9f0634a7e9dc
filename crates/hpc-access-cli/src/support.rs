use crate::config::Settings;
use hpc_access_core::{
    RegistryState, SystemState, gather_registry_state, gather_system_state, read_snapshot,
};
use hpc_access_fs::CephFs;
use hpc_access_ldap::LdapDirectory;
use hpc_access_registry::RegistryClient;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; `--verbose` wins over `RUST_LOG`.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn fail(message: impl fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

pub fn settings_or_exit(path: Option<&Path>) -> Settings {
    Settings::load(path).unwrap_or_else(|e| fail(e))
}

pub fn ldap_or_exit(settings: &Settings) -> LdapDirectory {
    let config = settings.ldap().unwrap_or_else(|e| fail(e));
    LdapDirectory::connect(config).unwrap_or_else(|e| fail(e))
}

pub fn registry_client_or_exit(settings: &Settings) -> RegistryClient {
    let config = settings.registry().unwrap_or_else(|e| fail(e));
    RegistryClient::new(config).unwrap_or_else(|e| fail(e))
}

/// Current state from a snapshot file, or from the live directory service
/// and filesystem.
pub fn system_state_or_exit(settings: &Settings, snapshot: Option<&Path>) -> SystemState {
    if let Some(path) = snapshot {
        info!(path = %path.display(), "reading system snapshot");
        return read_snapshot(path).unwrap_or_else(|e| fail(e));
    }
    let mut directory = ldap_or_exit(settings);
    let mut filesystem = CephFs::new(&settings.filesystem);
    gather_system_state(&mut directory, &mut filesystem).unwrap_or_else(|e| fail(e))
}

pub fn registry_state_or_exit(settings: &Settings, snapshot: Option<&Path>) -> RegistryState {
    if let Some(path) = snapshot {
        info!(path = %path.display(), "reading registry snapshot");
        return read_snapshot(path).unwrap_or_else(|e| fail(e));
    }
    let mut client = registry_client_or_exit(settings);
    gather_registry_state(&mut client).unwrap_or_else(|e| fail(e))
}

pub fn print_json_or_exit<T: Serialize>(value: &T) {
    let rendered = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| fail(format!("failed to render json output: {e}")));
    println!("{rendered}");
}

pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
