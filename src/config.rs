//! Process configuration.
//!
//! Everything here is immutable after startup: file paths for the static
//! tables, the Director endpoint, the claim-key names of the consumer
//! context header, and the tenant-substitution label.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Claim-key names inside the `User_context` header.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerClaimsKeys {
    #[serde(default = "default_client_id_key")]
    pub client_id: String,
    #[serde(default = "default_tenant_id_key")]
    pub tenant_id: String,
    #[serde(default = "default_user_name_key")]
    pub user_name: String,
    #[serde(default = "default_subdomain_key")]
    pub subdomain: String,
}

fn default_client_id_key() -> String {
    "client_id".to_string()
}

fn default_tenant_id_key() -> String {
    "tenantid".to_string()
}

fn default_user_name_key() -> String {
    "user_name".to_string()
}

fn default_subdomain_key() -> String {
    "subdomain".to_string()
}

impl Default for ConsumerClaimsKeys {
    fn default() -> Self {
        Self {
            client_id: default_client_id_key(),
            tenant_id: default_tenant_id_key(),
            user_name: default_user_name_key(),
            subdomain: default_subdomain_key(),
        }
    }
}

/// Top-level application configuration, read from a JSON file.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Bind address of the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Director GraphQL endpoint.
    pub director_url: String,
    /// YAML file with the per-consumer-type scope table.
    pub scopes_file: PathBuf,
    /// YAML file with the static user table.
    pub static_users_file: PathBuf,
    /// YAML file with the static group table.
    #[serde(default)]
    pub static_groups_file: Option<PathBuf>,
    /// JSON file with the trusted-authenticator list.
    #[serde(default)]
    pub authenticators_file: Option<PathBuf>,
    #[serde(default)]
    pub consumer_claims_keys: ConsumerClaimsKeys,
    /// Tenant label that redirects the consumer tenant to a root tenant.
    /// Empty disables substitution.
    #[serde(default = "default_substitution_label")]
    pub tenant_substitution_label_key: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_substitution_label() -> String {
    "customerId".to_string()
}

impl AppConfig {
    /// Load the configuration from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }
}
