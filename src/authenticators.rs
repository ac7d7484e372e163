//! Custom-authenticator configuration.
//!
//! Each authenticator describes an external OIDC-like issuer the upstream
//! proxy already validated: which claim uniquely marks its tokens, where the
//! identity lives, which claims may carry the tenant, and the trusted
//! issuers (with scope prefix and region) selectable by coordinate index.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pointer into the configured authenticator list, injected by the
/// upstream proxy as the `authenticator_coordinates` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub name: String,
    #[serde(default)]
    pub index: usize,
}

/// A single claim reference; `value` is the expected value for the unique
/// attribute and empty for plain lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// A claim that may carry the external tenant id, tried in ascending
/// priority order (lowest number wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantAttribute {
    pub key: String,
    #[serde(default)]
    pub priority: u32,
}

/// Claim layout of one authenticator's tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub unique_attribute: Attribute,
    #[serde(default)]
    pub identity_attribute: Attribute,
    #[serde(default)]
    pub tenant_attributes: Vec<TenantAttribute>,
    #[serde(default)]
    pub client_id_attribute: Attribute,
}

/// An issuer this authenticator trusts; selected by coordinate index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustedIssuer {
    #[serde(default)]
    pub domain_url: String,
    #[serde(default)]
    pub scope_prefix: String,
    #[serde(default)]
    pub region: String,
}

/// One configured external authenticator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatorConfig {
    pub name: String,
    #[serde(default)]
    pub trusted_issuers: Vec<TrustedIssuer>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl AuthenticatorConfig {
    /// Tenant attributes sorted by ascending priority.
    pub fn tenant_attributes_by_priority(&self) -> Vec<&TenantAttribute> {
        let mut attrs: Vec<&TenantAttribute> = self.attributes.tenant_attributes.iter().collect();
        attrs.sort_by_key(|a| a.priority);
        attrs
    }
}

/// Load the authenticator list from a JSON file.
pub fn load_authenticators(path: &Path) -> anyhow::Result<Vec<AuthenticatorConfig>> {
    let raw = fs::read_to_string(path)?;
    let configs: Vec<AuthenticatorConfig> = serde_json::from_str(&raw)?;
    Ok(configs)
}

/// Resolve a dotted claim path (e.g. `extra.unique`) against the request's
/// extra map.
pub fn lookup_extra_path<'a>(
    extra: &'a std::collections::BTreeMap<String, Value>,
    path: &str,
) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = extra.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
