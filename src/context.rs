//! Request-scoped authorization context types.
//!
//! An `ObjectContext` is produced by exactly one matched provider and
//! discarded after the response is written. `AuthDetails` is the normalized
//! identity evidence extracted by a provider's match step; it is never
//! mutated after creation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authenticators::AuthenticatorConfig;

/// Output key under which the consumer tenant's internal id is merged.
pub const CONSUMER_TENANT_KEY: &str = "consumerTenant";
/// Output key under which the consumer tenant's external id is merged.
pub const EXTERNAL_TENANT_KEY: &str = "externalTenant";
/// Output key for the provider tenant's internal id (delegation flows).
pub const PROVIDER_TENANT_KEY: &str = "providerTenant";
/// Output key for the provider tenant's external id (delegation flows).
pub const PROVIDER_EXTERNAL_TENANT_KEY: &str = "providerExternalTenant";

/// Authentication flow a request was attributed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthFlow {
    #[default]
    #[serde(rename = "JWT")]
    Jwt,
    OAuth2,
    Certificate,
    OneTimeToken,
    ConsumerProvider,
}

impl AuthFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jwt => "JWT",
            Self::OAuth2 => "OAuth2",
            Self::Certificate => "Certificate",
            Self::OneTimeToken => "OneTimeToken",
            Self::ConsumerProvider => "ConsumerProvider",
        }
    }
}

impl fmt::Display for AuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical consumer attributed to the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumerType {
    /// A statically configured user ("Static User" on the wire).
    #[default]
    #[serde(rename = "Static User")]
    User,
    Application,
    Runtime,
    #[serde(rename = "Integration System")]
    IntegrationSystem,
}

impl ConsumerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "Static User",
            Self::Application => "Application",
            Self::Runtime => "Runtime",
            Self::IntegrationSystem => "Integration System",
        }
    }

    /// The snake_case segment used in scope-configuration paths
    /// (`scopesPerConsumerType.<segment>`).
    pub fn scopes_segment(&self) -> &'static str {
        match self {
            Self::User => "static_user",
            Self::Application => "application",
            Self::Runtime => "runtime",
            Self::IntegrationSystem => "integration_system",
        }
    }

    /// Parse the wire representation, e.g. from a `consumer_type` claim.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Static User" => Some(Self::User),
            "Application" => Some(Self::Application),
            "Runtime" => Some(Self::Runtime),
            "Integration System" => Some(Self::IntegrationSystem),
            _ => None,
        }
    }
}

impl fmt::Display for ConsumerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a context's scopes combine with the scopes of other contexts
/// matched on the same request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScopesMergeStrategy {
    /// This context's scopes replace everything; later contexts are ignored.
    Override,
    /// Appended to the accumulator, order-preserving, no deduplication.
    Merge,
    /// Set-intersected with the accumulator (seeds it when empty).
    #[default]
    Intersect,
}

/// Identity evidence extracted by a provider's match step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthDetails {
    pub auth_id: String,
    pub auth_flow: AuthFlow,
    /// Issuer of the client certificate, when the flow is certificate-based.
    pub cert_issuer: String,
    /// The custom authenticator that claimed the request, if any.
    pub authenticator: Option<AuthenticatorConfig>,
    /// Prefix to strip from every scope entry, per the trusted issuer.
    pub scope_prefix: String,
    pub region: String,
}

impl AuthDetails {
    pub fn new(auth_id: impl Into<String>, auth_flow: AuthFlow) -> Self {
        Self {
            auth_id: auth_id.into(),
            auth_flow,
            ..Default::default()
        }
    }

    pub fn with_cert_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.cert_issuer = issuer.into();
        self
    }
}

/// The tenant pair a request operates against.
///
/// An empty internal id means the tenant is not provisioned downstream —
/// a legitimate state, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    pub external_tenant_id: String,
    pub tenant_id: String,
}

impl TenantContext {
    pub fn new(external_tenant_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            external_tenant_id: external_tenant_id.into(),
            tenant_id: tenant_id.into(),
        }
    }
}

/// Output field names under which a context's tenant pair is merged.
///
/// Separating the "provider" namespace from the "consumer" namespace lets
/// two simultaneous contexts coexist without colliding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysExtra {
    pub tenant_key: String,
    pub external_tenant_key: String,
}

impl KeysExtra {
    /// The canonical consumer-tenant key pair.
    pub fn consumer() -> Self {
        Self {
            tenant_key: CONSUMER_TENANT_KEY.to_string(),
            external_tenant_key: EXTERNAL_TENANT_KEY.to_string(),
        }
    }

    /// The provider-tenant key pair used by certificate-service contexts.
    pub fn provider() -> Self {
        Self {
            tenant_key: PROVIDER_TENANT_KEY.to_string(),
            external_tenant_key: PROVIDER_EXTERNAL_TENANT_KEY.to_string(),
        }
    }
}

impl Default for KeysExtra {
    fn default() -> Self {
        Self::consumer()
    }
}

/// The full authorization decision produced by one matched provider.
#[derive(Debug, Clone, Default)]
pub struct ObjectContext {
    pub tenant: TenantContext,
    pub keys: KeysExtra,
    /// Space-joined scope set.
    pub scopes: String,
    pub scopes_merge_strategy: ScopesMergeStrategy,
    pub region: String,
    pub oauth_client_id: String,
    pub consumer_id: String,
    pub auth_flow: AuthFlow,
    pub consumer_type: ConsumerType,
    /// Tag of the strategy that produced this context.
    pub context_provider: &'static str,
    /// Labels of the resolved tenant, when one was fetched.
    pub tenant_labels: BTreeMap<String, Value>,
}
