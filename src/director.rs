//! Director collaborator: tenant and system-auth lookups.
//!
//! The Director owns tenant provisioning and system-auth records; this
//! sidecar only consults it. `DirectorClient` is the contract the providers
//! program against; `GraphqlDirector` is the production implementation
//! speaking GraphQL over HTTP.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::BoxFuture;
use crate::context::ConsumerType;
use crate::errors::{ContextError, ContextResult};

/// A tenant as known to the Director.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// External id, stable across systems.
    #[serde(default)]
    pub id: String,
    /// Internal id assigned by the Director; empty when not provisioned.
    #[serde(default, rename = "internalID")]
    pub internal_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub tenant_type: String,
    #[serde(default, rename = "parentID")]
    pub parent_id: String,
    #[serde(default)]
    pub labels: BTreeMap<String, Value>,
    #[serde(default)]
    pub provider: String,
}

impl Tenant {
    /// The `region` label, when present and a string.
    pub fn region_label(&self) -> Option<&str> {
        self.labels.get("region").and_then(Value::as_str)
    }

    /// The `subdomain` label, when present and a string.
    pub fn subdomain_label(&self) -> Option<&str> {
        self.labels.get("subdomain").and_then(Value::as_str)
    }
}

/// Input for tenant writes (used by the lazy subdomain backfill).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantInput {
    pub name: String,
    #[serde(rename = "externalTenant")]
    pub external_tenant: String,
    pub parent: Option<String>,
    pub subdomain: Option<String>,
    pub region: Option<String>,
    #[serde(rename = "type")]
    pub tenant_type: String,
    pub provider: String,
}

/// Credential material stored on a system auth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthValue {
    #[serde(default, rename = "certCommonName")]
    pub cert_common_name: String,
    #[serde(default, rename = "oneTimeToken")]
    pub one_time_token: Option<String>,
}

/// A system-auth record referencing exactly one domain object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemAuth {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "tenantID")]
    pub tenant_id: Option<String>,
    #[serde(default, rename = "appID")]
    pub app_id: Option<String>,
    #[serde(default, rename = "runtimeID")]
    pub runtime_id: Option<String>,
    #[serde(default, rename = "integrationSystemID")]
    pub integration_system_id: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthValue>,
}

impl SystemAuth {
    /// Consumer type of the referenced object, if any reference is set.
    pub fn reference_type(&self) -> Option<ConsumerType> {
        if self.app_id.is_some() {
            Some(ConsumerType::Application)
        } else if self.runtime_id.is_some() {
            Some(ConsumerType::Runtime)
        } else if self.integration_system_id.is_some() {
            Some(ConsumerType::IntegrationSystem)
        } else {
            None
        }
    }

    /// Id of the referenced object, if any reference is set.
    pub fn reference_object_id(&self) -> Option<&str> {
        self.app_id
            .as_deref()
            .or(self.runtime_id.as_deref())
            .or(self.integration_system_id.as_deref())
    }
}

/// Contract for Director lookups.
///
/// Object-safe via boxed futures so the providers can share one client
/// behind `Arc<dyn DirectorClient>`.
pub trait DirectorClient: Send + Sync {
    /// Look up a tenant by its external id. Not-found is the distinguished
    /// `ContextError::TenantNotFound`, which callers degrade on.
    fn tenant_by_external_id<'a>(
        &'a self,
        external_id: &'a str,
    ) -> BoxFuture<'a, ContextResult<Tenant>>;

    /// Fetch a system-auth record by id.
    fn system_auth_by_id<'a>(&'a self, auth_id: &'a str)
    -> BoxFuture<'a, ContextResult<SystemAuth>>;

    /// Persist an updated system-auth record (idempotent).
    fn update_system_auth<'a>(&'a self, auth: &'a SystemAuth)
    -> BoxFuture<'a, ContextResult<()>>;

    /// Upsert tenants (used for the subdomain backfill repair).
    fn write_tenants<'a>(&'a self, tenants: &'a [TenantInput])
    -> BoxFuture<'a, ContextResult<()>>;
}

/// Production Director client speaking GraphQL over HTTP.
pub struct GraphqlDirector {
    endpoint: Url,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

impl GraphqlDirector {
    /// Create a client against the Director GraphQL endpoint.
    pub fn new(endpoint: Url) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { endpoint, client })
    }

    async fn execute(&self, query: String) -> ContextResult<Value> {
        debug!("Executing director query against {}", self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| ContextError::Director(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContextError::Director(format!(
                "director returned status {}",
                status
            )));
        }

        let body: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| ContextError::Director(e.to_string()))?;

        if let Some(err) = body.errors.first() {
            return Err(ContextError::Director(err.message.clone()));
        }

        body.data
            .ok_or_else(|| ContextError::Director("empty response data".to_string()))
    }
}

fn field(data: &Value, name: &str) -> ContextResult<Value> {
    data.get(name)
        .cloned()
        .ok_or_else(|| ContextError::Director(format!("missing field {} in response", name)))
}

impl DirectorClient for GraphqlDirector {
    fn tenant_by_external_id<'a>(
        &'a self,
        external_id: &'a str,
    ) -> BoxFuture<'a, ContextResult<Tenant>> {
        Box::pin(async move {
            let query = format!(
                r#"query {{ result: tenantByExternalID(id: "{}") {{ id internalID name type parentID labels provider }} }}"#,
                external_id
            );
            let data = self.execute(query).await?;
            let tenant = field(&data, "result")?;
            if tenant.is_null() {
                return Err(ContextError::TenantNotFound {
                    external_id: external_id.to_string(),
                });
            }
            serde_json::from_value(tenant).map_err(|e| ContextError::Director(e.to_string()))
        })
    }

    fn system_auth_by_id<'a>(
        &'a self,
        auth_id: &'a str,
    ) -> BoxFuture<'a, ContextResult<SystemAuth>> {
        Box::pin(async move {
            let query = format!(
                r#"query {{ result: systemAuth(id: "{}") {{ id tenantID appID runtimeID integrationSystemID auth {{ certCommonName oneTimeToken }} }} }}"#,
                auth_id
            );
            let data = self.execute(query).await?;
            let auth = field(&data, "result")?;
            if auth.is_null() {
                return Err(ContextError::Director(format!(
                    "system auth with id {} not found",
                    auth_id
                )));
            }
            serde_json::from_value(auth).map_err(|e| ContextError::Director(e.to_string()))
        })
    }

    fn update_system_auth<'a>(
        &'a self,
        auth: &'a SystemAuth,
    ) -> BoxFuture<'a, ContextResult<()>> {
        Box::pin(async move {
            let auth_value =
                serde_json::to_string(&auth.auth).map_err(|e| ContextError::Internal(e.to_string()))?;
            let query = format!(
                r#"mutation {{ result: updateSystemAuth(authID: "{}", authValue: {}) {{ id }} }}"#,
                auth.id,
                json!(auth_value)
            );
            self.execute(query).await.map(|_| ())
        })
    }

    fn write_tenants<'a>(
        &'a self,
        tenants: &'a [TenantInput],
    ) -> BoxFuture<'a, ContextResult<()>> {
        Box::pin(async move {
            let input =
                serde_json::to_string(tenants).map_err(|e| ContextError::Internal(e.to_string()))?;
            let query = format!(
                r#"mutation {{ result: writeTenants(in: {}) }}"#,
                json!(input)
            );
            self.execute(query).await.map(|_| ())
        })
    }
}
