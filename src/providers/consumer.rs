//! Consumer-context provider.
//!
//! Handles the "party X acting on behalf of consumer Y" composite: an
//! opaque `User_context` header naming the consumer, presented alongside an
//! externally-issued certificate. This provider only ever fires together
//! with a certificate-service match.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::BoxFuture;
use crate::config::ConsumerClaimsKeys;
use crate::context::{
    AuthDetails, AuthFlow, ConsumerType, KeysExtra, ObjectContext, ScopesMergeStrategy,
    TenantContext,
};
use crate::director::{DirectorClient, Tenant, TenantInput};
use crate::errors::{ContextError, ContextResult};
use crate::providers::{CONSUMER_PROVIDER, ObjectContextProvider};
use crate::reqdata::{EXTERNAL_ISSUER, ReqData, USER_CONTEXT_KEY};

/// Provider for delegated consumers named in the `User_context` header.
pub struct ConsumerContextProvider {
    director: Arc<dyn DirectorClient>,
    claims: ConsumerClaimsKeys,
}

impl ConsumerContextProvider {
    pub fn new(director: Arc<dyn DirectorClient>, claims: ConsumerClaimsKeys) -> Self {
        Self { director, claims }
    }

    fn parse_claims(&self, data: &ReqData) -> ContextResult<Value> {
        let raw = data
            .request_header(USER_CONTEXT_KEY)
            .ok_or_else(|| ContextError::KeyNotFound(USER_CONTEXT_KEY.to_string()))?;
        serde_json::from_str(raw).map_err(|e| {
            ContextError::InvalidData(format!("unable to parse user context header: {}", e))
        })
    }

    fn mandatory_claim<'a>(&self, claims: &'a Value, key: &str) -> ContextResult<&'a str> {
        claims
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ContextError::InvalidData(format!("property {:?} is mandatory", key))
            })
    }

    /// String `region` label of the fetched tenant; missing and
    /// wrongly-typed labels are distinct errors.
    fn region_of(&self, tenant: &Tenant, external: &str) -> ContextResult<String> {
        match tenant.labels.get("region") {
            Some(Value::String(region)) => Ok(region.clone()),
            Some(_) => Err(ContextError::InvalidData(
                "unexpected region label type, should be string".to_string(),
            )),
            None => Err(ContextError::Internal(format!(
                "region label not found for tenant with ID: {:?}",
                external
            ))),
        }
    }

    /// Best-effort repair: persist the subdomain from the header when the
    /// tenant lacks the label. Never fails the resolution.
    async fn backfill_subdomain(&self, tenant: &Tenant, subdomain: &str, region: &str) {
        if tenant.subdomain_label().is_some() {
            return;
        }
        let input = TenantInput {
            name: tenant.name.clone().unwrap_or_default(),
            external_tenant: tenant.id.clone(),
            parent: Some(tenant.parent_id.clone()),
            subdomain: Some(subdomain.to_string()),
            region: Some(region.to_string()),
            tenant_type: tenant.tenant_type.clone(),
            provider: tenant.provider.clone(),
        };
        info!("Backfilling missing subdomain label for tenant {}", tenant.id);
        if let Err(err) = self.director.write_tenants(&[input]).await {
            warn!(
                "Failed to backfill subdomain for tenant with external ID {:?}: {}",
                tenant.id, err
            );
        }
    }

    async fn resolve(&self, data: &ReqData, details: &AuthDetails) -> ContextResult<ObjectContext> {
        let claims = self.parse_claims(data).map_err(|e| {
            e.wrap(format!(
                "while getting user context data from {:?} header",
                USER_CONTEXT_KEY
            ))
        })?;

        let wrap = |e: ContextError| {
            e.wrap(format!(
                "while getting user context data from {:?} header",
                USER_CONTEXT_KEY
            ))
        };
        let client_id = self
            .mandatory_claim(&claims, &self.claims.client_id)
            .map_err(wrap)?;
        let external_tenant = self
            .mandatory_claim(&claims, &self.claims.tenant_id)
            .map_err(wrap)?;
        let subdomain = self
            .mandatory_claim(&claims, &self.claims.subdomain)
            .map_err(wrap)?;

        let (tenant_ctx, region, labels) =
            match self.director.tenant_by_external_id(external_tenant).await {
                Ok(tenant) => {
                    let region = self.region_of(&tenant, external_tenant)?;
                    self.backfill_subdomain(&tenant, subdomain, &region).await;
                    (
                        TenantContext::new(external_tenant, tenant.internal_id.clone()),
                        region,
                        tenant.labels,
                    )
                }
                Err(err) if err.is_not_found() => {
                    info!(
                        "Tenant with external ID {} not found, proceeding without internal ID",
                        external_tenant
                    );
                    (
                        TenantContext::new(external_tenant, ""),
                        String::new(),
                        Default::default(),
                    )
                }
                Err(err) => {
                    return Err(err.wrap(format!(
                        "while getting external tenant mapping [ExternalTenantID={}]",
                        external_tenant
                    )));
                }
            };

        Ok(ObjectContext {
            tenant: tenant_ctx,
            keys: KeysExtra::consumer(),
            scopes: String::new(),
            scopes_merge_strategy: ScopesMergeStrategy::Merge,
            region,
            oauth_client_id: client_id.to_string(),
            consumer_id: details.auth_id.clone(),
            auth_flow: details.auth_flow,
            consumer_type: ConsumerType::User,
            context_provider: CONSUMER_PROVIDER,
            tenant_labels: labels,
        })
    }
}

impl ObjectContextProvider for ConsumerContextProvider {
    fn match_request(&self, data: &ReqData) -> ContextResult<Option<AuthDetails>> {
        let raw = data
            .request_header(USER_CONTEXT_KEY)
            .ok_or_else(|| ContextError::KeyNotFound(USER_CONTEXT_KEY.to_string()))?;

        match data.certificate_signal() {
            Some((_, issuer)) if issuer == EXTERNAL_ISSUER => {}
            _ => return Ok(None),
        }

        let claims: Value = serde_json::from_str(raw).map_err(|e| {
            ContextError::InvalidData(format!("unable to parse user context header: {}", e))
        })?;
        let user_name = claims
            .get(&self.claims.user_name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ContextError::InvalidData(format!(
                    "could not find {} property",
                    self.claims.user_name
                ))
            })?;

        Ok(Some(AuthDetails::new(
            user_name,
            AuthFlow::ConsumerProvider,
        )))
    }

    fn object_context<'a>(
        &'a self,
        data: &'a ReqData,
        details: &'a AuthDetails,
    ) -> BoxFuture<'a, ContextResult<ObjectContext>> {
        Box::pin(self.resolve(data, details))
    }
}
