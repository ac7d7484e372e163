//! Custom-authenticator provider.
//!
//! Handles tokens of external OIDC-like issuers the upstream proxy already
//! validated. The proxy injects `authenticator_coordinates` naming the
//! authenticator and the trusted-issuer index; identity, tenant and client
//! id are read from configurable claim paths.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::BoxFuture;
use crate::authenticators::{AuthenticatorConfig, lookup_extra_path};
use crate::context::{AuthDetails, AuthFlow, ConsumerType, KeysExtra, ObjectContext, TenantContext};
use crate::director::DirectorClient;
use crate::errors::{ContextError, ContextResult};
use crate::providers::{AUTHENTICATOR_PROVIDER, ObjectContextProvider};
use crate::reqdata::{ReqData, SCOPES_KEY};

/// Provider for configured external authenticators.
pub struct AuthenticatorContextProvider {
    director: Arc<dyn DirectorClient>,
    authenticators: Vec<AuthenticatorConfig>,
}

impl AuthenticatorContextProvider {
    pub fn new(director: Arc<dyn DirectorClient>, authenticators: Vec<AuthenticatorConfig>) -> Self {
        Self {
            director,
            authenticators,
        }
    }

    /// First non-empty tenant attribute in ascending priority order.
    fn external_tenant(
        &self,
        data: &ReqData,
        authn: &AuthenticatorConfig,
    ) -> ContextResult<String> {
        let attributes = authn.tenant_attributes_by_priority();
        for attr in &attributes {
            if let Some(value) = lookup_extra_path(&data.body.extra, &attr.key).and_then(Value::as_str)
            {
                if !value.is_empty() {
                    return Ok(value.to_string());
                }
            }
        }
        let key = attributes.first().map(|a| a.key.as_str()).unwrap_or_default();
        Err(ContextError::InvalidData(format!(
            "tenant attribute {:?} missing from {} authenticator token",
            key, authn.name
        )))
    }

    /// Scopes from the `scope` claim with the issuer prefix stripped.
    ///
    /// A missing claim or a non-list scalar yields no scopes; a list with a
    /// non-string entry is an error.
    fn scopes(&self, data: &ReqData, prefix: &str) -> ContextResult<String> {
        let strip = |s: &str| s.strip_prefix(prefix).unwrap_or(s).to_string();
        match data.body.extra.get(SCOPES_KEY) {
            Some(Value::Array(items)) => {
                let mut scopes = Vec::with_capacity(items.len());
                for item in items {
                    let Some(s) = item.as_str() else {
                        return Err(ContextError::InvalidData(
                            "scope entries must be strings".to_string(),
                        ));
                    };
                    scopes.push(strip(s));
                }
                Ok(scopes.join(" "))
            }
            Some(Value::String(s)) => Ok(s
                .split_whitespace()
                .map(strip)
                .collect::<Vec<_>>()
                .join(" ")),
            _ => Ok(String::new()),
        }
    }

    async fn resolve(&self, data: &ReqData, details: &AuthDetails) -> ContextResult<ObjectContext> {
        let authn = details.authenticator.as_ref().ok_or_else(|| {
            ContextError::Internal("authenticator config missing from auth details".to_string())
        })?;

        let external = self.external_tenant(data, authn)?;
        let scopes = self.scopes(data, &details.scope_prefix)?;

        let client_id_key = &authn.attributes.client_id_attribute.key;
        let oauth_client_id = if client_id_key.is_empty() {
            String::new()
        } else {
            lookup_extra_path(&data.body.extra, client_id_key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let (tenant, region, labels) = match self.director.tenant_by_external_id(&external).await {
            Ok(found) => (
                TenantContext::new(external, found.internal_id.clone()),
                details.region.clone(),
                found.labels,
            ),
            Err(err) if err.is_not_found() => {
                info!("Tenant with external ID {} not found, proceeding without internal ID", external);
                (TenantContext::new(external, ""), String::new(), Default::default())
            }
            Err(err) => {
                return Err(err.wrap(format!(
                    "while getting external tenant mapping [ExternalTenantID={}]",
                    external
                )));
            }
        };

        Ok(ObjectContext {
            tenant,
            keys: KeysExtra::consumer(),
            scopes,
            region,
            oauth_client_id,
            consumer_id: details.auth_id.clone(),
            auth_flow: details.auth_flow,
            consumer_type: ConsumerType::User,
            context_provider: AUTHENTICATOR_PROVIDER,
            tenant_labels: labels,
            ..Default::default()
        })
    }
}

impl ObjectContextProvider for AuthenticatorContextProvider {
    fn match_request(&self, data: &ReqData) -> ContextResult<Option<AuthDetails>> {
        let Some(coords) = data.coordinates() else {
            return Ok(None);
        };
        let Some(authn) = self.authenticators.iter().find(|a| a.name == coords.name) else {
            return Ok(None);
        };

        let identity_key = &authn.attributes.identity_attribute.key;
        let identity = lookup_extra_path(&data.body.extra, identity_key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let Some(identity) = identity else {
            return Err(ContextError::InvalidData(format!(
                "missing identity attribute from {:?} authenticator token",
                authn.name
            )));
        };

        let issuer = authn
            .trusted_issuers
            .get(coords.index)
            .cloned()
            .unwrap_or_default();

        Ok(Some(AuthDetails {
            auth_id: identity.to_string(),
            auth_flow: AuthFlow::Jwt,
            cert_issuer: String::new(),
            authenticator: Some(authn.clone()),
            scope_prefix: issuer.scope_prefix,
            region: issuer.region,
        }))
    }

    fn object_context<'a>(
        &'a self,
        data: &'a ReqData,
        details: &'a AuthDetails,
    ) -> BoxFuture<'a, ContextResult<ObjectContext>> {
        Box::pin(self.resolve(data, details))
    }
}
