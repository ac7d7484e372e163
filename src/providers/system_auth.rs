//! System-auth provider: OAuth2, connector-certificate and one-time-token
//! credentials backed by a Director system-auth record.
//!
//! The three match signals are mutually exclusive and probed in a fixed
//! order; a request owned by a custom authenticator is skipped entirely.

use std::sync::Arc;

use tracing::{debug, info};

use crate::BoxFuture;
use crate::context::{
    AuthDetails, AuthFlow, ConsumerType, KeysExtra, ObjectContext, TenantContext,
};
use crate::director::{DirectorClient, SystemAuth};
use crate::errors::{ContextError, ContextResult};
use crate::providers::{ObjectContextProvider, SYSTEM_AUTH_PROVIDER};
use crate::reqdata::{CLIENT_ID_KEY, CLIENT_ID_TOKEN_KEY, EXTERNAL_ISSUER, ReqData};
use crate::scopes::{SCOPES_PER_CONSUMER_TYPE_PREFIX, ScopesGetter};

/// Provider for credentials recorded as Director system auths.
pub struct SystemAuthContextProvider {
    director: Arc<dyn DirectorClient>,
    scopes: Arc<dyn ScopesGetter>,
}

struct Resolved {
    tenant: TenantContext,
    scopes: String,
    region: String,
    labels: std::collections::BTreeMap<String, serde_json::Value>,
}

impl SystemAuthContextProvider {
    pub fn new(director: Arc<dyn DirectorClient>, scopes: Arc<dyn ScopesGetter>) -> Self {
        Self { director, scopes }
    }

    /// External tenant id from the request; absence is tolerated.
    fn request_tenant(&self, data: &ReqData) -> ContextResult<Option<String>> {
        match data.external_tenant_id() {
            Ok(id) => Ok(Some(id)),
            Err(ContextError::KeyNotFound(_)) => Ok(None),
            Err(err) => Err(err.wrap("while fetching tenant external id")),
        }
    }

    /// Fetch the tenant and require its region label.
    async fn lookup_with_region(
        &self,
        external: &str,
    ) -> ContextResult<Option<(String, String, std::collections::BTreeMap<String, serde_json::Value>)>>
    {
        match self.director.tenant_by_external_id(external).await {
            Ok(tenant) => {
                let region = tenant
                    .region_label()
                    .ok_or_else(|| {
                        ContextError::Internal(format!(
                            "region label not found for tenant with ID: {:?}",
                            external
                        ))
                    })?
                    .to_string();
                Ok(Some((tenant.internal_id.clone(), region, tenant.labels)))
            }
            Err(err) if err.is_not_found() => {
                info!("Tenant with external ID {} not found, proceeding without internal ID", external);
                Ok(None)
            }
            Err(err) => Err(err.wrap(format!(
                "while getting external tenant mapping [ExternalTenantID={}]",
                external
            ))),
        }
    }

    /// Integration systems take both tenant and scopes from the request.
    async fn resolve_integration_system(&self, data: &ReqData) -> ContextResult<Resolved> {
        let scopes = data.scopes().map_err(|e| e.wrap("while fetching scopes"))?;

        let Some(external) = self.request_tenant(data)? else {
            debug!("No external tenant on the request for an integration system call");
            return Ok(Resolved {
                tenant: TenantContext::default(),
                scopes,
                region: String::new(),
                labels: Default::default(),
            });
        };

        let resolved = self.lookup_with_region(&external).await?;
        let (internal, region, labels) = match resolved {
            Some(found) => found,
            None => (String::new(), String::new(), Default::default()),
        };

        Ok(Resolved {
            tenant: TenantContext::new(external, internal),
            scopes,
            region,
            labels,
        })
    }

    /// Applications and runtimes are pinned to the tenant on their
    /// system-auth record; a mismatching request tenant silently degrades
    /// to an unset internal id.
    async fn resolve_app_or_runtime(
        &self,
        data: &ReqData,
        sys_auth: &SystemAuth,
        consumer_type: ConsumerType,
        details: &AuthDetails,
    ) -> ContextResult<Resolved> {
        let auth_tenant = sys_auth.tenant_id.clone().ok_or_else(|| {
            ContextError::Internal("system auth tenant id cannot be nil".to_string())
        })?;

        let scopes = match details.auth_flow {
            AuthFlow::OAuth2 => data.scopes().map_err(|e| e.wrap("while fetching scopes"))?,
            _ => self
                .scopes
                .required_scopes(&format!(
                    "{}.{}",
                    SCOPES_PER_CONSUMER_TYPE_PREFIX,
                    consumer_type.scopes_segment()
                ))
                .map_err(|e| e.wrap("while fetching scopes"))?
                .join(" "),
        };

        let Some(external) = self.request_tenant(data)? else {
            return Ok(Resolved {
                tenant: TenantContext::new("", auth_tenant),
                scopes,
                region: String::new(),
                labels: Default::default(),
            });
        };

        let resolved = self.lookup_with_region(&external).await?;
        let (internal, region, labels) = match resolved {
            Some((internal, region, labels)) if internal == auth_tenant => {
                (internal, region, labels)
            }
            Some((_, region, labels)) => {
                // Tenant exists but is not the one this credential was
                // issued for: unset the internal id, never fail.
                info!(
                    "Request tenant {} does not match the system auth tenant, unsetting internal ID",
                    external
                );
                (String::new(), region, labels)
            }
            None => (String::new(), String::new(), Default::default()),
        };

        Ok(Resolved {
            tenant: TenantContext::new(external, internal),
            scopes,
            region,
            labels,
        })
    }

    /// Rebind the stored certificate common name to the presented one and
    /// clear any stale one-time token. Skipped when already bound.
    async fn rebind_cert_common_name(
        &self,
        sys_auth: &SystemAuth,
        details: &AuthDetails,
    ) -> ContextResult<()> {
        let Some(auth_value) = &sys_auth.auth else {
            return Ok(());
        };
        if auth_value.cert_common_name == details.auth_id {
            return Ok(());
        }

        let mut updated = sys_auth.clone();
        updated.auth = Some(crate::director::AuthValue {
            cert_common_name: details.auth_id.clone(),
            one_time_token: None,
        });
        info!("Rebinding certificate common name for system auth {}", sys_auth.id);
        self.director
            .update_system_auth(&updated)
            .await
            .map_err(|e| e.wrap("while updating system auth"))
    }

    async fn resolve(&self, data: &ReqData, details: &AuthDetails) -> ContextResult<ObjectContext> {
        let sys_auth = self
            .director
            .system_auth_by_id(&details.auth_id)
            .await
            .map_err(|e| e.wrap("while retrieving system auth from director"))?;

        let consumer_type = sys_auth.reference_type().ok_or_else(|| {
            ContextError::Internal(format!(
                "unknown reference object type for system auth with id {}",
                sys_auth.id
            ))
        })?;
        let consumer_id = sys_auth
            .reference_object_id()
            .unwrap_or_default()
            .to_string();

        let resolved = match consumer_type {
            ConsumerType::IntegrationSystem => self.resolve_integration_system(data).await,
            _ => {
                self.resolve_app_or_runtime(data, &sys_auth, consumer_type, details)
                    .await
            }
        }
        .map_err(|e| {
            e.wrap(format!(
                "while fetching the tenant and scopes for system auth with id: {}, object type: {}, using auth flow: {}",
                sys_auth.id, consumer_type, details.auth_flow
            ))
        })?;

        if details.auth_flow == AuthFlow::Certificate {
            self.rebind_cert_common_name(&sys_auth, details).await?;
        }

        Ok(ObjectContext {
            tenant: resolved.tenant,
            keys: KeysExtra::consumer(),
            scopes: resolved.scopes,
            region: resolved.region,
            consumer_id,
            auth_flow: details.auth_flow,
            consumer_type,
            context_provider: SYSTEM_AUTH_PROVIDER,
            tenant_labels: resolved.labels,
            ..Default::default()
        })
    }
}

impl ObjectContextProvider for SystemAuthContextProvider {
    fn match_request(&self, data: &ReqData) -> ContextResult<Option<AuthDetails>> {
        // Requests carrying authenticator coordinates belong to the
        // authenticator provider.
        if data.has_coordinates() {
            return Ok(None);
        }

        if let Some((client_id, issuer)) = data.certificate_signal() {
            if issuer != EXTERNAL_ISSUER {
                return Ok(Some(
                    AuthDetails::new(client_id, AuthFlow::Certificate).with_cert_issuer(issuer),
                ));
            }
        }

        if let Some(client_id) = data.body_header(CLIENT_ID_TOKEN_KEY) {
            if !client_id.is_empty() {
                return Ok(Some(AuthDetails::new(client_id, AuthFlow::OneTimeToken)));
            }
        }

        match data.extra_str(CLIENT_ID_KEY)? {
            Some(client_id) if !client_id.is_empty() => {
                Ok(Some(AuthDetails::new(client_id, AuthFlow::OAuth2)))
            }
            _ => Ok(None),
        }
    }

    fn object_context<'a>(
        &'a self,
        data: &'a ReqData,
        details: &'a AuthDetails,
    ) -> BoxFuture<'a, ContextResult<ObjectContext>> {
        Box::pin(self.resolve(data, details))
    }
}
