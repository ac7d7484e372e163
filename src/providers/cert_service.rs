//! Certificate-service provider.
//!
//! Handles certificates issued by the external certificate service, where
//! the client id from the certificate *is* the external tenant id — no
//! claim parsing involved. Requests that additionally carry tenant access
//! levels belong to the access-level provider.

use std::sync::Arc;

use tracing::info;

use crate::BoxFuture;
use crate::context::{
    AuthDetails, AuthFlow, ConsumerType, KeysExtra, ObjectContext, TenantContext,
};
use crate::director::DirectorClient;
use crate::errors::{ContextError, ContextResult};
use crate::providers::{CERT_SERVICE_PROVIDER, ObjectContextProvider};
use crate::reqdata::{CONSUMER_TYPE_KEY, EXTERNAL_ISSUER, INTERNAL_CONSUMER_ID_KEY, ReqData};
use crate::scopes::{SCOPES_PER_CONSUMER_TYPE_PREFIX, ScopesGetter};

/// Provider for externally-issued certificates carrying the tenant directly.
pub struct CertServiceContextProvider {
    director: Arc<dyn DirectorClient>,
    scopes: Arc<dyn ScopesGetter>,
}

impl CertServiceContextProvider {
    pub fn new(director: Arc<dyn DirectorClient>, scopes: Arc<dyn ScopesGetter>) -> Self {
        Self { director, scopes }
    }

    fn consumer_type(&self, data: &ReqData) -> ContextResult<ConsumerType> {
        match data.extra_str(CONSUMER_TYPE_KEY)? {
            Some(raw) => ConsumerType::parse(raw).ok_or_else(|| {
                ContextError::InvalidData(format!("unknown consumer type: {}", raw))
            }),
            None => Ok(ConsumerType::Runtime),
        }
    }

    async fn resolve(&self, data: &ReqData, details: &AuthDetails) -> ContextResult<ObjectContext> {
        let consumer_type = self.consumer_type(data)?;
        let scopes = self
            .scopes
            .required_scopes(&format!(
                "{}.{}",
                SCOPES_PER_CONSUMER_TYPE_PREFIX,
                consumer_type.scopes_segment()
            ))
            .map_err(|e| e.wrap("while fetching scopes"))?
            .join(" ");

        // The auth id is the external tenant id; scopes stay meaningful
        // even when the tenant is unknown downstream.
        let external = details.auth_id.as_str();
        let (tenant, region, labels) = match self.director.tenant_by_external_id(external).await {
            Ok(found) => (
                TenantContext::new(external, found.internal_id.clone()),
                found.region_label().unwrap_or_default().to_string(),
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

        let consumer_id = data
            .extra_str(INTERNAL_CONSUMER_ID_KEY)?
            .unwrap_or(external)
            .to_string();

        Ok(ObjectContext {
            tenant,
            keys: KeysExtra::provider(),
            scopes,
            region,
            consumer_id,
            auth_flow: details.auth_flow,
            consumer_type,
            context_provider: CERT_SERVICE_PROVIDER,
            tenant_labels: labels,
            ..Default::default()
        })
    }
}

impl ObjectContextProvider for CertServiceContextProvider {
    fn match_request(&self, data: &ReqData) -> ContextResult<Option<AuthDetails>> {
        // Requests granted explicit access levels belong to the
        // access-level provider.
        if !data.access_levels().is_empty() {
            return Ok(None);
        }

        match data.certificate_signal() {
            Some((client_id, issuer)) if issuer == EXTERNAL_ISSUER => Ok(Some(
                AuthDetails::new(client_id, AuthFlow::Certificate).with_cert_issuer(issuer),
            )),
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
