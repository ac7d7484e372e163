//! Access-level provider.
//!
//! Handles externally-issued certificates whose claims restrict the tenant
//! types they may act on. This is the one provider that can turn a resolved
//! tenant into an outright denial instead of a degrade.

use std::sync::Arc;

use tracing::info;

use crate::BoxFuture;
use crate::context::{
    AuthDetails, AuthFlow, ConsumerType, KeysExtra, ObjectContext, TenantContext,
};
use crate::director::DirectorClient;
use crate::errors::{ContextError, ContextResult};
use crate::providers::{ACCESS_LEVEL_PROVIDER, ObjectContextProvider};
use crate::reqdata::{CONSUMER_TYPE_KEY, EXTERNAL_ISSUER, GLOBAL_ACCESS_LEVEL, ReqData};
use crate::scopes::{SCOPES_PER_CONSUMER_TYPE_PREFIX, ScopesGetter};

/// Provider for certificates restricted to a subset of tenant types.
pub struct AccessLevelContextProvider {
    director: Arc<dyn DirectorClient>,
    scopes: Arc<dyn ScopesGetter>,
}

impl AccessLevelContextProvider {
    pub fn new(director: Arc<dyn DirectorClient>, scopes: Arc<dyn ScopesGetter>) -> Self {
        Self { director, scopes }
    }

    async fn resolve(&self, data: &ReqData, details: &AuthDetails) -> ContextResult<ObjectContext> {
        let consumer_type = data
            .extra_str(CONSUMER_TYPE_KEY)?
            .and_then(ConsumerType::parse)
            .ok_or_else(|| {
                ContextError::InvalidData(
                    "missing or unknown consumer type on access-level request".to_string(),
                )
            })?;

        let scopes = self
            .scopes
            .required_scopes(&format!(
                "{}.{}",
                SCOPES_PER_CONSUMER_TYPE_PREFIX,
                consumer_type.scopes_segment()
            ))
            .map_err(|_| {
                ContextError::Internal(format!(
                    "failed to extract scopes for consumer with type {}",
                    consumer_type.as_str().to_lowercase()
                ))
            })?
            .join(" ");

        let access_levels = data.access_levels();

        let external = match data.external_tenant_id() {
            Ok(id) => id,
            Err(ContextError::KeyNotFound(_)) => {
                // No tenant on the request: only globally-entitled
                // certificates may proceed.
                if !access_levels.iter().any(|l| l == GLOBAL_ACCESS_LEVEL) {
                    return Err(ContextError::Unauthorized(format!(
                        "Certificate with auth ID {} does not have global access",
                        details.auth_id
                    )));
                }
                return Ok(self.context(details, TenantContext::default(), scopes, "", Default::default(), consumer_type));
            }
            Err(err) => return Err(err),
        };

        let tenant = match self.director.tenant_by_external_id(&external).await {
            Ok(tenant) => tenant,
            Err(err) if err.is_not_found() => {
                // Unknown tenants cannot be type-checked; the internal id
                // degrades to empty and resolution continues.
                info!("Tenant with external ID {} not found, proceeding without internal ID", external);
                return Ok(self.context(
                    details,
                    TenantContext::new(external, ""),
                    scopes,
                    "",
                    Default::default(),
                    consumer_type,
                ));
            }
            Err(err) => {
                return Err(err.wrap(format!(
                    "while getting external tenant mapping [ExternalTenantID={}]",
                    external
                )));
            }
        };

        if !access_levels.iter().any(|l| l == &tenant.tenant_type) {
            return Err(ContextError::Unauthorized(format!(
                "Certificate with auth ID {} has no access to {} tenant with ID {}",
                details.auth_id, tenant.tenant_type, external
            )));
        }

        let region = tenant.region_label().unwrap_or_default().to_string();
        Ok(self.context(
            details,
            TenantContext::new(external, tenant.internal_id.clone()),
            scopes,
            &region,
            tenant.labels,
            consumer_type,
        ))
    }

    fn context(
        &self,
        details: &AuthDetails,
        tenant: TenantContext,
        scopes: String,
        region: &str,
        labels: std::collections::BTreeMap<String, serde_json::Value>,
        consumer_type: ConsumerType,
    ) -> ObjectContext {
        ObjectContext {
            tenant,
            keys: KeysExtra::consumer(),
            scopes,
            region: region.to_string(),
            consumer_id: details.auth_id.clone(),
            auth_flow: details.auth_flow,
            consumer_type,
            context_provider: ACCESS_LEVEL_PROVIDER,
            tenant_labels: labels,
            ..Default::default()
        }
    }
}

impl ObjectContextProvider for AccessLevelContextProvider {
    fn match_request(&self, data: &ReqData) -> ContextResult<Option<AuthDetails>> {
        if data.access_levels().is_empty() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::Tenant;
    use crate::reqdata::{CLIENT_ID_CERT_ISSUER_KEY, CLIENT_ID_CERT_KEY, ReqBody};
    use crate::test_support::{FixedScopes, MockDirector};
    use serde_json::json;
    use std::collections::BTreeMap;

    const AUTH_ID: &str = "provider-tenant-1";
    const CONSUMER_TENANT: &str = "consumer-tenant-1";

    fn is_scopes() -> Arc<FixedScopes> {
        Arc::new(FixedScopes::new().with_entry(
            "scopesPerConsumerType.integration_system",
            &["runtime:read", "runtime:write", "tenant:read"],
        ))
    }

    fn subaccount() -> Tenant {
        Tenant {
            id: CONSUMER_TENANT.to_string(),
            internal_id: "internal-subaccount".to_string(),
            tenant_type: "subaccount".to_string(),
            labels: serde_json::from_value(json!({ "region": "eu-1" })).unwrap(),
            ..Default::default()
        }
    }

    fn data(extra: serde_json::Value) -> ReqData {
        ReqData::new(
            ReqBody {
                extra: serde_json::from_value(extra).unwrap(),
                ..Default::default()
            },
            BTreeMap::new(),
        )
    }

    fn details() -> AuthDetails {
        AuthDetails::new(AUTH_ID, AuthFlow::Certificate).with_cert_issuer(EXTERNAL_ISSUER)
    }

    fn subaccount_request() -> ReqData {
        data(json!({
            "consumer_type": "Integration System",
            "tenant_access_levels": ["subaccount"],
            "tenant": CONSUMER_TENANT,
        }))
    }

    #[tokio::test]
    async fn test_success_when_tenant_type_is_granted() {
        let director = Arc::new(MockDirector::new().with_tenant(subaccount()));
        let provider = AccessLevelContextProvider::new(director, is_scopes());

        let ctx = provider
            .object_context(&subaccount_request(), &details())
            .await
            .unwrap();

        assert_eq!(ctx.consumer_type, ConsumerType::IntegrationSystem);
        assert_eq!(ctx.consumer_id, AUTH_ID);
        assert_eq!(ctx.tenant.tenant_id, "internal-subaccount");
        assert_eq!(ctx.scopes, "runtime:read runtime:write tenant:read");
        assert_eq!(ctx.region, "eu-1");
    }

    #[tokio::test]
    async fn test_denial_names_tenant_type_and_auth_id() {
        let account = Tenant {
            id: CONSUMER_TENANT.to_string(),
            internal_id: "internal-account".to_string(),
            tenant_type: "account".to_string(),
            ..Default::default()
        };
        let director = Arc::new(MockDirector::new().with_tenant(account));
        let provider = AccessLevelContextProvider::new(director, is_scopes());

        let err = provider
            .object_context(&subaccount_request(), &details())
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains(&format!(
            "Certificate with auth ID {} has no access to account tenant with ID {}",
            AUTH_ID, CONSUMER_TENANT
        )));
    }

    #[tokio::test]
    async fn test_not_found_tenant_skips_access_check() {
        let provider =
            AccessLevelContextProvider::new(Arc::new(MockDirector::new()), is_scopes());

        let ctx = provider
            .object_context(&subaccount_request(), &details())
            .await
            .unwrap();

        assert_eq!(ctx.tenant.external_tenant_id, CONSUMER_TENANT);
        assert_eq!(ctx.tenant.tenant_id, "");
        assert_eq!(ctx.scopes, "runtime:read runtime:write tenant:read");
    }

    #[tokio::test]
    async fn test_global_access_allows_calls_without_tenant() {
        let provider =
            AccessLevelContextProvider::new(Arc::new(MockDirector::new()), is_scopes());
        let data = data(json!({
            "consumer_type": "Integration System",
            "tenant_access_levels": ["global"],
        }));

        let ctx = provider.object_context(&data, &details()).await.unwrap();

        assert_eq!(ctx.tenant, TenantContext::default());
        assert_eq!(ctx.scopes, "runtime:read runtime:write tenant:read");
    }

    #[tokio::test]
    async fn test_missing_tenant_without_global_access_is_denied() {
        let provider =
            AccessLevelContextProvider::new(Arc::new(MockDirector::new()), is_scopes());
        let data = data(json!({
            "consumer_type": "Integration System",
            "tenant_access_levels": ["subaccount"],
        }));

        let err = provider.object_context(&data, &details()).await.unwrap_err();

        assert!(err.to_string().contains(&format!(
            "Certificate with auth ID {} does not have global access",
            AUTH_ID
        )));
    }

    #[tokio::test]
    async fn test_director_failure_is_fatal() {
        let director = Arc::new(MockDirector::new().with_tenant_error(
            CONSUMER_TENANT,
            ContextError::Director("test error".to_string()),
        ));
        let provider = AccessLevelContextProvider::new(director, is_scopes());

        let err = provider
            .object_context(&subaccount_request(), &details())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("test error"));
    }

    #[tokio::test]
    async fn test_scopes_failure_is_fatal() {
        let scopes = Arc::new(FixedScopes::new().with_error(ContextError::Internal(
            "test error".to_string(),
        )));
        let provider = AccessLevelContextProvider::new(Arc::new(MockDirector::new()), scopes);

        let err = provider
            .object_context(&subaccount_request(), &details())
            .await
            .unwrap_err();

        assert!(err.to_string().contains(
            "failed to extract scopes for consumer with type integration system"
        ));
    }

    #[test]
    fn test_match_requires_access_levels_and_external_issuer() {
        let provider = AccessLevelContextProvider::new(
            Arc::new(MockDirector::new()),
            Arc::new(FixedScopes::new()),
        );

        let mut headers = BTreeMap::new();
        headers.insert(CLIENT_ID_CERT_KEY.to_string(), vec![AUTH_ID.to_string()]);
        headers.insert(
            CLIENT_ID_CERT_ISSUER_KEY.to_string(),
            vec![EXTERNAL_ISSUER.to_string()],
        );
        let matched = ReqData::new(
            ReqBody {
                extra: serde_json::from_value(json!({ "tenant_access_levels": ["account"] }))
                    .unwrap(),
                header: Some(headers.clone()),
                ..Default::default()
            },
            BTreeMap::new(),
        );
        let details = provider.match_request(&matched).unwrap().unwrap();
        assert_eq!(details.auth_flow, AuthFlow::Certificate);
        assert_eq!(details.auth_id, AUTH_ID);

        // No access levels: not our request.
        let no_levels = ReqData::new(
            ReqBody {
                header: Some(headers.clone()),
                ..Default::default()
            },
            BTreeMap::new(),
        );
        assert!(provider.match_request(&no_levels).unwrap().is_none());

        // Wrong issuer: not our request.
        let mut wrong_issuer = headers;
        wrong_issuer.remove(CLIENT_ID_CERT_ISSUER_KEY);
        let wrong = ReqData::new(
            ReqBody {
                extra: serde_json::from_value(json!({ "tenant_access_levels": ["account"] }))
                    .unwrap(),
                header: Some(wrong_issuer),
                ..Default::default()
            },
            BTreeMap::new(),
        );
        assert!(provider.match_request(&wrong).unwrap().is_none());
    }
}
