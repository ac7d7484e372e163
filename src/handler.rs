//! Request orchestration: run every provider, merge the matched contexts
//! into one authorization decision and write it back into the body.
//!
//! The pipeline is deliberately fail-open: a resolve failure or a request
//! no provider matches echoes the *unmodified* body with HTTP 200, so the
//! gateway forwards the request without an injected authorization context
//! rather than blocking it. Existing flows rely on this; do not tighten it
//! to fail-closed without a product decision.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::context::{
    CONSUMER_TENANT_KEY, EXTERNAL_TENANT_KEY, ObjectContext, PROVIDER_EXTERNAL_TENANT_KEY,
    PROVIDER_TENANT_KEY, ScopesMergeStrategy,
};
use crate::director::DirectorClient;
use crate::errors::{ContextError, ContextResult};
use crate::providers::{AUTHENTICATOR_PROVIDER, CERT_SERVICE_PROVIDER, CONSUMER_PROVIDER, ObjectContextProvider};
use crate::reqdata::{ReqBody, ReqData};

/// Output key for the escaped tenant-map string.
pub const TENANT_OUT_KEY: &str = "tenant";
/// Output key for the merged scope string.
pub const SCOPE_OUT_KEY: &str = "scope";
/// Output key for the attributed consumer id.
pub const CONSUMER_ID_OUT_KEY: &str = "consumerID";
/// Output key for the attributed consumer type.
pub const CONSUMER_TYPE_OUT_KEY: &str = "consumerType";
/// Output key for the authentication flow.
pub const FLOW_OUT_KEY: &str = "flow";
/// Output key for the delegated consumer id.
pub const ON_BEHALF_OF_OUT_KEY: &str = "onBehalfOf";
/// Output key for the resolved region.
pub const REGION_OUT_KEY: &str = "region";
/// Output key for the client id carried in the consumer token.
pub const TOKEN_CLIENT_ID_OUT_KEY: &str = "tokenClientID";

/// Orchestrates the registered providers for one request.
///
/// Providers are held as an ordered list; registration order is part of
/// the configuration and decides both context iteration order and the
/// `Override` short-circuit.
pub struct Hydrator {
    providers: Vec<(&'static str, Arc<dyn ObjectContextProvider>)>,
    director: Arc<dyn DirectorClient>,
    tenant_substitution_label: String,
}

struct Consumer {
    consumer_id: String,
    consumer_type: String,
    flow: String,
    on_behalf_of: String,
}

impl Hydrator {
    pub fn new(
        providers: Vec<(&'static str, Arc<dyn ObjectContextProvider>)>,
        director: Arc<dyn DirectorClient>,
        tenant_substitution_label: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            director,
            tenant_substitution_label: tenant_substitution_label.into(),
        }
    }

    /// Process one hydration request; always yields a body to echo.
    pub async fn process(&self, data: ReqData) -> ReqBody {
        let mut body = data.body.clone();

        debug!("Getting object context");
        let contexts = match self.object_contexts(&data).await {
            Ok(contexts) => contexts,
            Err(err) => {
                error!("An error occurred while getting object context: {}", err);
                return body;
            }
        };

        if contexts.is_empty() {
            error!("No object contexts were found while determining the auth details for the request");
            return body;
        }

        let names: Vec<&str> = contexts.iter().map(|c| c.context_provider).collect();
        info!("Matched object contexts: [{}]", names.join(","));

        let tenants = match self.calculate_tenants(&contexts).await {
            Ok(tenants) => tenants,
            Err(err) => {
                error!("An error occurred while calculating tenants: {}", err);
                return body;
            }
        };

        let tenants_json = match serde_json::to_string(&tenants) {
            Ok(json) => json,
            Err(err) => {
                error!("An error occurred while marshaling tenants: {}", err);
                return body;
            }
        };
        body.extra.insert(
            TENANT_OUT_KEY.to_string(),
            Value::String(tenants_json.replace('"', "\\\"")),
        );

        body.extra.insert(
            SCOPE_OUT_KEY.to_string(),
            Value::String(merge_scopes(&contexts)),
        );

        let region = derive_region(&contexts);
        let consumer = match attribute_consumer(&contexts, &region) {
            Ok(consumer) => consumer,
            Err(err) => {
                // Make sure no partial tenant context escapes.
                error!("An error occurred while adding consumers to the response: {}", err);
                body.extra = BTreeMap::new();
                return body;
            }
        };

        body.extra.insert(
            CONSUMER_ID_OUT_KEY.to_string(),
            Value::String(consumer.consumer_id),
        );
        body.extra.insert(
            CONSUMER_TYPE_OUT_KEY.to_string(),
            Value::String(consumer.consumer_type),
        );
        body.extra
            .insert(FLOW_OUT_KEY.to_string(), Value::String(consumer.flow));
        body.extra.insert(
            ON_BEHALF_OF_OUT_KEY.to_string(),
            Value::String(consumer.on_behalf_of),
        );
        body.extra
            .insert(REGION_OUT_KEY.to_string(), Value::String(region));
        body.extra.insert(
            TOKEN_CLIENT_ID_OUT_KEY.to_string(),
            Value::String(token_client_id(&contexts)),
        );

        body
    }

    /// Match every provider in registration order and resolve each match.
    /// Match failures exclude the provider; a resolve failure is fatal.
    async fn object_contexts(&self, data: &ReqData) -> ContextResult<Vec<ObjectContext>> {
        let mut contexts = Vec::with_capacity(self.providers.len());
        for (name, provider) in &self.providers {
            let details = match provider.match_request(data) {
                Ok(Some(details)) => details,
                Ok(None) => continue,
                Err(err) => {
                    warn!("Provider {} failed to match: {}", name, err);
                    continue;
                }
            };

            info!(
                "Provider {} matched with auth ID {} and flow {}",
                name, details.auth_id, details.auth_flow
            );
            let context = provider
                .object_context(data, &details)
                .await
                .map_err(|e| e.wrap("while getting object contexts"))?;
            debug!("Provider {} successfully provided object context", name);
            contexts.push(context);
        }
        Ok(contexts)
    }

    /// Collect every context's tenant pair under its own key names, alias
    /// provider keys to the consumer namespace when that is all we have,
    /// and apply the tenant-substitution label when present.
    async fn calculate_tenants(
        &self,
        contexts: &[ObjectContext],
    ) -> ContextResult<BTreeMap<String, String>> {
        let mut tenants = BTreeMap::new();
        let mut substitute = String::new();

        for ctx in contexts {
            tenants.insert(ctx.keys.tenant_key.clone(), ctx.tenant.tenant_id.clone());
            tenants.insert(
                ctx.keys.external_tenant_key.clone(),
                ctx.tenant.external_tenant_id.clone(),
            );

            if !self.tenant_substitution_label.is_empty() {
                if let Some(value) = ctx
                    .tenant_labels
                    .get(&self.tenant_substitution_label)
                    .and_then(Value::as_str)
                {
                    info!(
                        "Found label {} with value {} on tenant with external ID {}",
                        self.tenant_substitution_label, value, ctx.tenant.external_tenant_id
                    );
                    substitute = value.to_string();
                }
            }
        }

        // Downstream consumers always expect a consumer-tenant entry.
        let consumer_exists = tenants.contains_key(CONSUMER_TENANT_KEY);
        let external_exists = tenants.contains_key(EXTERNAL_TENANT_KEY);
        if !consumer_exists && !external_exists {
            let internal = tenants.get(PROVIDER_TENANT_KEY).cloned().unwrap_or_default();
            let external = tenants
                .get(PROVIDER_EXTERNAL_TENANT_KEY)
                .cloned()
                .unwrap_or_default();
            tenants.insert(CONSUMER_TENANT_KEY.to_string(), internal);
            tenants.insert(EXTERNAL_TENANT_KEY.to_string(), external);
        }

        if !substitute.is_empty() {
            let root = self
                .director
                .tenant_by_external_id(&substitute)
                .await
                .map_err(|e| {
                    e.wrap(format!(
                        "while fetching root tenant for tenant with external ID: {}",
                        substitute
                    ))
                })?;
            info!(
                "Substituting the caller tenant {} with root tenant with external ID {} and internal ID {}",
                tenants.get(EXTERNAL_TENANT_KEY).map(String::as_str).unwrap_or_default(),
                root.id,
                root.internal_id
            );

            let internal = tenants.get(CONSUMER_TENANT_KEY).cloned().unwrap_or_default();
            let external = tenants.get(EXTERNAL_TENANT_KEY).cloned().unwrap_or_default();
            tenants.insert(PROVIDER_TENANT_KEY.to_string(), internal);
            tenants.insert(PROVIDER_EXTERNAL_TENANT_KEY.to_string(), external);
            tenants.insert(CONSUMER_TENANT_KEY.to_string(), root.internal_id);
            tenants.insert(EXTERNAL_TENANT_KEY.to_string(), root.id);
        }

        Ok(tenants)
    }
}

/// Merge the contexts' scope sets with a single sequential pass.
///
/// `Override` replaces the accumulator and stops; `Merge` appends
/// (order-preserving, duplicates kept); `Intersect` seeds an empty
/// accumulator and set-intersects otherwise.
pub(crate) fn merge_scopes(contexts: &[ObjectContext]) -> String {
    let mut accumulator: Vec<String> = Vec::new();

    for ctx in contexts {
        let current: Vec<String> = ctx
            .scopes
            .split_whitespace()
            .map(str::to_string)
            .collect();

        match ctx.scopes_merge_strategy {
            ScopesMergeStrategy::Override => return current.join(" "),
            ScopesMergeStrategy::Merge => accumulator.extend(current),
            ScopesMergeStrategy::Intersect => {
                if accumulator.is_empty() {
                    accumulator = current;
                } else {
                    let keep: HashSet<String> = current.into_iter().collect();
                    accumulator.retain(|scope| keep.contains(scope));
                }
            }
        }
    }

    accumulator.join(" ")
}

/// The region of the merged decision: the first context carrying one.
///
/// Contexts whose tenant was not found carry no region, so this lands on
/// a context with an actually-resolved tenant.
fn derive_region(contexts: &[ObjectContext]) -> String {
    contexts
        .iter()
        .find(|c| !c.region.is_empty())
        .map(|c| c.region.clone())
        .unwrap_or_default()
}

/// Attribute the consumer identity: a single context supplies it directly;
/// with several, the certificate-service context is the primary identity
/// and the first other context becomes the delegated consumer.
fn attribute_consumer(contexts: &[ObjectContext], region: &str) -> ContextResult<Consumer> {
    if contexts.len() == 1 {
        let ctx = &contexts[0];
        return Ok(Consumer {
            consumer_id: ctx.consumer_id.clone(),
            consumer_type: ctx.consumer_type.as_str().to_string(),
            flow: ctx.auth_flow.as_str().to_string(),
            on_behalf_of: String::new(),
        });
    }

    let primary = contexts
        .iter()
        .find(|c| c.context_provider == CERT_SERVICE_PROVIDER);
    let on_behalf_of = contexts
        .iter()
        .find(|c| c.context_provider != CERT_SERVICE_PROVIDER)
        .map(|c| c.consumer_id.clone())
        .unwrap_or_default();

    if !on_behalf_of.is_empty() {
        // Delegation only works within one region; a mismatch must not
        // leak a half-merged context downstream.
        for ctx in contexts {
            if !ctx.tenant.tenant_id.is_empty() && ctx.region != region {
                let digest = Sha256::digest(ctx.consumer_id.as_bytes());
                return Err(ContextError::Internal(format!(
                    "mismatched region for consumer ID REDACTED_{:x}: actual {}, expected: {}",
                    digest, ctx.region, region
                )));
            }
        }
    }

    Ok(Consumer {
        consumer_id: primary.map(|c| c.consumer_id.clone()).unwrap_or_default(),
        consumer_type: primary
            .map(|c| c.consumer_type.as_str().to_string())
            .unwrap_or_default(),
        flow: primary
            .map(|c| c.auth_flow.as_str().to_string())
            .unwrap_or_default(),
        on_behalf_of,
    })
}

/// The consumer-token client id is taken only from authenticator or
/// consumer-provider contexts, never aggregated from arbitrary ones.
fn token_client_id(contexts: &[ObjectContext]) -> String {
    contexts
        .iter()
        .find(|c| {
            c.context_provider == AUTHENTICATOR_PROVIDER
                || c.context_provider == CONSUMER_PROVIDER
        })
        .map(|c| c.oauth_client_id.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AuthDetails, AuthFlow, ConsumerType, KeysExtra, TenantContext};
    use crate::errors::ContextError;
    use crate::providers::{SYSTEM_AUTH_PROVIDER, USER_PROVIDER};
    use crate::reqdata::ReqData;
    use crate::test_support::MockDirector;
    use crate::BoxFuture;
    use serde_json::json;

    fn ctx(strategy: ScopesMergeStrategy, scopes: &str) -> ObjectContext {
        ObjectContext {
            scopes: scopes.to_string(),
            scopes_merge_strategy: strategy,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_strategy_concatenates_without_dedup() {
        let contexts = vec![
            ctx(ScopesMergeStrategy::Merge, "x y"),
            ctx(ScopesMergeStrategy::Merge, "y z"),
        ];
        assert_eq!(merge_scopes(&contexts), "x y y z");
    }

    #[test]
    fn test_intersect_strategy_keeps_common_scopes() {
        let contexts = vec![
            ctx(ScopesMergeStrategy::Intersect, "x y z"),
            ctx(ScopesMergeStrategy::Intersect, "y z"),
        ];
        assert_eq!(merge_scopes(&contexts), "y z");
    }

    #[test]
    fn test_override_strategy_short_circuits() {
        let contexts = vec![
            ctx(ScopesMergeStrategy::Merge, "a b"),
            ctx(ScopesMergeStrategy::Override, "only these"),
            ctx(ScopesMergeStrategy::Merge, "c d"),
        ];
        assert_eq!(merge_scopes(&contexts), "only these");
    }

    #[test]
    fn test_intersect_seeds_empty_accumulator() {
        let contexts = vec![ctx(ScopesMergeStrategy::Intersect, "a b c")];
        assert_eq!(merge_scopes(&contexts), "a b c");
    }

    #[test]
    fn test_merge_then_intersect_in_sequence() {
        let contexts = vec![
            ctx(ScopesMergeStrategy::Merge, "application:read test"),
            ctx(ScopesMergeStrategy::Intersect, "test test1 test2"),
        ];
        assert_eq!(merge_scopes(&contexts), "test");
    }

    struct StubProvider {
        details: Option<AuthDetails>,
        match_error: Option<ContextError>,
        result: Result<ObjectContext, ContextError>,
    }

    impl StubProvider {
        fn matching(details: AuthDetails, context: ObjectContext) -> Self {
            Self {
                details: Some(details),
                match_error: None,
                result: Ok(context),
            }
        }

        fn not_matching() -> Self {
            Self {
                details: None,
                match_error: None,
                result: Ok(ObjectContext::default()),
            }
        }

        fn match_failing(err: ContextError) -> Self {
            Self {
                details: None,
                match_error: Some(err),
                result: Ok(ObjectContext::default()),
            }
        }

        fn resolve_failing(details: AuthDetails, err: ContextError) -> Self {
            Self {
                details: Some(details),
                match_error: None,
                result: Err(err),
            }
        }
    }

    impl ObjectContextProvider for StubProvider {
        fn match_request(&self, _data: &ReqData) -> ContextResult<Option<AuthDetails>> {
            if let Some(err) = &self.match_error {
                return Err(err.clone());
            }
            Ok(self.details.clone())
        }

        fn object_context<'a>(
            &'a self,
            _data: &'a ReqData,
            _details: &'a AuthDetails,
        ) -> BoxFuture<'a, ContextResult<ObjectContext>> {
            Box::pin(async move { self.result.clone() })
        }
    }

    fn hydrator(providers: Vec<(&'static str, Arc<dyn ObjectContextProvider>)>) -> Hydrator {
        Hydrator::new(providers, Arc::new(MockDirector::new()), "")
    }

    fn user_context() -> ObjectContext {
        ObjectContext {
            tenant: TenantContext::new("ext-1", "t-123"),
            keys: KeysExtra::consumer(),
            scopes: "application:read".to_string(),
            consumer_id: "admin".to_string(),
            auth_flow: AuthFlow::Jwt,
            consumer_type: ConsumerType::User,
            context_provider: USER_PROVIDER,
            region: "eu-1".to_string(),
            ..Default::default()
        }
    }

    fn cert_context() -> ObjectContext {
        ObjectContext {
            tenant: TenantContext::new("ext-prov", "ext-prov"),
            keys: KeysExtra::provider(),
            scopes: "test".to_string(),
            consumer_id: "T1".to_string(),
            auth_flow: AuthFlow::Certificate,
            consumer_type: ConsumerType::Runtime,
            context_provider: CERT_SERVICE_PROVIDER,
            region: "eu-1".to_string(),
            ..Default::default()
        }
    }

    fn authenticator_context() -> ObjectContext {
        ObjectContext {
            tenant: TenantContext::new("ext-1", "t-123"),
            keys: KeysExtra::consumer(),
            scopes: "test other".to_string(),
            consumer_id: "U1".to_string(),
            auth_flow: AuthFlow::Jwt,
            consumer_type: ConsumerType::User,
            context_provider: AUTHENTICATOR_PROVIDER,
            oauth_client_id: "client_id".to_string(),
            region: "eu-1".to_string(),
            ..Default::default()
        }
    }

    fn request_with_name() -> ReqData {
        ReqData::new(
            crate::reqdata::ReqBody {
                extra: serde_json::from_value(json!({ "name": "admin" })).unwrap(),
                ..Default::default()
            },
            Default::default(),
        )
    }

    fn extra_str<'a>(body: &'a ReqBody, key: &str) -> &'a str {
        body.extra.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_single_context_populates_response_extra() {
        let provider = StubProvider::matching(
            AuthDetails::new("admin", AuthFlow::Jwt),
            user_context(),
        );
        let hydrator = hydrator(vec![(USER_PROVIDER, Arc::new(provider))]);

        let body = hydrator.process(request_with_name()).await;

        assert_eq!(extra_str(&body, CONSUMER_ID_OUT_KEY), "admin");
        assert_eq!(extra_str(&body, CONSUMER_TYPE_OUT_KEY), "Static User");
        assert_eq!(extra_str(&body, FLOW_OUT_KEY), "JWT");
        assert_eq!(extra_str(&body, SCOPE_OUT_KEY), "application:read");
        assert_eq!(extra_str(&body, ON_BEHALF_OF_OUT_KEY), "");
        assert_eq!(extra_str(&body, REGION_OUT_KEY), "eu-1");
        assert_eq!(
            extra_str(&body, TENANT_OUT_KEY),
            "{\\\"consumerTenant\\\":\\\"t-123\\\",\\\"externalTenant\\\":\\\"ext-1\\\"}"
        );
        // Original claims survive alongside the injected ones.
        assert_eq!(extra_str(&body, "name"), "admin");
    }

    #[tokio::test]
    async fn test_provider_only_tenants_are_aliased_to_consumer_keys() {
        let provider = StubProvider::matching(
            AuthDetails::new("ext-prov", AuthFlow::Certificate),
            cert_context(),
        );
        let hydrator = hydrator(vec![(CERT_SERVICE_PROVIDER, Arc::new(provider))]);

        let body = hydrator.process(ReqData::default()).await;

        let tenant = extra_str(&body, TENANT_OUT_KEY).replace("\\\"", "\"");
        let map: BTreeMap<String, String> = serde_json::from_str(&tenant).unwrap();
        assert_eq!(map["providerTenant"], "ext-prov");
        assert_eq!(map["providerExternalTenant"], "ext-prov");
        assert_eq!(map["consumerTenant"], "ext-prov");
        assert_eq!(map["externalTenant"], "ext-prov");
    }

    #[tokio::test]
    async fn test_delegation_attributes_primary_and_on_behalf_of() {
        let cert = StubProvider::matching(
            AuthDetails::new("ext-prov", AuthFlow::Certificate),
            cert_context(),
        );
        let authn = StubProvider::matching(
            AuthDetails::new("U1", AuthFlow::Jwt),
            authenticator_context(),
        );
        let hydrator = hydrator(vec![
            (AUTHENTICATOR_PROVIDER, Arc::new(authn) as Arc<dyn ObjectContextProvider>),
            (CERT_SERVICE_PROVIDER, Arc::new(cert)),
        ]);

        let body = hydrator.process(ReqData::default()).await;

        assert_eq!(extra_str(&body, CONSUMER_ID_OUT_KEY), "T1");
        assert_eq!(extra_str(&body, CONSUMER_TYPE_OUT_KEY), "Runtime");
        assert_eq!(extra_str(&body, FLOW_OUT_KEY), "Certificate");
        assert_eq!(extra_str(&body, ON_BEHALF_OF_OUT_KEY), "U1");
        assert_eq!(extra_str(&body, TOKEN_CLIENT_ID_OUT_KEY), "client_id");
        // Both intersect: common scopes survive.
        assert_eq!(extra_str(&body, SCOPE_OUT_KEY), "test");

        let tenant = extra_str(&body, TENANT_OUT_KEY).replace("\\\"", "\"");
        let map: BTreeMap<String, String> = serde_json::from_str(&tenant).unwrap();
        assert_eq!(map["consumerTenant"], "t-123");
        assert_eq!(map["externalTenant"], "ext-1");
        assert_eq!(map["providerTenant"], "ext-prov");
        assert_eq!(map["providerExternalTenant"], "ext-prov");
    }

    #[tokio::test]
    async fn test_region_mismatch_during_delegation_clears_extra() {
        let mut other_region = authenticator_context();
        other_region.region = "eu-2".to_string();
        let cert = StubProvider::matching(
            AuthDetails::new("ext-prov", AuthFlow::Certificate),
            cert_context(),
        );
        let authn = StubProvider::matching(AuthDetails::new("U1", AuthFlow::Jwt), other_region);
        let hydrator = hydrator(vec![
            (CERT_SERVICE_PROVIDER, Arc::new(cert) as Arc<dyn ObjectContextProvider>),
            (AUTHENTICATOR_PROVIDER, Arc::new(authn)),
        ]);

        let body = hydrator.process(request_with_name()).await;

        assert!(body.extra.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_error_falls_back_to_unmodified_body() {
        let provider = StubProvider::resolve_failing(
            AuthDetails::new("admin", AuthFlow::Jwt),
            ContextError::Internal("boom".to_string()),
        );
        let hydrator = hydrator(vec![(USER_PROVIDER, Arc::new(provider))]);
        let data = request_with_name();
        let original = data.body.clone();

        let body = hydrator.process(data).await;

        assert_eq!(body, original);
    }

    #[tokio::test]
    async fn test_no_matches_falls_back_to_unmodified_body() {
        let hydrator = hydrator(vec![(
            USER_PROVIDER,
            Arc::new(StubProvider::not_matching()) as Arc<dyn ObjectContextProvider>,
        )]);
        let data = request_with_name();
        let original = data.body.clone();

        let body = hydrator.process(data).await;

        assert_eq!(body, original);
    }

    #[tokio::test]
    async fn test_match_error_excludes_provider_but_is_not_fatal() {
        let failing = StubProvider::match_failing(ContextError::Internal("bad claim".to_string()));
        let matching = StubProvider::matching(
            AuthDetails::new("admin", AuthFlow::Jwt),
            user_context(),
        );
        let hydrator = hydrator(vec![
            (SYSTEM_AUTH_PROVIDER, Arc::new(failing) as Arc<dyn ObjectContextProvider>),
            (USER_PROVIDER, Arc::new(matching)),
        ]);

        let body = hydrator.process(request_with_name()).await;

        assert_eq!(extra_str(&body, CONSUMER_ID_OUT_KEY), "admin");
    }

    #[tokio::test]
    async fn test_tenant_substitution_promotes_root_tenant() {
        let mut context = user_context();
        context.tenant_labels =
            serde_json::from_value(json!({ "customerId": "root-ext" })).unwrap();
        let provider = StubProvider::matching(AuthDetails::new("admin", AuthFlow::Jwt), context);
        let director = Arc::new(MockDirector::new().with_tenant(crate::director::Tenant {
            id: "root-ext".to_string(),
            internal_id: "root-int".to_string(),
            ..Default::default()
        }));
        let hydrator = Hydrator::new(
            vec![(USER_PROVIDER, Arc::new(provider))],
            director,
            "customerId",
        );

        let body = hydrator.process(request_with_name()).await;

        let tenant = extra_str(&body, TENANT_OUT_KEY).replace("\\\"", "\"");
        let map: BTreeMap<String, String> = serde_json::from_str(&tenant).unwrap();
        assert_eq!(map["consumerTenant"], "root-int");
        assert_eq!(map["externalTenant"], "root-ext");
        assert_eq!(map["providerTenant"], "t-123");
        assert_eq!(map["providerExternalTenant"], "ext-1");
    }

    #[tokio::test]
    async fn test_substitution_lookup_failure_falls_back() {
        let mut context = user_context();
        context.tenant_labels =
            serde_json::from_value(json!({ "customerId": "missing-root" })).unwrap();
        let provider = StubProvider::matching(AuthDetails::new("admin", AuthFlow::Jwt), context);
        let hydrator = Hydrator::new(
            vec![(USER_PROVIDER, Arc::new(provider))],
            Arc::new(MockDirector::new()),
            "customerId",
        );
        let data = request_with_name();
        let original = data.body.clone();

        let body = hydrator.process(data).await;

        assert_eq!(body, original);
    }
}
