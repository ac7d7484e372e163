//! Static-user/group provider.
//!
//! Matches requests the upstream proxy attributed to a named user (a `name`
//! claim in the extra map). Scopes come, in order of precedence, from the
//! static group table, from the request's own `scope` claim, or from the
//! static user entry itself.

use std::sync::Arc;

use tracing::{debug, info};

use crate::BoxFuture;
use crate::authenticators::AuthenticatorConfig;
use crate::context::{AuthDetails, AuthFlow, ConsumerType, KeysExtra, ObjectContext, TenantContext};
use crate::director::DirectorClient;
use crate::errors::{ContextError, ContextResult};
use crate::providers::{ObjectContextProvider, USER_PROVIDER};
use crate::reqdata::{ReqData, USERNAME_KEY};
use crate::statics::{StaticGroupRepository, StaticUserRepository};

/// Provider for statically configured users and groups.
pub struct UserContextProvider {
    director: Arc<dyn DirectorClient>,
    users: Arc<StaticUserRepository>,
    groups: Option<Arc<StaticGroupRepository>>,
    /// Known authenticators; requests owned by one of them are skipped.
    authenticators: Vec<AuthenticatorConfig>,
}

impl UserContextProvider {
    pub fn new(
        director: Arc<dyn DirectorClient>,
        users: Arc<StaticUserRepository>,
        groups: Option<Arc<StaticGroupRepository>>,
        authenticators: Vec<AuthenticatorConfig>,
    ) -> Self {
        Self {
            director,
            users,
            groups,
            authenticators,
        }
    }

    /// Scopes from the static group table, deduplicated, first occurrence
    /// order preserved. Empty when no requested group is known.
    fn group_scopes(&self, data: &ReqData) -> Vec<String> {
        let names = data.groups();
        if names.is_empty() {
            return Vec::new();
        }
        let Some(repo) = &self.groups else {
            return Vec::new();
        };
        let mut seen = std::collections::HashSet::new();
        let mut scopes = Vec::new();
        for group in repo.get(&names) {
            for scope in group.scopes {
                if seen.insert(scope.clone()) {
                    scopes.push(scope);
                }
            }
        }
        scopes
    }

    /// External tenant id from the request; absence is tolerated.
    fn request_tenant(&self, data: &ReqData, username: &str) -> ContextResult<Option<String>> {
        match data.external_tenant_id() {
            Ok(id) => Ok(Some(id)),
            Err(ContextError::KeyNotFound(_)) => Ok(None),
            Err(err) => Err(err.wrap(format!("could not parse external ID for user: {}", username))),
        }
    }

    async fn resolve(&self, data: &ReqData, details: &AuthDetails) -> ContextResult<ObjectContext> {
        let username = details.auth_id.as_str();

        let group_scopes = self.group_scopes(data);
        let scopes = if !group_scopes.is_empty() {
            debug!("Using scopes from static groups for user {}", username);
            group_scopes.join(" ")
        } else {
            let user = self.users.get(username).map_err(|e| {
                e.wrap(format!("while getting user data for user: {}", username))
            })?;

            let request_scopes = match data.scopes() {
                Ok(s) => Some(s),
                Err(ContextError::KeyNotFound(_)) => None,
                Err(err) => {
                    return Err(err.wrap(format!(
                        "while getting user data for user: {}: while fetching scopes",
                        username
                    )));
                }
            };

            // The tenant from the request must be one the static user is
            // allowed to act in; checked below only on the user path, the
            // group table carries its own authority.
            if let Some(external) = self.request_tenant(data, username)? {
                if !user.tenants.contains(&external) {
                    return Err(ContextError::Internal(format!(
                        "Static tenant with username: {} mismatch external tenant: {}",
                        username, external
                    )));
                }
            }

            request_scopes.unwrap_or_else(|| user.scopes.join(" "))
        };

        let mut tenant = TenantContext::default();
        let mut region = String::new();
        let mut labels = Default::default();
        if let Some(external) = self.request_tenant(data, username)? {
            match self.director.tenant_by_external_id(&external).await {
                Ok(found) => {
                    region = found.region_label().unwrap_or_default().to_string();
                    labels = found.labels;
                    tenant = TenantContext::new(external, found.internal_id);
                }
                Err(err) if err.is_not_found() => {
                    info!("Tenant with external ID {} not found, proceeding without internal ID", external);
                    tenant = TenantContext::new(external, "");
                }
                Err(err) => {
                    return Err(err.wrap(format!(
                        "while getting external tenant mapping [ExternalTenantID={}]",
                        external
                    )));
                }
            }
        }

        Ok(ObjectContext {
            tenant,
            keys: KeysExtra::consumer(),
            scopes,
            region,
            consumer_id: username.to_string(),
            auth_flow: details.auth_flow,
            consumer_type: ConsumerType::User,
            context_provider: USER_PROVIDER,
            tenant_labels: labels,
            ..Default::default()
        })
    }
}

impl ObjectContextProvider for UserContextProvider {
    fn match_request(&self, data: &ReqData) -> ContextResult<Option<AuthDetails>> {
        // A request carrying coordinates of a known authenticator belongs
        // to the authenticator provider.
        if let Some(coords) = data.coordinates() {
            if self.authenticators.iter().any(|a| a.name == coords.name) {
                return Ok(None);
            }
        }

        match data.extra_str(USERNAME_KEY)? {
            Some(username) if !username.is_empty() => {
                Ok(Some(AuthDetails::new(username, AuthFlow::Jwt)))
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
