// Core modules
mod authenticators;
mod config;
pub mod context;
mod director;
mod errors;
mod handler;
pub mod providers;
pub mod reqdata;
mod scopes;
mod statics;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types and functions
pub use authenticators::{AuthenticatorConfig, Coordinates, load_authenticators};
pub use config::{AppConfig, ConsumerClaimsKeys};
pub use context::{
    AuthDetails, AuthFlow, ConsumerType, KeysExtra, ObjectContext, ScopesMergeStrategy,
    TenantContext,
};
pub use director::{DirectorClient, GraphqlDirector, SystemAuth, Tenant, TenantInput};
pub use errors::{ContextError, ContextResult};
pub use handler::Hydrator;
pub use providers::{
    AccessLevelContextProvider, AuthenticatorContextProvider, CertServiceContextProvider,
    ConsumerContextProvider, ObjectContextProvider, SystemAuthContextProvider,
    UserContextProvider,
};
pub use reqdata::{ReqBody, ReqData};
pub use scopes::{FileScopes, ScopesGetter};
pub use statics::{StaticGroup, StaticGroupRepository, StaticUser, StaticUserRepository};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use url::Url;

use providers::{
    ACCESS_LEVEL_PROVIDER, AUTHENTICATOR_PROVIDER, CERT_SERVICE_PROVIDER, CONSUMER_PROVIDER,
    SYSTEM_AUTH_PROVIDER, USER_PROVIDER,
};

/// Boxed future used by the object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Convenience function to wire a fully configured hydrator.
///
/// Loads the static tables, builds the Director client and registers the
/// providers in their configuration-defined order: user, system auth,
/// authenticator, certificate service, access level, consumer provider.
/// The order is part of the contract — it decides context iteration and
/// the `Override` scope short-circuit.
pub fn build_hydrator(config: &AppConfig) -> Result<Arc<Hydrator>> {
    let endpoint = Url::parse(&config.director_url)?;
    let director: Arc<dyn DirectorClient> = Arc::new(GraphqlDirector::new(endpoint)?);

    let scopes: Arc<dyn ScopesGetter> = Arc::new(FileScopes::load(&config.scopes_file)?);
    let users = Arc::new(StaticUserRepository::load(&config.static_users_file)?);
    let groups = match &config.static_groups_file {
        Some(path) => Some(Arc::new(StaticGroupRepository::load(path)?)),
        None => None,
    };
    let authenticators = match &config.authenticators_file {
        Some(path) => load_authenticators(path)?,
        None => Vec::new(),
    };

    let providers: Vec<(&'static str, Arc<dyn ObjectContextProvider>)> = vec![
        (
            USER_PROVIDER,
            Arc::new(UserContextProvider::new(
                director.clone(),
                users,
                groups,
                authenticators.clone(),
            )),
        ),
        (
            SYSTEM_AUTH_PROVIDER,
            Arc::new(SystemAuthContextProvider::new(
                director.clone(),
                scopes.clone(),
            )),
        ),
        (
            AUTHENTICATOR_PROVIDER,
            Arc::new(AuthenticatorContextProvider::new(
                director.clone(),
                authenticators,
            )),
        ),
        (
            CERT_SERVICE_PROVIDER,
            Arc::new(CertServiceContextProvider::new(
                director.clone(),
                scopes.clone(),
            )),
        ),
        (
            ACCESS_LEVEL_PROVIDER,
            Arc::new(AccessLevelContextProvider::new(
                director.clone(),
                scopes.clone(),
            )),
        ),
        (
            CONSUMER_PROVIDER,
            Arc::new(ConsumerContextProvider::new(
                director.clone(),
                config.consumer_claims_keys.clone(),
            )),
        ),
    ];

    Ok(Arc::new(Hydrator::new(
        providers,
        director,
        config.tenant_substitution_label_key.clone(),
    )))
}
