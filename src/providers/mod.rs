//! Object-context providers: the matching/resolution strategies.
//!
//! Each provider is a self-contained strategy over the request data. The
//! match step is a pure predicate — a match error only excludes that
//! provider from the request. The resolve step may call collaborators and
//! a failure there aborts the whole pipeline (the handler then falls back
//! to the unmodified body).
//!
//! Strategies within one class (e.g. the system-auth flows) are mutually
//! exclusive; strategies across classes may co-match on one request, which
//! is how the on-behalf-of composite forms.

mod access_level;
mod authenticator;
mod cert_service;
mod consumer;
mod system_auth;
mod user;

pub use access_level::AccessLevelContextProvider;
pub use authenticator::AuthenticatorContextProvider;
pub use cert_service::CertServiceContextProvider;
pub use consumer::ConsumerContextProvider;
pub use system_auth::SystemAuthContextProvider;
pub use user::UserContextProvider;

use crate::BoxFuture;
use crate::context::{AuthDetails, ObjectContext};
use crate::errors::ContextResult;
use crate::reqdata::ReqData;

/// Tag of the static-user/group provider.
pub const USER_PROVIDER: &str = "user";
/// Tag of the system-auth provider (OAuth2 / certificate / one-time token).
pub const SYSTEM_AUTH_PROVIDER: &str = "system_auth";
/// Tag of the custom-authenticator provider.
pub const AUTHENTICATOR_PROVIDER: &str = "authenticator";
/// Tag of the certificate-service provider.
pub const CERT_SERVICE_PROVIDER: &str = "cert_service";
/// Tag of the access-level provider.
pub const ACCESS_LEVEL_PROVIDER: &str = "access_level";
/// Tag of the acting-on-behalf-of consumer provider.
pub const CONSUMER_PROVIDER: &str = "consumer_provider";

/// A matching/resolution strategy.
pub trait ObjectContextProvider: Send + Sync {
    /// Pure predicate over the request. `Ok(None)` means no match;
    /// an error is logged by the handler and treated as a non-match.
    fn match_request(&self, data: &ReqData) -> ContextResult<Option<AuthDetails>>;

    /// Resolve the full object context for a matched request. May perform
    /// I/O; an error here is fatal to the whole pipeline.
    fn object_context<'a>(
        &'a self,
        data: &'a ReqData,
        details: &'a AuthDetails,
    ) -> BoxFuture<'a, ContextResult<ObjectContext>>;
}
