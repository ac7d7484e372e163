//! Per-request value types for the hydration request.
//!
//! `ReqBody` is the wire shape exchanged with the gateway's authorization
//! hook: the body is echoed back (enriched or untouched) on every response.
//! `ReqData` wraps the parsed body together with the HTTP headers of the
//! hydration call itself and is read-only for the duration of one request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::authenticators::Coordinates;
use crate::errors::{ContextError, ContextResult};

/// Extra claim carrying the OAuth2 client id.
pub const CLIENT_ID_KEY: &str = "client_id";
/// Extra claim carrying the static username.
pub const USERNAME_KEY: &str = "name";
/// Extra claim / header carrying the space-joined scopes.
pub const SCOPES_KEY: &str = "scope";
/// Extra claim listing the caller's groups.
pub const GROUPS_KEY: &str = "groups";
/// Extra claim carrying the caller's email.
pub const EMAIL_KEY: &str = "email";
/// Extra claim / header carrying the external tenant id.
pub const EXTERNAL_TENANT_KEY: &str = "tenant";
/// Body header carrying the client id extracted from an mTLS certificate.
pub const CLIENT_ID_CERT_KEY: &str = "client-id-from-certificate";
/// Body header naming the issuer of the client certificate.
pub const CLIENT_ID_CERT_ISSUER_KEY: &str = "client-certificate-issuer";
/// Body header carrying the client id extracted from a one-time token.
pub const CLIENT_ID_TOKEN_KEY: &str = "client-id-from-token";
/// Request header carrying the opaque acting-on-behalf-of consumer claims.
pub const USER_CONTEXT_KEY: &str = "User_context";
/// Extra claim carrying custom-authenticator coordinates.
pub const COORDINATES_KEY: &str = "authenticator_coordinates";

/// Extra claim naming the consumer type granted to an external certificate.
pub const CONSUMER_TYPE_KEY: &str = "consumer_type";
/// Extra claim listing the tenant types an external certificate may access.
pub const ACCESS_LEVELS_KEY: &str = "tenant_access_levels";
/// Extra claim overriding the consumer id for cert-service requests.
pub const INTERNAL_CONSUMER_ID_KEY: &str = "internal_consumer_id";
/// Access level granting calls without a tenant.
pub const GLOBAL_ACCESS_LEVEL: &str = "global";

/// Issuer of connector-managed client certificates.
pub const CONNECTOR_ISSUER: &str = "connector";
/// Issuer of externally-managed client certificates.
pub const EXTERNAL_ISSUER: &str = "certificate-service";

/// Multi-valued header map as forwarded by the gateway.
pub type HeaderValues = BTreeMap<String, Vec<String>>;

/// The hydration request/response body.
///
/// The same shape is written back on every response; on any internal
/// failure short of a parse error the input is echoed unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReqBody {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
    #[serde(default)]
    pub header: Option<HeaderValues>,
}

/// Parsed hydration request: body plus the headers of the call itself.
#[derive(Debug, Clone, Default)]
pub struct ReqData {
    pub body: ReqBody,
    pub header: HeaderValues,
}

fn first_value<'a>(headers: &'a HeaderValues, key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| v.first())
        .map(String::as_str)
}

impl ReqData {
    /// Create request data from a parsed body and the call's headers.
    pub fn new(body: ReqBody, header: HeaderValues) -> Self {
        Self { body, header }
    }

    /// Read a string claim from the extra map.
    ///
    /// Missing keys are `Ok(None)`; a present value of the wrong JSON type
    /// is an error naming the key.
    pub fn extra_str(&self, key: &str) -> ContextResult<Option<&str>> {
        match self.body.extra.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ContextError::not_a_string(key)),
        }
    }

    /// First value of a body header, case-insensitive (the upstream proxy
    /// canonicalizes MIME header keys).
    pub fn body_header(&self, key: &str) -> Option<&str> {
        self.body.header.as_ref().and_then(|h| first_value(h, key))
    }

    /// First value of a header on the hydration call itself.
    pub fn request_header(&self, key: &str) -> Option<&str> {
        first_value(&self.header, key)
    }

    /// Read a claim that may arrive either in the extra map or as a body
    /// header, preferring the extra map.
    pub fn string_value(&self, key: &str) -> ContextResult<Option<String>> {
        if let Some(s) = self.extra_str(key)? {
            return Ok(Some(s.to_string()));
        }
        Ok(self.body_header(key).map(str::to_string))
    }

    /// The external tenant id claim; missing is a `KeyNotFound` error so
    /// callers can decide whether absence is tolerated.
    pub fn external_tenant_id(&self) -> ContextResult<String> {
        self.string_value(EXTERNAL_TENANT_KEY)?
            .ok_or_else(|| ContextError::KeyNotFound(EXTERNAL_TENANT_KEY.to_string()))
    }

    /// The space-joined scopes claim.
    pub fn scopes(&self) -> ContextResult<String> {
        self.string_value(SCOPES_KEY)?
            .ok_or_else(|| ContextError::KeyNotFound(SCOPES_KEY.to_string()))
    }

    /// Group names from the `groups` claim; non-string entries are skipped.
    pub fn groups(&self) -> Vec<String> {
        match self.body.extra.get(GROUPS_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the request carries authenticator coordinates at all,
    /// regardless of their shape.
    pub fn has_coordinates(&self) -> bool {
        self.body.extra.contains_key(COORDINATES_KEY)
    }

    /// Parsed authenticator coordinates, `None` when absent or malformed.
    pub fn coordinates(&self) -> Option<Coordinates> {
        self.body
            .extra
            .get(COORDINATES_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Tenant access levels granted to an external certificate.
    pub fn access_levels(&self) -> Vec<String> {
        match self.body.extra.get(ACCESS_LEVELS_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The client id from the certificate header together with its issuer.
    pub fn certificate_signal(&self) -> Option<(&str, &str)> {
        let client_id = self.body_header(CLIENT_ID_CERT_KEY)?;
        if client_id.is_empty() {
            return None;
        }
        let issuer = self.body_header(CLIENT_ID_CERT_ISSUER_KEY).unwrap_or("");
        Some((client_id, issuer))
    }
}
