//! Error types for context resolution.
//!
//! The taxonomy mirrors how errors travel through the pipeline:
//! a `Match` error excludes one provider from the request, a resolve error
//! aborts the whole pipeline (the handler then falls back to echoing the
//! unmodified body), and `TenantNotFound` is not a failure at all — it
//! degrades the internal tenant id to empty and processing continues.

use std::fmt;

/// Errors that can occur while matching or resolving an object context.
#[derive(Debug, Clone)]
pub enum ContextError {
    /// The tenant with the given external ID is unknown downstream.
    ///
    /// Distinguished from other Director failures: callers degrade to an
    /// empty internal tenant id instead of failing the request.
    TenantNotFound {
        /// External tenant id that could not be resolved.
        external_id: String,
    },

    /// The request claim or header exists but carries the wrong shape
    /// (e.g. a non-string value where a string is expected), or a
    /// mandatory property is missing.
    InvalidData(String),

    /// The requested key does not exist in the request data.
    KeyNotFound(String),

    /// The access-level check rejected the resolved tenant.
    Unauthorized(String),

    /// A Director call failed for a reason other than not-found.
    Director(String),

    /// Anything else that should abort resolution.
    Internal(String),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TenantNotFound { external_id } => {
                write!(f, "tenant with external ID {} not found", external_id)
            }
            Self::InvalidData(msg) => write!(f, "invalid data: {}", msg),
            Self::KeyNotFound(key) => {
                write!(f, "the key does not exist in the source object [key={}]", key)
            }
            Self::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            Self::Director(msg) => write!(f, "director call failed: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ContextError {}

/// Result type for context resolution operations.
pub type ContextResult<T> = Result<T, ContextError>;

impl From<anyhow::Error> for ContextError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl ContextError {
    /// True for the distinguished not-found kind that callers degrade on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TenantNotFound { .. })
    }

    /// Wrong JSON type where a string was expected.
    pub fn not_a_string(key: &str) -> Self {
        Self::InvalidData(format!(
            "while parsing the value for key={}: unable to cast the value to a string type",
            key
        ))
    }

    /// Attach leading context to an error, keeping its kind.
    ///
    /// Not-found stays not-found so the degrade path still fires after
    /// wrapping.
    pub fn wrap(self, context: impl fmt::Display) -> Self {
        match self {
            Self::TenantNotFound { .. } => self,
            Self::InvalidData(msg) => Self::InvalidData(format!("{}: {}", context, msg)),
            Self::KeyNotFound(key) => Self::InvalidData(format!(
                "{}: the key does not exist in the source object [key={}]",
                context, key
            )),
            Self::Unauthorized(msg) => Self::Unauthorized(msg),
            Self::Director(msg) => Self::Director(format!("{}: {}", context, msg)),
            Self::Internal(msg) => Self::Internal(format!("{}: {}", context, msg)),
        }
    }
}
