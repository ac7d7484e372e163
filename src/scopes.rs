//! Static scope configuration.
//!
//! Scopes for credential flows that carry no scope claim of their own
//! (certificate, one-time token) come from a YAML table keyed by dotted
//! paths such as `scopesPerConsumerType.application`. The table is loaded
//! once at startup and read-only afterwards.

use std::fs;
use std::path::Path;

use crate::errors::{ContextError, ContextResult};

/// Path prefix for the per-consumer-type scope table.
pub const SCOPES_PER_CONSUMER_TYPE_PREFIX: &str = "scopesPerConsumerType";

/// Contract for static scope lookups.
pub trait ScopesGetter: Send + Sync {
    /// Return the scopes configured at the given dotted path.
    fn required_scopes(&self, path: &str) -> ContextResult<Vec<String>>;
}

/// YAML-file-backed scope table.
pub struct FileScopes {
    root: serde_yaml::Value,
}

impl FileScopes {
    /// Load the table from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let root: serde_yaml::Value = serde_yaml::from_str(&raw)?;
        Ok(Self { root })
    }

    /// Build a table from an already-parsed YAML value (used in tests).
    pub fn from_value(root: serde_yaml::Value) -> Self {
        Self { root }
    }
}

impl ScopesGetter for FileScopes {
    fn required_scopes(&self, path: &str) -> ContextResult<Vec<String>> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current
                .get(segment)
                .ok_or_else(|| ContextError::KeyNotFound(path.to_string()))?;
        }

        let items = current.as_sequence().ok_or_else(|| {
            ContextError::Internal(format!("scopes at {} are not a list", path))
        })?;

        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ContextError::Internal(format!("scope entry at {} is not a string", path))
                })
            })
            .collect()
    }
}
