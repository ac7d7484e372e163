//! Static user and group repositories.
//!
//! Both tables are loaded once at process start from YAML files and are
//! immutable afterwards, so they are shared via `Arc` and read concurrently
//! without locking.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{ContextError, ContextResult};

/// A statically configured user with its allowed tenants and scopes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StaticUser {
    pub username: String,
    #[serde(default)]
    pub tenants: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// A named group mapping to a scope set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StaticGroup {
    #[serde(rename = "groupname")]
    pub group_name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StaticUsersFile {
    users: Vec<StaticUser>,
}

#[derive(Debug, Deserialize)]
struct StaticGroupsFile {
    groups: Vec<StaticGroup>,
}

/// Immutable username-keyed static user table.
pub struct StaticUserRepository {
    users: HashMap<String, StaticUser>,
}

impl StaticUserRepository {
    /// Load the table from a YAML file with a top-level `users` list.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let file: StaticUsersFile = serde_yaml::from_str(&raw)?;
        Ok(Self::from_users(file.users))
    }

    pub fn from_users(users: Vec<StaticUser>) -> Self {
        let users = users
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect();
        Self { users }
    }

    /// Look up a user by username.
    pub fn get(&self, username: &str) -> ContextResult<StaticUser> {
        self.users.get(username).cloned().ok_or_else(|| {
            ContextError::Internal(format!(
                "while searching for a static user with username {}: not found",
                username
            ))
        })
    }
}

/// Immutable name-keyed static group table.
pub struct StaticGroupRepository {
    groups: HashMap<String, StaticGroup>,
}

impl StaticGroupRepository {
    /// Load the table from a YAML file with a top-level `groups` list.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let file: StaticGroupsFile = serde_yaml::from_str(&raw)?;
        Ok(Self::from_groups(file.groups))
    }

    pub fn from_groups(groups: Vec<StaticGroup>) -> Self {
        let groups = groups
            .into_iter()
            .map(|g| (g.group_name.clone(), g))
            .collect();
        Self { groups }
    }

    /// Return the known groups among the given names, in request order.
    /// Unknown names are silently skipped.
    pub fn get(&self, names: &[String]) -> Vec<StaticGroup> {
        names
            .iter()
            .filter_map(|name| self.groups.get(name).cloned())
            .collect()
    }
}
