//! Shared test doubles for the provider and handler tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::BoxFuture;
use crate::director::{DirectorClient, SystemAuth, Tenant, TenantInput};
use crate::errors::{ContextError, ContextResult};
use crate::scopes::ScopesGetter;

/// In-memory Director with recorded writes.
#[derive(Default)]
pub struct MockDirector {
    tenants: HashMap<String, Tenant>,
    tenant_errors: HashMap<String, ContextError>,
    system_auths: HashMap<String, SystemAuth>,
    system_auth_error: Option<ContextError>,
    update_error: Option<ContextError>,
    write_error: Option<ContextError>,
    pub updated_auths: Mutex<Vec<SystemAuth>>,
    pub written_tenants: Mutex<Vec<Vec<TenantInput>>>,
}

impl MockDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: Tenant) -> Self {
        self.tenants.insert(tenant.id.clone(), tenant);
        self
    }

    pub fn with_tenant_error(mut self, external_id: &str, err: ContextError) -> Self {
        self.tenant_errors.insert(external_id.to_string(), err);
        self
    }

    pub fn with_system_auth(mut self, auth: SystemAuth) -> Self {
        self.system_auths.insert(auth.id.clone(), auth);
        self
    }

    pub fn with_system_auth_error(mut self, err: ContextError) -> Self {
        self.system_auth_error = Some(err);
        self
    }

    pub fn with_update_error(mut self, err: ContextError) -> Self {
        self.update_error = Some(err);
        self
    }

    pub fn with_write_error(mut self, err: ContextError) -> Self {
        self.write_error = Some(err);
        self
    }
}

impl DirectorClient for MockDirector {
    fn tenant_by_external_id<'a>(
        &'a self,
        external_id: &'a str,
    ) -> BoxFuture<'a, ContextResult<Tenant>> {
        Box::pin(async move {
            if let Some(err) = self.tenant_errors.get(external_id) {
                return Err(err.clone());
            }
            self.tenants.get(external_id).cloned().ok_or_else(|| {
                ContextError::TenantNotFound {
                    external_id: external_id.to_string(),
                }
            })
        })
    }

    fn system_auth_by_id<'a>(
        &'a self,
        auth_id: &'a str,
    ) -> BoxFuture<'a, ContextResult<SystemAuth>> {
        Box::pin(async move {
            if let Some(err) = &self.system_auth_error {
                return Err(err.clone());
            }
            self.system_auths
                .get(auth_id)
                .cloned()
                .ok_or_else(|| ContextError::Director(format!("system auth {} not found", auth_id)))
        })
    }

    fn update_system_auth<'a>(
        &'a self,
        auth: &'a SystemAuth,
    ) -> BoxFuture<'a, ContextResult<()>> {
        Box::pin(async move {
            if let Some(err) = &self.update_error {
                return Err(err.clone());
            }
            self.updated_auths.lock().unwrap().push(auth.clone());
            Ok(())
        })
    }

    fn write_tenants<'a>(
        &'a self,
        tenants: &'a [TenantInput],
    ) -> BoxFuture<'a, ContextResult<()>> {
        Box::pin(async move {
            if let Some(err) = &self.write_error {
                return Err(err.clone());
            }
            self.written_tenants.lock().unwrap().push(tenants.to_vec());
            Ok(())
        })
    }
}

/// Fixed-map scopes getter.
#[derive(Default)]
pub struct FixedScopes {
    entries: HashMap<String, Vec<String>>,
    error: Option<ContextError>,
}

impl FixedScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, path: &str, scopes: &[&str]) -> Self {
        self.entries.insert(
            path.to_string(),
            scopes.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_error(mut self, err: ContextError) -> Self {
        self.error = Some(err);
        self
    }
}

impl ScopesGetter for FixedScopes {
    fn required_scopes(&self, path: &str) -> ContextResult<Vec<String>> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| ContextError::KeyNotFound(path.to_string()))
    }
}
