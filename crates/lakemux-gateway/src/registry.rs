//! Tenant registry - logical names to workspace coordinates
//!
//! Owns every `TenantConfig` plus one lazily created `TokenCache` per
//! tenant. Registries are constructed instances, not ambient state: tests
//! build a fresh one per case and services share it by `Arc`.
//!
//! Name resolution for an omitted tenant: the explicit default, else a
//! tenant literally named "default", else absent - absence is a
//! configuration error and is never retried.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use lakemux_core::{
    ConnectionDescriptor, GatewayError, PoolKind, TenantConfig, TenantsDocument,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::{resolve_credential, TokenCache, SQL_RESOURCE_SCOPE};

pub struct TenantRegistry {
    tenants: RwLock<HashMap<String, Arc<TenantConfig>>>,
    default_tenant: RwLock<Option<String>>,
    /// Token caches are created on first use and live as long as the
    /// tenant's registration.
    token_caches: DashMap<String, Arc<TokenCache>>,
    scope: String,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            default_tenant: RwLock::new(None),
            token_caches: DashMap::new(),
            scope: SQL_RESOURCE_SCOPE.to_string(),
        }
    }

    /// Override the token scope (tests use a mock audience).
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Build a registry from a loaded tenants document.
    pub async fn from_document(document: TenantsDocument) -> Self {
        let registry = Self::new();
        {
            let mut tenants = registry.tenants.write().await;
            for tenant in document.tenants {
                tenants.insert(tenant.name.clone(), Arc::new(tenant));
            }
            info!("[Registry] Loaded {} tenant(s)", tenants.len());
        }
        {
            let mut default_tenant = registry.default_tenant.write().await;
            *default_tenant = document.default_tenant;
        }
        registry
    }

    /// Register a tenant. Re-registering a name replaces the previous
    /// config and drops its token cache.
    pub async fn add_tenant(&self, config: TenantConfig) -> Result<(), GatewayError> {
        if config.name.trim().is_empty() {
            return Err(GatewayError::config("tenant name must not be empty"));
        }

        let name = config.name.clone();
        let replaced = {
            let mut tenants = self.tenants.write().await;
            tenants.insert(name.clone(), Arc::new(config)).is_some()
        };

        if replaced {
            warn!("[Registry] Replaced existing tenant '{}'", name);
            self.token_caches.remove(&name);
        } else {
            info!("[Registry] Registered tenant '{}'", name);
        }
        Ok(())
    }

    /// Remove a tenant and its token cache. Clears the default if it
    /// pointed here. Returns whether the tenant existed.
    pub async fn remove_tenant(&self, name: &str) -> bool {
        let removed = {
            let mut tenants = self.tenants.write().await;
            tenants.remove(name).is_some()
        };

        if removed {
            self.token_caches.remove(name);
            let mut default_tenant = self.default_tenant.write().await;
            if default_tenant.as_deref() == Some(name) {
                *default_tenant = None;
            }
            info!("[Registry] Removed tenant '{}'", name);
        }
        removed
    }

    pub async fn set_default_tenant(&self, name: &str) -> Result<(), GatewayError> {
        {
            let tenants = self.tenants.read().await;
            if !tenants.contains_key(name) {
                return Err(GatewayError::config(format!(
                    "cannot default to unknown tenant '{}'",
                    name
                )));
            }
        }
        let mut default_tenant = self.default_tenant.write().await;
        *default_tenant = Some(name.to_string());
        Ok(())
    }

    /// Resolve an optionally omitted tenant name.
    pub async fn resolve_name(&self, name: Option<&str>) -> Option<String> {
        if let Some(name) = name {
            return Some(name.to_string());
        }

        if let Some(default) = self.default_tenant.read().await.clone() {
            return Some(default);
        }

        let tenants = self.tenants.read().await;
        if tenants.contains_key("default") {
            return Some("default".to_string());
        }
        None
    }

    pub async fn get_tenant(&self, name: Option<&str>) -> Option<Arc<TenantConfig>> {
        let resolved = self.resolve_name(name).await?;
        let tenants = self.tenants.read().await;
        tenants.get(&resolved).cloned()
    }

    pub async fn list_tenants(&self) -> Vec<String> {
        let tenants = self.tenants.read().await;
        let mut names: Vec<String> = tenants.keys().cloned().collect();
        names.sort();
        names
    }

    /// Connection coordinates for the first pool of `kind`, if any.
    pub async fn get_connection_descriptor(
        &self,
        name: Option<&str>,
        kind: PoolKind,
    ) -> Option<ConnectionDescriptor> {
        let tenant = self.get_tenant(name).await?;
        let descriptor = tenant.pool_for_kind(kind).map(|p| p.connection.clone());
        if descriptor.is_none() {
            debug!(
                "[Registry] Tenant '{}' has no {} pool",
                tenant.name, kind
            );
        }
        descriptor
    }

    /// The tenant's token cache, created from its credential declaration
    /// on first use.
    pub async fn token_cache(&self, name: Option<&str>) -> Result<Arc<TokenCache>, GatewayError> {
        let resolved = self
            .resolve_name(name)
            .await
            .ok_or_else(|| GatewayError::config("no tenant specified and no default registered"))?;

        let tenant = {
            let tenants = self.tenants.read().await;
            tenants.get(&resolved).cloned()
        }
        .ok_or_else(|| GatewayError::config(format!("unknown tenant '{}'", resolved)))?;

        let cache = self
            .token_caches
            .entry(resolved)
            .or_insert_with(|| {
                debug!(
                    "[Registry] Creating token cache for '{}' ({})",
                    tenant.name,
                    tenant.credentials.kind_name()
                );
                Arc::new(TokenCache::new(
                    resolve_credential(&tenant.credentials),
                    self.scope.clone(),
                ))
            })
            .clone();
        Ok(cache)
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}
