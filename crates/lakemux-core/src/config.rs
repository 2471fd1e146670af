//! Tenants document loading and persistence
//!
//! The only durable state the core defines: a JSON document with
//! `defaultTenant` and `tenants[]`. Loading merges the structured source
//! with `LAKEMUX_*` environment overrides; the environment constructs an
//! implicit "default" tenant only when the document did not define one.
//!
//! String fields may carry `${env:VAR}` placeholders, expanded at load
//! time, so the checked-in document never contains secrets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    ConnectionDescriptor, CredentialDeclaration, PoolDescriptor, PoolKind, TenantConfig,
};

lazy_static! {
    static ref ENV_REGEX: Regex = Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Environment variable names recognized by the loader.
pub mod env_keys {
    pub const TENANTS_FILE: &str = "LAKEMUX_TENANTS_FILE";
    pub const DEFAULT_TENANT: &str = "LAKEMUX_DEFAULT_TENANT";
    pub const SUBSCRIPTION_ID: &str = "LAKEMUX_SUBSCRIPTION_ID";
    pub const RESOURCE_GROUP: &str = "LAKEMUX_RESOURCE_GROUP";
    pub const WORKSPACE: &str = "LAKEMUX_WORKSPACE";
    pub const SQL_HOST: &str = "LAKEMUX_SQL_HOST";
    pub const SQL_PORT: &str = "LAKEMUX_SQL_PORT";
    pub const SQL_DATABASE: &str = "LAKEMUX_SQL_DATABASE";
    pub const SERVERLESS_HOST: &str = "LAKEMUX_SERVERLESS_HOST";
    pub const DIRECTORY_ID: &str = "LAKEMUX_DIRECTORY_ID";
    pub const CLIENT_ID: &str = "LAKEMUX_CLIENT_ID";
    pub const CLIENT_SECRET: &str = "LAKEMUX_CLIENT_SECRET";
}

/// Persisted tenants document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tenant: Option<String>,

    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

impl TenantsDocument {
    /// Parse a document from JSON, expanding `${env:VAR}` placeholders in
    /// every string field first.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let mut value: serde_json::Value =
            serde_json::from_str(raw).context("Failed to parse tenants document JSON")?;
        expand_env_placeholders(&mut value);
        serde_json::from_value(value).context("Tenants document has an unexpected shape")
    }

    /// Load the document from `path`, or from the resolved default location
    /// when `path` is `None`. A missing file yields an empty document;
    /// environment overrides are applied either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Pick up a .env file if one is present; ignore absence.
        dotenvy::dotenv().ok();

        let resolved = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(env_keys::TENANTS_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_tenants_path()),
        };

        let mut doc = if resolved.exists() {
            let raw = std::fs::read_to_string(&resolved)
                .with_context(|| format!("Failed to read tenants file {}", resolved.display()))?;
            let doc = Self::from_json_str(&raw)?;
            info!(
                "[Config] Loaded {} tenant(s) from {}",
                doc.tenants.len(),
                resolved.display()
            );
            doc
        } else {
            debug!(
                "[Config] No tenants file at {}, starting empty",
                resolved.display()
            );
            TenantsDocument::default()
        };

        doc.apply_env_overrides();
        Ok(doc)
    }

    /// Write the document back in the persisted layout.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("Failed to serialize tenants")?;
        std::fs::write(path, raw)
            .with_context(|| format!("Failed to write tenants file {}", path.display()))?;
        info!(
            "[Config] Saved {} tenant(s) to {}",
            self.tenants.len(),
            path.display()
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|t| t.name == name)
    }

    /// Merge individual environment values into the document.
    ///
    /// `LAKEMUX_DEFAULT_TENANT` always wins over the document's
    /// `defaultTenant`; the workspace/SQL variables construct an implicit
    /// "default" tenant only if the document did not define one.
    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var(env_keys::DEFAULT_TENANT) {
            if !name.is_empty() {
                self.default_tenant = Some(name);
            }
        }

        if self.get("default").is_some() {
            return;
        }

        let workspace = std::env::var(env_keys::WORKSPACE).ok();
        let sql_host = std::env::var(env_keys::SQL_HOST).ok();
        let (Some(workspace), Some(sql_host)) = (workspace, sql_host) else {
            return;
        };

        let database = std::env::var(env_keys::SQL_DATABASE).unwrap_or_else(|_| "master".into());
        let mut connection = ConnectionDescriptor::new(sql_host, database);
        if let Some(port) = std::env::var(env_keys::SQL_PORT)
            .ok()
            .and_then(|p| p.parse().ok())
        {
            connection.port = port;
        }

        let mut pools = vec![PoolDescriptor {
            name: "default".to_string(),
            kind: PoolKind::Dedicated,
            connection,
        }];

        if let Ok(host) = std::env::var(env_keys::SERVERLESS_HOST) {
            pools.push(PoolDescriptor {
                name: "ondemand".to_string(),
                kind: PoolKind::Serverless,
                connection: ConnectionDescriptor::new(host, "master"),
            });
        }

        let credentials = match (
            std::env::var(env_keys::DIRECTORY_ID),
            std::env::var(env_keys::CLIENT_ID),
            std::env::var(env_keys::CLIENT_SECRET),
        ) {
            (Ok(directory_id), Ok(client_id), Ok(client_secret)) => {
                CredentialDeclaration::ClientSecret {
                    directory_id,
                    client_id,
                    client_secret,
                }
            }
            _ => CredentialDeclaration::Auto,
        };

        info!("[Config] Built implicit 'default' tenant from environment");
        self.tenants.push(TenantConfig {
            name: "default".to_string(),
            subscription_id: std::env::var(env_keys::SUBSCRIPTION_ID).unwrap_or_default(),
            resource_group: std::env::var(env_keys::RESOURCE_GROUP).unwrap_or_default(),
            workspace_name: workspace,
            region: None,
            tags: HashMap::new(),
            pools,
            credentials,
        });
    }
}

/// Default location of the tenants document.
pub fn default_tenants_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lakemux")
        .join("tenants.json")
}

/// Expand `${env:VAR}` in every string leaf of a JSON value.
///
/// Unset variables are left verbatim with a warning so a typo surfaces in
/// the logs instead of silently becoming an empty string.
fn expand_env_placeholders(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if ENV_REGEX.is_match(s) {
                let expanded = ENV_REGEX.replace_all(s, |caps: &regex::Captures<'_>| {
                    let var = &caps[1];
                    match std::env::var(var) {
                        Ok(v) => v,
                        Err(_) => {
                            warn!("[Config] Placeholder references unset variable {}", var);
                            caps[0].to_string()
                        }
                    }
                });
                *s = expanded.into_owned();
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                expand_env_placeholders(item);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                expand_env_placeholders(v);
            }
        }
        _ => {}
    }
}
