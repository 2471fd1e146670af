//! Tenant entity - workspace coordinates, pool descriptors, credentials
//!
//! A tenant is the unit of registration: one workspace's coordinates, the
//! SQL pools it exposes, and the credential declaration used to obtain
//! bearer tokens for it. Tenants are owned by the `TenantRegistry` and are
//! replaced, not mutated, on update.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::credential::CredentialDeclaration;

/// The two analytical execution modes a statement may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Provisioned compute with a fixed endpoint.
    Dedicated,
    /// On-demand compute billed per query.
    Serverless,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Dedicated => write!(f, "dedicated"),
            PoolKind::Serverless => write!(f, "serverless"),
        }
    }
}

impl FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dedicated" => Ok(PoolKind::Dedicated),
            "serverless" => Ok(PoolKind::Serverless),
            other => Err(format!("unknown pool kind '{}'", other)),
        }
    }
}

/// How a session authenticates against the pool endpoint.
///
/// Bearer is the normal mode: the token is resolved through the tenant's
/// token cache right before the session opens. SqlLogin exists for fixtures
/// and emulators that do not speak bearer auth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionAuth {
    Bearer,
    SqlLogin { username: String, password: String },
}

impl Default for SessionAuth {
    fn default() -> Self {
        SessionAuth::Bearer
    }
}

/// Connection coordinates for one pool endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    /// Server host name.
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database to open the session against.
    pub database: String,

    /// Session authentication mode.
    #[serde(default)]
    pub auth: SessionAuth,

    /// Trust the server certificate (local emulators only).
    #[serde(default)]
    pub trust_cert: bool,

    /// Connection-level timeout, seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Statement-level timeout, seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_port() -> u16 {
    1433
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    120
}

impl ConnectionDescriptor {
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            database: database.into(),
            auth: SessionAuth::default(),
            trust_cert: false,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// One pool exposed by a tenant's workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDescriptor {
    /// Pool name as shown in the workspace.
    pub name: String,

    /// Execution mode of this pool.
    pub kind: PoolKind,

    /// Endpoint coordinates for sessions against this pool.
    pub connection: ConnectionDescriptor,
}

/// A registered tenant: workspace coordinates, pools, and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    /// Unique tenant name (registry key).
    pub name: String,

    /// Subscription the workspace lives in.
    pub subscription_id: String,

    /// Resource group of the workspace.
    pub resource_group: String,

    /// Workspace name.
    pub workspace_name: String,

    /// Deployment region, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Free-form tags.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,

    /// Pools exposed by this workspace, in declaration order.
    #[serde(default)]
    pub pools: Vec<PoolDescriptor>,

    /// How bearer tokens are acquired for this tenant.
    #[serde(default)]
    pub credentials: CredentialDeclaration,
}

impl TenantConfig {
    pub fn new(
        name: impl Into<String>,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        workspace_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            workspace_name: workspace_name.into(),
            region: None,
            tags: HashMap::new(),
            pools: Vec::new(),
            credentials: CredentialDeclaration::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolDescriptor) -> Self {
        self.pools.push(pool);
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialDeclaration) -> Self {
        self.credentials = credentials;
        self
    }

    /// First pool whose kind matches, in declaration order.
    ///
    /// Kind uniqueness is not enforced at registration; when a tenant
    /// declares several pools of one kind the earliest wins.
    pub fn pool_for_kind(&self, kind: PoolKind) -> Option<&PoolDescriptor> {
        self.pools.iter().find(|p| p.kind == kind)
    }
}
