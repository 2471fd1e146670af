//! LakeMux Gateway
//!
//! Session and resource management for agent-driven analytical workspaces:
//! - Credential strategies and per-tenant token caching
//! - Tenant registry (names to workspace coordinates and pools)
//! - Keyed connection pool with creation coalescing and a TTL result cache
//! - One retry/backoff executor shared by the SQL and REST paths

pub mod auth;
pub mod pool;
pub mod registry;
pub mod rest;
pub mod retry;

pub use auth::{
    resolve_credential, AccessToken, ChainedCredential, CliCredential, ClientSecretCredential,
    ManagedIdentityCredential, TokenCache, TokenCredential, TokenInfo, SQL_RESOURCE_SCOPE,
};
pub use pool::{
    ConnectionPool, PoolKey, PoolStats, QueryParam, ResultCache, SessionConnector, SqlRow,
    SqlSession, TdsConnector, DEFAULT_RESULT_TTL,
};
pub use registry::TenantRegistry;
pub use rest::WorkspaceRestClient;
pub use retry::{retry_operation, RetryPolicy};
