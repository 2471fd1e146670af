//! Authentication - credential strategies and the token cache
//!
//! - **Credential strategies**: client-secret grant, platform identity,
//!   CLI delegation, and a chained fallback, all behind one
//!   `TokenCredential` capability trait
//! - **TokenCache**: per-tenant expiry-aware bearer token reuse

mod credentials;
mod token_cache;

pub use credentials::{
    resolve_credential, AccessToken, ChainedCredential, CliCredential, ClientSecretCredential,
    ManagedIdentityCredential, TokenCredential,
};
pub use token_cache::{TokenCache, TokenInfo};

/// Target audience for every token this gateway acquires. Fixed by design:
/// the scope is a property of the workspace surface, not of a call.
pub const SQL_RESOURCE_SCOPE: &str = "https://database.windows.net/.default";
