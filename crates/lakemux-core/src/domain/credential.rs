//! Credential declarations and cached tokens
//!
//! A tenant declares *how* tokens are acquired; the strategy itself is
//! materialized once by the gateway at registration time and shared by
//! reference afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Declared authentication strategy for a tenant.
///
/// Selected once at registration time; the gateway resolves it to a
/// concrete credential object and never inspects it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialDeclaration {
    /// Fixed secret: client-credentials grant against the directory.
    ClientSecret {
        directory_id: String,
        client_id: String,
        client_secret: String,
    },

    /// Platform-assigned identity, resolved via the instance metadata endpoint.
    ManagedIdentity {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Delegated to the developer CLI's logged-in account.
    Cli,

    /// Chained fallback: platform identity first, then the CLI.
    Auto,
}

impl Default for CredentialDeclaration {
    fn default() -> Self {
        CredentialDeclaration::Auto
    }
}

impl CredentialDeclaration {
    /// Short strategy name for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CredentialDeclaration::ClientSecret { .. } => "client_secret",
            CredentialDeclaration::ManagedIdentity { .. } => "managed_identity",
            CredentialDeclaration::Cli => "cli",
            CredentialDeclaration::Auto => "auto",
        }
    }
}

/// Expiry buffer: a token within this window of its expiry is treated as
/// already expired so callers never hold a token that dies mid-request.
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;

/// A bearer token held by a tenant's token cache.
///
/// Replaced, never mutated, on refresh.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Valid iff the expiry is known and further than the buffer away.
    ///
    /// A token without a declared expiry is never valid from cache, so the
    /// strategy is re-invoked on every call rather than risking staleness.
    pub fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - Utc::now() > Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS),
            None => false,
        }
    }
}
