//! Token cache - expiry-aware bearer token reuse
//!
//! One cache per tenant, wrapping that tenant's credential strategy. A
//! cached token is served until five minutes before its expiry, then the
//! strategy is invoked again and the token replaced.
//!
//! Concurrent callers during a refresh are not serialized: acquisition is
//! idempotent at the identity provider, so the occasional duplicate fetch
//! is cheaper than another coalescing map here.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use lakemux_core::{CachedToken, GatewayError};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::credentials::TokenCredential;

/// Cache state snapshot, safe to surface to callers (no token value).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub source: &'static str,
    pub expires_at: Option<DateTime<Utc>>,
    pub valid: bool,
}

/// Expiry-aware cache over one credential strategy.
pub struct TokenCache {
    credential: Arc<dyn TokenCredential>,
    scope: String,
    cached: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(credential: Arc<dyn TokenCredential>, scope: impl Into<String>) -> Self {
        Self {
            credential,
            scope: scope.into(),
            cached: RwLock::new(None),
        }
    }

    /// Return a valid bearer token, reacquiring if the cached one is
    /// missing, expired, or inside the expiry buffer.
    pub async fn get_access_token(&self) -> Result<String, GatewayError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
                debug!("[TokenCache] Serving cached token for {}", self.credential.name());
                return Ok(token.token.clone());
            }
        }

        self.acquire_and_store().await
    }

    /// `"Bearer " + token`, for REST-style callers.
    pub async fn get_authorization_header(&self) -> Result<String, GatewayError> {
        Ok(format!("Bearer {}", self.get_access_token().await?))
    }

    /// Drop the cached token and reacquire. Used after a downstream
    /// authentication-class failure.
    pub async fn refresh_token(&self) -> Result<String, GatewayError> {
        {
            let mut cached = self.cached.write().await;
            *cached = None;
        }
        info!("[TokenCache] Forced refresh for {}", self.credential.name());
        self.acquire_and_store().await
    }

    /// Drop the cached token without reacquiring.
    pub async fn clear(&self) {
        let mut cached = self.cached.write().await;
        *cached = None;
    }

    /// Snapshot of the cached token's state; `None` when nothing is cached.
    pub async fn get_token_info(&self) -> Option<TokenInfo> {
        let cached = self.cached.read().await;
        cached.as_ref().map(|t| TokenInfo {
            source: self.credential.name(),
            expires_at: t.expires_at,
            valid: t.is_valid(),
        })
    }

    async fn acquire_and_store(&self) -> Result<String, GatewayError> {
        let started = Instant::now();

        match self.credential.acquire(&self.scope).await {
            Ok(acquired) => {
                info!(
                    credential = self.credential.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    has_expiry = acquired.expires_at.is_some(),
                    "[TokenCache] Acquired token"
                );

                let mut cached = self.cached.write().await;
                *cached = Some(CachedToken::new(acquired.token.clone(), acquired.expires_at));
                Ok(acquired.token)
            }
            Err(err) => {
                warn!(
                    credential = self.credential.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "[TokenCache] Acquisition failed: {}",
                    err
                );

                let mut cached = self.cached.write().await;
                *cached = None;

                Err(GatewayError::authentication(format!(
                    "token acquisition via {} failed: {}",
                    self.credential.name(),
                    err
                )))
            }
        }
    }
}
