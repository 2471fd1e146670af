//! Credential strategies
//!
//! Each strategy turns a scope into a bearer token. The variant is chosen
//! once, when a tenant is registered, from its `CredentialDeclaration`;
//! after that everything goes through the `TokenCredential` trait object.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lakemux_core::{CredentialDeclaration, GatewayError};
use serde::Deserialize;
use tracing::debug;

/// Default instance metadata token endpoint for platform identities.
const METADATA_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Default program for CLI-delegated acquisition.
const CLI_PROGRAM: &str = "az";

/// A freshly acquired bearer token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    /// Absent when the strategy does not declare one; such tokens are
    /// never served from cache.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Capability to produce bearer tokens for a fixed scope.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn acquire(&self, scope: &str) -> Result<AccessToken, GatewayError>;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("LakeMux/0.2")
        .build()
        .expect("Failed to build HTTP client")
}

/// Lenient epoch/seconds field: identity endpoints disagree on whether
/// these are JSON numbers or decimal strings.
fn epoch_like(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ============================================
// Client secret (fixed secret)
// ============================================

/// Client-credentials grant against the directory's token endpoint.
pub struct ClientSecretCredential {
    directory_id: String,
    client_id: String,
    client_secret: String,
    authority: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SecretTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

impl ClientSecretCredential {
    pub fn new(
        directory_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            directory_id: directory_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority: "https://login.microsoftonline.com".to_string(),
            http: http_client(Duration::from_secs(30)),
        }
    }

    /// Override the authority base URL (tests point this at a local mock).
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn acquire(&self, scope: &str) -> Result<AccessToken, GatewayError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.directory_id
        );

        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| {
                GatewayError::authentication(format!("token endpoint unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::authentication(format!(
                "token endpoint returned {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let parsed: SecretTokenResponse = response.json().await.map_err(|e| {
            GatewayError::authentication(format!("malformed token response: {}", e))
        })?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at: parsed
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }

    fn name(&self) -> &'static str {
        "client_secret"
    }
}

// ============================================
// Platform-assigned identity
// ============================================

/// Token from the platform's instance metadata endpoint.
pub struct ManagedIdentityCredential {
    client_id: Option<String>,
    endpoint: String,
    http: reqwest::Client,
}

impl ManagedIdentityCredential {
    pub fn new(client_id: Option<String>) -> Self {
        Self {
            client_id,
            endpoint: METADATA_TOKEN_ENDPOINT.to_string(),
            // The metadata endpoint is link-local; if it is going to answer
            // at all it answers fast, and a chained credential should fail
            // over quickly when it does not.
            http: http_client(Duration::from_secs(5)),
        }
    }

    /// Override the metadata endpoint (tests point this at a local mock).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for ManagedIdentityCredential {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn acquire(&self, scope: &str) -> Result<AccessToken, GatewayError> {
        // The metadata endpoint wants the bare resource, not an OAuth scope.
        let resource = scope.strip_suffix("/.default").unwrap_or(scope);

        let mut query: Vec<(&str, &str)> =
            vec![("api-version", "2018-02-01"), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id));
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| {
                GatewayError::authentication(format!("metadata endpoint unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::authentication(format!(
                "metadata endpoint returned {}",
                status
            )));
        }

        let parsed: serde_json::Value = response.json().await.map_err(|e| {
            GatewayError::authentication(format!("malformed metadata response: {}", e))
        })?;

        let token = parsed
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::authentication("metadata response missing access_token"))?
            .to_string();

        let expires_at = parsed
            .get("expires_on")
            .and_then(epoch_like)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                parsed
                    .get("expires_in")
                    .and_then(epoch_like)
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });

        Ok(AccessToken { token, expires_at })
    }

    fn name(&self) -> &'static str {
        "managed_identity"
    }
}

// ============================================
// CLI delegation
// ============================================

/// Token from the developer CLI's logged-in account.
pub struct CliCredential {
    program: String,
}

#[derive(Debug, Deserialize)]
struct CliTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Unix epoch seconds; older CLI versions omit it, in which case the
    /// token is simply never cached.
    #[serde(rename = "expires_on")]
    expires_on: Option<i64>,
}

impl CliCredential {
    pub fn new() -> Self {
        Self {
            program: CLI_PROGRAM.to_string(),
        }
    }

    /// Override the program path (tests substitute a stub script).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for CliCredential {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCredential for CliCredential {
    async fn acquire(&self, scope: &str) -> Result<AccessToken, GatewayError> {
        let output = tokio::process::Command::new(&self.program)
            .args(["account", "get-access-token", "--scope", scope, "--output", "json"])
            .output()
            .await
            .map_err(|e| {
                GatewayError::authentication(format!("failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GatewayError::authentication(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                truncate(stderr.trim(), 200)
            )));
        }

        let parsed: CliTokenResponse = serde_json::from_slice(&output.stdout).map_err(|e| {
            GatewayError::authentication(format!("malformed CLI token output: {}", e))
        })?;

        Ok(AccessToken {
            token: parsed.access_token,
            expires_at: parsed
                .expires_on
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}

// ============================================
// Chained fallback
// ============================================

/// Tries each source in order and returns the first token produced.
pub struct ChainedCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl ChainedCredential {
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }

    /// Platform identity first, then the CLI.
    pub fn default_chain() -> Self {
        Self::new(vec![
            Arc::new(ManagedIdentityCredential::default()),
            Arc::new(CliCredential::default()),
        ])
    }
}

#[async_trait]
impl TokenCredential for ChainedCredential {
    async fn acquire(&self, scope: &str) -> Result<AccessToken, GatewayError> {
        let mut tried = Vec::with_capacity(self.sources.len());
        let mut last_error = None;

        for source in &self.sources {
            match source.acquire(scope).await {
                Ok(token) => {
                    debug!("[Credentials] Chain resolved via {}", source.name());
                    return Ok(token);
                }
                Err(err) => {
                    debug!("[Credentials] {} did not produce a token: {}", source.name(), err);
                    tried.push(source.name());
                    last_error = Some(err);
                }
            }
        }

        Err(GatewayError::authentication(format!(
            "no credential in the chain produced a token (tried: {}); last error: {}",
            tried.join(", "),
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "none".into())
        )))
    }

    fn name(&self) -> &'static str {
        "auto"
    }
}

/// Materialize the strategy a tenant declared.
pub fn resolve_credential(declaration: &CredentialDeclaration) -> Arc<dyn TokenCredential> {
    match declaration {
        CredentialDeclaration::ClientSecret {
            directory_id,
            client_id,
            client_secret,
        } => Arc::new(ClientSecretCredential::new(
            directory_id,
            client_id,
            client_secret,
        )),
        CredentialDeclaration::ManagedIdentity { client_id } => {
            Arc::new(ManagedIdentityCredential::new(client_id.clone()))
        }
        CredentialDeclaration::Cli => Arc::new(CliCredential::default()),
        CredentialDeclaration::Auto => Arc::new(ChainedCredential::default_chain()),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
