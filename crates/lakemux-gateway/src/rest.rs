//! Authenticated workspace REST client
//!
//! The REST/artifact counterpart of the SQL path: same token cache, same
//! retry policy, same error taxonomy. Tool handlers that format artifact
//! payloads (pipelines, notebooks, datasets) call through here.
//!
//! On an authentication-class response the token is refreshed and the
//! request reattempted exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lakemux_core::GatewayError;
use reqwest::Method;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::TokenCache;
use crate::retry::{retry_operation, RetryPolicy};

pub struct WorkspaceRestClient {
    http: reqwest::Client,
    base_url: String,
    token_cache: Arc<TokenCache>,
    policy: RetryPolicy,
}

impl WorkspaceRestClient {
    pub fn new(base_url: impl Into<String>, token_cache: Arc<TokenCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("LakeMux/0.2")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            token_cache,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, GatewayError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<serde_json::Value, GatewayError> {
        self.request(Method::DELETE, path, None).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, GatewayError> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let label = format!("{} {}", method, url);

        let result = retry_operation(&label, self.policy, || {
            self.send_once(method.clone(), &url, body)
        })
        .await;

        match result {
            Err(GatewayError::Authentication { .. }) => {
                info!("[Rest] Authentication failure on {}, refreshing token once", label);
                self.token_cache.refresh_token().await?;
                self.send_once(method, &url, body).await
            }
            other => other,
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, GatewayError> {
        let correlation_id = Uuid::new_v4();
        let started = Instant::now();

        let authorization = self.token_cache.get_authorization_header().await?;

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header("x-request-id", correlation_id.to_string());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::transient(format!("request timed out: {}", e))
            } else {
                GatewayError::transient(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            correlation_id = %correlation_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "[Rest] Request completed"
        );

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GatewayError::authentication(format!(
                "workspace endpoint rejected the token ({})",
                status
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(GatewayError::from_status(
                status.as_u16(),
                format!("{} returned {}: {}", url, status, snippet),
            ));
        }

        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(serde_json::Value::Null);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::transient(format!("failed to read response: {}", e)))?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::client_request(format!("malformed response JSON: {}", e)))
    }
}
