//! Gateway error taxonomy
//!
//! Four operational classes plus configuration misuse:
//!
//! - `Authentication` - credential acquisition failed; never retried by the
//!   token layer itself, callers may refresh and retry once
//! - `Connection` - a session failed to open or died mid-use; the session
//!   is evicted and the caller decides whether to retry
//! - `ClientRequest` - 4xx-equivalent; retrying is futile
//! - `Transient` - network/5xx/timeout; retried by the request executor
//! - `Config` - registry misuse (unknown tenant, bad document); treated
//!   like a client error, never retried

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("request rejected: {message}")]
    ClientRequest { status: Option<u16>, message: String },

    #[error("transient failure: {message}")]
    Transient { status: Option<u16>, message: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn authentication(message: impl Into<String>) -> Self {
        GatewayError::Authentication {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        GatewayError::Connection {
            message: message.into(),
        }
    }

    pub fn client_request(message: impl Into<String>) -> Self {
        GatewayError::ClientRequest {
            status: None,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        GatewayError::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        GatewayError::Config(message.into())
    }

    /// Classify an HTTP-like status: [400,500) is the caller's fault and
    /// terminal, everything else is worth retrying.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if (400..500).contains(&status) {
            GatewayError::ClientRequest {
                status: Some(status),
                message: message.into(),
            }
        } else {
            GatewayError::Transient {
                status: Some(status),
                message: message.into(),
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::ClientRequest { status, .. } | GatewayError::Transient { status, .. } => {
                *status
            }
            _ => None,
        }
    }

    /// Whether the request executor should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transient { .. } | GatewayError::Connection { .. }
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Authentication { .. } => "authentication",
            GatewayError::Connection { .. } => "connection",
            GatewayError::ClientRequest { .. } => "client_request",
            GatewayError::Transient { .. } => "transient",
            GatewayError::Config(_) => "config",
        }
    }

    /// Diagnosis hint derived from the error message.
    pub fn hint(&self) -> FailureHint {
        FailureHint::classify(&self.to_string())
    }
}

/// Coarse diagnosis buckets derived from message substrings.
///
/// Deliberately shallow: enough to point a human at the right knob without
/// echoing anything sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureHint {
    Authentication,
    Permission,
    Syntax,
    Timeout,
    Connectivity,
    Unknown,
}

impl FailureHint {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();

        if lower.contains("login") || lower.contains("auth") || lower.contains("token") {
            FailureHint::Authentication
        } else if lower.contains("permission")
            || lower.contains("forbidden")
            || lower.contains("denied")
        {
            FailureHint::Permission
        } else if lower.contains("syntax") || lower.contains("invalid object") {
            FailureHint::Syntax
        } else if lower.contains("timeout") || lower.contains("timed out") {
            FailureHint::Timeout
        } else if lower.contains("connect")
            || lower.contains("network")
            || lower.contains("refused")
            || lower.contains("socket")
        {
            FailureHint::Connectivity
        } else {
            FailureHint::Unknown
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            FailureHint::Authentication => {
                "Check the tenant's credential declaration and that the identity is still valid."
            }
            FailureHint::Permission => {
                "The identity authenticated but lacks access to this resource."
            }
            FailureHint::Syntax => "The statement was rejected; check the SQL text.",
            FailureHint::Timeout => {
                "The operation timed out; the pool may be paused, scaling, or overloaded."
            }
            FailureHint::Connectivity => {
                "Could not reach the endpoint; check the host, firewall rules, and network."
            }
            FailureHint::Unknown => "See the error message for details.",
        }
    }
}

/// Structured failure payload for the agent-facing surface.
///
/// Carries a correlation id so a failure reported upstream can be matched
/// against the gateway logs. Never includes token material.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub category: &'static str,
    pub message: String,
    pub hint: &'static str,
    pub correlation_id: Uuid,
}

impl FailureReport {
    pub fn from_error(error: &GatewayError) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
            hint: error.hint().advice(),
            correlation_id: Uuid::new_v4(),
        }
    }
}
