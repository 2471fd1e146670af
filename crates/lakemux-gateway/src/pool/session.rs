//! Session traits and parameter binding.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lakemux_core::{ConnectionDescriptor, GatewayError};
use serde::Serialize;

/// One result row, keyed by column name in select order.
pub type SqlRow = serde_json::Map<String, serde_json::Value>;

/// A bound statement parameter, in the session's type vocabulary.
///
/// The mapping from native values is total and deterministic: strings stay
/// text, integral numbers become integers, other numbers become floats,
/// booleans become bits, date/times become timestamps, and anything else
/// falls back to its text rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl QueryParam {
    pub fn from_json(value: &serde_json::Value) -> QueryParam {
        match value {
            serde_json::Value::Null => QueryParam::Null,
            serde_json::Value::Bool(b) => QueryParam::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => QueryParam::Int(i),
                None => QueryParam::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => QueryParam::Text(s.clone()),
            // Arrays and objects have no session-side type: text fallback.
            other => QueryParam::Text(other.to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryParam::Text(_) => "text",
            QueryParam::Int(_) => "int",
            QueryParam::Float(_) => "float",
            QueryParam::Bool(_) => "bool",
            QueryParam::Timestamp(_) => "timestamp",
            QueryParam::Null => "null",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        QueryParam::Text(value.to_string())
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        QueryParam::Int(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        QueryParam::Float(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        QueryParam::Bool(value)
    }
}

impl From<DateTime<Utc>> for QueryParam {
    fn from(value: DateTime<Utc>) -> Self {
        QueryParam::Timestamp(value)
    }
}

/// A live, authenticated session against one pool endpoint.
///
/// Sessions execute one statement at a time; concurrent callers sharing a
/// session are serialized by the implementation. A session that observes a
/// fatal transport error flips `is_ready` so the pool evicts it on the
/// next lookup.
#[async_trait]
pub trait SqlSession: Send + Sync {
    async fn execute(
        &self,
        statement: &str,
        params: &[QueryParam],
    ) -> Result<Vec<SqlRow>, GatewayError>;

    fn is_ready(&self) -> bool;

    /// Must be safe to call on an already-closed session.
    async fn close(&self);
}

impl std::fmt::Debug for dyn SqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession")
            .field("is_ready", &self.is_ready())
            .finish()
    }
}

/// Opens sessions from connection descriptors.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// `token` is present when the descriptor's auth mode is bearer.
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        token: Option<&str>,
    ) -> Result<Arc<dyn SqlSession>, GatewayError>;
}
