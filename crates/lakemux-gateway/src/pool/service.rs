//! Connection pool service
//!
//! One live session per (tenant, database, pool-kind) key. Concurrent
//! creation requests for the same key are coalesced onto a single connect
//! attempt: the first caller registers a shared in-flight future, later
//! callers await the same future, and exactly one physical session comes
//! out the other end.
//!
//! Invariants:
//! - at most one pooled session per key
//! - at most one in-flight creation per key, never alongside a pooled
//!   session for that key
//! - a failed creation removes the in-flight marker and propagates without
//!   retrying (retry is the caller's decision, via `retry_operation`)
//!
//! The maps are service-owned state, not ambient singletons; the in-flight
//! map's check-then-insert runs under a mutex so the invariants hold on a
//! multi-threaded runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use lakemux_core::{GatewayError, PoolKind, SessionAuth};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::result_cache::ResultCache;
use super::session::{QueryParam, SessionConnector, SqlRow, SqlSession};
use crate::registry::TenantRegistry;

/// Composite key for pooled sessions.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct PoolKey {
    pub tenant: String,
    pub database: String,
    pub kind: PoolKind,
}

impl PoolKey {
    pub fn new(tenant: impl Into<String>, database: impl Into<String>, kind: PoolKind) -> Self {
        Self {
            tenant: tenant.into(),
            database: database.into(),
            kind,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.database, self.kind)
    }
}

/// Pool counters for the stats surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub active_connections: usize,
    pub cached_results: usize,
    pub active_keys: Vec<String>,
}

type ConnectOutcome = Result<Arc<dyn SqlSession>, GatewayError>;
type SharedConnect = Shared<BoxFuture<'static, ConnectOutcome>>;

pub struct ConnectionPool {
    registry: Arc<TenantRegistry>,
    connector: Arc<dyn SessionConnector>,
    sessions: DashMap<PoolKey, Arc<dyn SqlSession>>,
    in_flight: Mutex<HashMap<PoolKey, SharedConnect>>,
    cache: ResultCache,
}

impl ConnectionPool {
    pub fn new(registry: Arc<TenantRegistry>, connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            registry,
            connector,
            sessions: DashMap::new(),
            in_flight: Mutex::new(HashMap::new()),
            cache: ResultCache::new(),
        }
    }

    /// Override the result cache TTL.
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.cache = ResultCache::with_ttl(ttl);
        self
    }

    /// A ready session for the key, reusing, joining an in-flight attempt,
    /// or opening a new one.
    pub async fn get_connection(
        &self,
        tenant: Option<&str>,
        database: &str,
        kind: PoolKind,
    ) -> Result<Arc<dyn SqlSession>, GatewayError> {
        let tenant_name = self
            .registry
            .resolve_name(tenant)
            .await
            .ok_or_else(|| GatewayError::config("no tenant specified and no default registered"))?;

        let descriptor = self
            .registry
            .get_connection_descriptor(Some(&tenant_name), kind)
            .await
            .ok_or_else(|| {
                GatewayError::client_request(format!(
                    "tenant '{}' has no {} pool registered",
                    tenant_name, kind
                ))
            })?;

        let key = PoolKey::new(tenant_name.clone(), database, kind);

        // Ready sessions are returned as-is; no validation ping.
        if let Some(entry) = self.sessions.get(&key) {
            if entry.is_ready() {
                debug!(key = %key, "[Pool] Reusing session");
                return Ok(Arc::clone(entry.value()));
            }
        }
        if self.sessions.remove_if(&key, |_, s| !s.is_ready()).is_some() {
            debug!(key = %key, "[Pool] Evicted dead session");
        }

        // Join the in-flight attempt for this key, or register one. The
        // check-then-insert is atomic under the lock.
        let shared = {
            let mut in_flight = self.in_flight.lock();

            // A session may have been published while we were resolving.
            if let Some(entry) = self.sessions.get(&key) {
                if entry.is_ready() {
                    return Ok(Arc::clone(entry.value()));
                }
            }

            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(key = %key, "[Pool] Joining in-flight creation");
                    existing.clone()
                }
                None => {
                    info!(key = %key, host = %descriptor.host, "[Pool] Opening session");
                    let shared = self.spawn_connect(&key, descriptor.clone());
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let outcome = shared.clone().await;

        // First settler for this attempt removes the marker and, on
        // success, publishes the session - atomically, so no other caller
        // can register a second attempt in between. Later settlers and
        // attempts superseded by `close_all` skip both.
        let settled_here = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(current) if current.ptr_eq(&shared) => {
                    in_flight.remove(&key);
                    if let Ok(session) = &outcome {
                        self.sessions.insert(key.clone(), Arc::clone(session));
                    }
                    true
                }
                _ => false,
            }
        };

        match outcome {
            Ok(session) => {
                if settled_here {
                    return Ok(session);
                }

                let still_pooled = self
                    .sessions
                    .get(&key)
                    .map(|entry| Arc::ptr_eq(entry.value(), &session))
                    .unwrap_or(false);
                if still_pooled {
                    Ok(session)
                } else {
                    // The pool was shut down while this attempt settled;
                    // do not leak the orphaned session.
                    session.close().await;
                    Err(GatewayError::connection(format!(
                        "pool shut down while opening session for {}",
                        key
                    )))
                }
            }
            Err(err) => {
                if settled_here {
                    warn!(key = %key, "[Pool] Session creation failed: {}", err);
                }
                Err(err)
            }
        }
    }

    /// Spawn the single physical connect attempt for a key. Runs as a task
    /// so it finishes even if every awaiting caller goes away.
    fn spawn_connect(
        &self,
        key: &PoolKey,
        descriptor: lakemux_core::ConnectionDescriptor,
    ) -> SharedConnect {
        let connector = Arc::clone(&self.connector);
        let registry = Arc::clone(&self.registry);
        let tenant = key.tenant.clone();

        let handle = tokio::spawn(async move {
            let token = match &descriptor.auth {
                SessionAuth::Bearer => {
                    let cache = registry.token_cache(Some(&tenant)).await?;
                    Some(cache.get_access_token().await?)
                }
                SessionAuth::SqlLogin { .. } => None,
            };
            connector.connect(&descriptor, token.as_deref()).await
        });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(GatewayError::connection(format!(
                    "session creation task failed: {}",
                    join_err
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// Execute a statement through a session, consulting the result cache
    /// first. Failed executions are never cached.
    pub async fn execute_query(
        &self,
        session: &Arc<dyn SqlSession>,
        statement: &str,
        params: &[QueryParam],
    ) -> Result<Arc<Vec<SqlRow>>, GatewayError> {
        let fingerprint = ResultCache::fingerprint(statement, params);

        if let Some(rows) = self.cache.get(&fingerprint) {
            debug!(fingerprint = %fingerprint, "[Pool] Result cache hit");
            return Ok(rows);
        }

        let started = Instant::now();
        match session.execute(statement, params).await {
            Ok(rows) => {
                debug!(
                    fingerprint = %fingerprint,
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "[Pool] Statement executed"
                );
                let rows = Arc::new(rows);
                self.cache.insert(fingerprint, Arc::clone(&rows));
                Ok(rows)
            }
            Err(err) => {
                warn!(
                    fingerprint = %fingerprint,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "[Pool] Statement failed: {}",
                    err
                );
                Err(err)
            }
        }
    }

    /// Resolve, connect, execute: the path thin command handlers call.
    ///
    /// A connection-class failure evicts the session so the next call
    /// reconnects.
    pub async fn execute(
        &self,
        tenant: Option<&str>,
        database: &str,
        kind: PoolKind,
        statement: &str,
        params: &[QueryParam],
    ) -> Result<Arc<Vec<SqlRow>>, GatewayError> {
        let session = self.get_connection(tenant, database, kind).await?;

        match self.execute_query(&session, statement, params).await {
            Err(err @ GatewayError::Connection { .. }) => {
                if let Some(name) = self.registry.resolve_name(tenant).await {
                    self.evict(&PoolKey::new(name, database, kind));
                }
                Err(err)
            }
            other => other,
        }
    }

    /// Drop a session from the pool without closing it (dead-session
    /// cleanup; the transport is already gone).
    pub fn evict(&self, key: &PoolKey) {
        if self.sessions.remove(key).is_some() {
            debug!(key = %key, "[Pool] Evicted session");
        }
    }

    /// Close and remove one session. Returns whether one existed.
    pub async fn close_connection(
        &self,
        tenant: Option<&str>,
        database: &str,
        kind: PoolKind,
    ) -> bool {
        let Some(name) = self.registry.resolve_name(tenant).await else {
            return false;
        };
        let key = PoolKey::new(name, database, kind);

        match self.sessions.remove(&key) {
            Some((_, session)) => {
                session.close().await;
                info!(key = %key, "[Pool] Closed session");
                true
            }
            None => false,
        }
    }

    /// Close every session concurrently, clear the pool and flush the
    /// result cache. Safe to call with sessions already closed; never
    /// errors. Used during graceful shutdown.
    pub async fn close_all(&self) {
        let mut sessions = Vec::new();
        let keys: Vec<PoolKey> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, session)) = self.sessions.remove(&key) {
                sessions.push(session);
            }
        }

        // Abandon in-flight attempts; their settlers will close any
        // session that still materializes.
        self.in_flight.lock().clear();

        let count = sessions.len();
        futures::future::join_all(sessions.iter().map(|s| s.close())).await;
        let flushed = self.cache.flush();

        info!(
            "[Pool] Shutdown: closed {} session(s), flushed {} cached result(s)",
            count, flushed
        );
    }

    /// Flush the result cache; returns the number of entries dropped.
    pub fn clear_cache(&self) -> usize {
        self.cache.flush()
    }

    /// Pool counters. Never fails: a contended cache degrades to a
    /// placeholder count with a logged warning.
    pub fn stats(&self) -> PoolStats {
        let cached_results = match self.cache.try_len() {
            Some(n) => n,
            None => {
                warn!("[Pool] Result cache busy; reporting placeholder count");
                0
            }
        };

        let active_keys: Vec<String> = self.sessions.iter().map(|e| e.key().to_string()).collect();

        PoolStats {
            active_connections: active_keys.len(),
            cached_results,
            active_keys,
        }
    }
}
