//! Result cache - fingerprinted, TTL-bounded row sets
//!
//! Best-effort only: entries expire on a fixed TTL regardless of access,
//! nothing invalidates them when the underlying data changes, and callers
//! must treat cached rows as possibly stale within the TTL window. The
//! cache is never a correctness dependency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use super::session::{QueryParam, SqlRow};

/// Default entry lifetime.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    rows: Arc<Vec<SqlRow>>,
    inserted_at: Instant,
}

pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_RESULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Deterministic key for a statement plus its bound parameters.
    pub fn fingerprint(statement: &str, params: &[QueryParam]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(statement.as_bytes());
        hasher.update(b"\n");
        hasher.update(serde_json::to_string(params).unwrap_or_default().as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Non-expired rows for a fingerprint. Expired entries are removed on
    /// the way out (lazy expiry).
    pub fn get(&self, fingerprint: &str) -> Option<Arc<Vec<SqlRow>>> {
        {
            let entries = self.entries.read();
            match entries.get(fingerprint) {
                Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                    return Some(Arc::clone(&entry.rows));
                }
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write();
        entries.remove(fingerprint);
        debug!(fingerprint = %fingerprint, "[ResultCache] Entry expired");
        None
    }

    pub fn insert(&self, fingerprint: String, rows: Arc<Vec<SqlRow>>) {
        let mut entries = self.entries.write();
        entries.insert(
            fingerprint,
            CacheEntry {
                rows,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop everything; returns the number of entries removed.
    pub fn flush(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        if count > 0 {
            debug!("[ResultCache] Flushed {} entries", count);
        }
        count
    }

    /// Drop expired entries; returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entry count without blocking; `None` when the lock is contended.
    pub fn try_len(&self) -> Option<usize> {
        self.entries.try_read().map(|entries| entries.len())
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}
