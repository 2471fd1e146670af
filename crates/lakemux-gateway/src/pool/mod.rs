//! Connection pool - pooled SQL sessions with a TTL result cache
//!
//! - **SqlSession / SessionConnector**: the seam between the pool and the
//!   wire protocol; the production connector speaks TDS, tests plug in a
//!   scripted backend
//! - **ResultCache**: fingerprinted, TTL-bounded, best-effort row cache
//! - **ConnectionPool**: one session per (tenant, database, pool-kind)
//!   key, with concurrent creation coalesced onto a single attempt

mod result_cache;
mod service;
mod session;
mod tds;

pub use result_cache::{ResultCache, DEFAULT_RESULT_TTL};
pub use service::{ConnectionPool, PoolKey, PoolStats};
pub use session::{QueryParam, SessionConnector, SqlRow, SqlSession};
pub use tds::TdsConnector;
