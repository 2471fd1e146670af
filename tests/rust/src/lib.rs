//! Shared test utilities and fixtures for LakeMux integration tests.

pub use lakemux_core::{
    ConnectionDescriptor, CredentialDeclaration, GatewayError, PoolDescriptor, PoolKind,
    SessionAuth, TenantConfig, TenantsDocument,
};
pub use lakemux_gateway::{ConnectionPool, QueryParam, SqlRow, TenantRegistry};

pub use mocks::{MockConnector, MockCredential, MockSession};

/// Install a RUST_LOG-driven subscriber for test output. Idempotent.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A single-column row `{ "n": <n> }`.
pub fn sample_row(n: i64) -> SqlRow {
    let mut row = SqlRow::new();
    row.insert("n".to_string(), serde_json::json!(n));
    row
}

/// A tenant with one dedicated pool against a mock endpoint.
///
/// Sessions use SQL-login auth so tests exercise the pool without a token
/// round-trip; token behavior is covered by the auth tests.
pub fn mock_tenant(name: &str) -> TenantConfig {
    let mut connection = ConnectionDescriptor::new(format!("{}.sql.example.net", name), "db1");
    connection.auth = SessionAuth::SqlLogin {
        username: "sa".to_string(),
        password: "pw".to_string(),
    };

    TenantConfig::new(name, "sub-1", "rg-1", format!("{}-analytics", name)).with_pool(
        PoolDescriptor {
            name: "warehouse".to_string(),
            kind: PoolKind::Dedicated,
            connection,
        },
    )
}
