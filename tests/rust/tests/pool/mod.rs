//! Connection pool behavior: coalescing, result caching, eviction,
//! shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use lakemux_core::{GatewayError, PoolKind};
use lakemux_gateway::{ConnectionPool, TenantRegistry};
use pretty_assertions::assert_eq;
use tests::{mock_tenant, sample_row, MockConnector};

async fn pool_with(connector: Arc<MockConnector>) -> Arc<ConnectionPool> {
    let registry = TenantRegistry::new();
    registry.add_tenant(mock_tenant("acme")).await.unwrap();
    Arc::new(ConnectionPool::new(Arc::new(registry), connector))
}

#[tokio::test]
async fn concurrent_callers_share_one_connect_attempt() {
    let connector = Arc::new(MockConnector::new());
    let pool = pool_with(connector.clone()).await;

    let (a, b, c) = tokio::join!(
        pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated),
        pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated),
        pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated),
    );

    let a = a.unwrap();
    assert!(Arc::ptr_eq(&a, &b.unwrap()));
    assert!(Arc::ptr_eq(&a, &c.unwrap()));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_keys_get_distinct_sessions() {
    let connector = Arc::new(MockConnector::new());
    let pool = pool_with(connector.clone()).await;

    let a = pool
        .get_connection(Some("acme"), "db1", PoolKind::Dedicated)
        .await
        .unwrap();
    let b = pool
        .get_connection(Some("acme"), "db2", PoolKind::Dedicated)
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_creation_clears_marker_and_propagates() {
    let connector = Arc::new(MockConnector::new().fail_first(1));
    let pool = pool_with(connector.clone()).await;

    let err = pool
        .get_connection(Some("acme"), "db1", PoolKind::Dedicated)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Connection { .. }));
    assert_eq!(pool.stats().active_connections, 0);

    // The in-flight marker is gone: a second call starts a fresh attempt.
    pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated)
        .await
        .unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn coalesced_callers_see_the_same_failure() {
    let connector = Arc::new(MockConnector::new().fail_first(1));
    let pool = pool_with(connector.clone()).await;

    let (a, b) = tokio::join!(
        pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated),
        pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated),
    );

    assert!(a.is_err());
    assert!(b.is_err());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_pool_kind_surfaces_client_error_without_connecting() {
    let connector = Arc::new(MockConnector::new());
    let pool = pool_with(connector.clone()).await;

    let err = pool
        .execute(Some("acme"), "db1", PoolKind::Serverless, "SELECT 1", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::ClientRequest { .. }));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_tenant_is_config_error() {
    let pool = pool_with(Arc::new(MockConnector::new())).await;

    let err = pool
        .get_connection(None, "db1", PoolKind::Dedicated)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
}

#[tokio::test]
async fn identical_statements_within_ttl_hit_the_cache() {
    let connector = Arc::new(MockConnector::new().with_rows(vec![sample_row(7)]));
    let pool = pool_with(connector.clone()).await;

    let rows = pool
        .execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 7", &[])
        .await
        .unwrap();
    let again = pool
        .execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 7", &[])
        .await
        .unwrap();

    assert_eq!(rows, again);
    let session = connector.last_session().unwrap();
    assert_eq!(session.executions.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cache_expiry_triggers_reexecution() {
    let connector = Arc::new(MockConnector::new());
    let registry = TenantRegistry::new();
    registry.add_tenant(mock_tenant("acme")).await.unwrap();
    let pool = ConnectionPool::new(Arc::new(registry), connector.clone())
        .with_result_ttl(Duration::from_secs(30));

    pool.execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 1", &[])
        .await
        .unwrap();
    pool.execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 1", &[])
        .await
        .unwrap();

    let session = connector.last_session().unwrap();
    assert_eq!(session.executions.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(31)).await;

    pool.execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 1", &[])
        .await
        .unwrap();
    assert_eq!(session.executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn different_parameters_are_distinct_cache_entries() {
    use lakemux_gateway::QueryParam;

    let connector = Arc::new(MockConnector::new());
    let pool = pool_with(connector.clone()).await;

    pool.execute(
        Some("acme"),
        "db1",
        PoolKind::Dedicated,
        "SELECT * FROM t WHERE id = @P1",
        &[QueryParam::Int(1)],
    )
    .await
    .unwrap();
    pool.execute(
        Some("acme"),
        "db1",
        PoolKind::Dedicated,
        "SELECT * FROM t WHERE id = @P1",
        &[QueryParam::Int(2)],
    )
    .await
    .unwrap();

    let session = connector.last_session().unwrap();
    assert_eq!(session.executions.load(Ordering::SeqCst), 2);
    assert_eq!(pool.stats().cached_results, 2);
}

#[tokio::test]
async fn connection_error_evicts_session_and_next_call_reconnects() {
    let connector = Arc::new(MockConnector::new());
    let pool = pool_with(connector.clone()).await;

    pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated)
        .await
        .unwrap();
    connector.last_session().unwrap().break_transport();

    let err = pool
        .execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Connection { .. }));

    // The dead session was evicted; the next call opens a new one.
    pool.execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 1", &[])
        .await
        .unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_execution_is_not_cached() {
    let connector = Arc::new(MockConnector::new());
    let pool = pool_with(connector.clone()).await;

    pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated)
        .await
        .unwrap();
    connector.last_session().unwrap().break_transport();

    let _ = pool
        .execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 1", &[])
        .await;
    assert_eq!(pool.stats().cached_results, 0);
}

#[tokio::test]
async fn close_all_is_idempotent_and_resets_everything() {
    let connector = Arc::new(MockConnector::new());
    let pool = pool_with(connector.clone()).await;

    pool.execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 1", &[])
        .await
        .unwrap();
    assert_eq!(pool.stats().active_connections, 1);

    pool.close_all().await;
    pool.close_all().await;

    let stats = pool.stats();
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.cached_results, 0);

    // The pool is still usable afterwards.
    pool.execute(Some("acme"), "db1", PoolKind::Dedicated, "SELECT 1", &[])
        .await
        .unwrap();
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stats_lists_active_keys() {
    let pool = pool_with(Arc::new(MockConnector::new())).await;

    pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated)
        .await
        .unwrap();

    let stats = pool.stats();
    assert_eq!(stats.active_keys, vec!["acme/db1/dedicated".to_string()]);
}

#[tokio::test]
async fn close_connection_removes_only_that_key() {
    let pool = pool_with(Arc::new(MockConnector::new())).await;

    pool.get_connection(Some("acme"), "db1", PoolKind::Dedicated)
        .await
        .unwrap();
    pool.get_connection(Some("acme"), "db2", PoolKind::Dedicated)
        .await
        .unwrap();

    assert!(pool.close_connection(Some("acme"), "db1", PoolKind::Dedicated).await);
    assert!(!pool.close_connection(Some("acme"), "db1", PoolKind::Dedicated).await);
    assert_eq!(pool.stats().active_connections, 1);
}
