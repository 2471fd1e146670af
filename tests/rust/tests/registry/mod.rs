//! Tenant registry and tenants document behavior.

use lakemux_core::{CredentialDeclaration, GatewayError, PoolKind, TenantsDocument};
use lakemux_gateway::TenantRegistry;
use pretty_assertions::assert_eq;
use tests::mock_tenant;

const DOCUMENT: &str = r#"{
    "defaultTenant": "acme",
    "tenants": [
        {
            "name": "acme",
            "subscriptionId": "sub-1",
            "resourceGroup": "rg-1",
            "workspaceName": "acme-analytics",
            "pools": [
                {
                    "name": "warehouse",
                    "kind": "dedicated",
                    "connection": { "host": "acme.sql.example.net", "database": "warehouse" }
                },
                {
                    "name": "ondemand",
                    "kind": "serverless",
                    "connection": { "host": "acme-ondemand.sql.example.net", "database": "master" }
                }
            ],
            "credentials": { "type": "cli" }
        },
        {
            "name": "globex",
            "subscriptionId": "sub-2",
            "resourceGroup": "rg-2",
            "workspaceName": "globex-analytics",
            "credentials": { "type": "managed_identity" }
        }
    ]
}"#;

#[tokio::test]
async fn registry_from_persisted_document() {
    let doc = TenantsDocument::from_json_str(DOCUMENT).unwrap();
    let registry = TenantRegistry::from_document(doc).await;

    assert_eq!(registry.list_tenants().await, vec!["acme", "globex"]);

    // Omitted name resolves through the document default.
    let tenant = registry.get_tenant(None).await.unwrap();
    assert_eq!(tenant.name, "acme");
    assert_eq!(tenant.credentials, CredentialDeclaration::Cli);
}

#[tokio::test]
async fn descriptor_lookup_takes_first_kind_match() {
    let doc = TenantsDocument::from_json_str(DOCUMENT).unwrap();
    let registry = TenantRegistry::from_document(doc).await;

    let dedicated = registry
        .get_connection_descriptor(Some("acme"), PoolKind::Dedicated)
        .await
        .unwrap();
    assert_eq!(dedicated.host, "acme.sql.example.net");
    assert_eq!(dedicated.port, 1433);

    let serverless = registry
        .get_connection_descriptor(Some("acme"), PoolKind::Serverless)
        .await
        .unwrap();
    assert_eq!(serverless.host, "acme-ondemand.sql.example.net");

    // globex declares no pools at all
    assert!(registry
        .get_connection_descriptor(Some("globex"), PoolKind::Dedicated)
        .await
        .is_none());
}

#[tokio::test]
async fn add_remove_and_default_lifecycle() {
    let registry = TenantRegistry::new();
    registry.add_tenant(mock_tenant("acme")).await.unwrap();
    registry.add_tenant(mock_tenant("globex")).await.unwrap();

    // No default yet and nothing named "default": omitted name is absent.
    assert!(registry.get_tenant(None).await.is_none());

    registry.set_default_tenant("globex").await.unwrap();
    assert_eq!(registry.get_tenant(None).await.unwrap().name, "globex");

    assert!(registry.remove_tenant("globex").await);
    assert!(registry.get_tenant(None).await.is_none());

    // Defaulting to an unregistered tenant is refused.
    let err = registry.set_default_tenant("ghost").await.unwrap_err();
    assert!(matches!(err, GatewayError::Config(_)));
}

#[tokio::test]
async fn tenant_named_default_is_the_fallback() {
    let registry = TenantRegistry::new();
    registry.add_tenant(mock_tenant("default")).await.unwrap();
    registry.add_tenant(mock_tenant("acme")).await.unwrap();

    assert_eq!(registry.get_tenant(None).await.unwrap().name, "default");
}

#[tokio::test]
async fn document_save_and_reload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("tenants.json");

    let doc = TenantsDocument::from_json_str(DOCUMENT).unwrap();
    doc.save(&file).unwrap();

    let reloaded = TenantsDocument::load(Some(&file)).unwrap();
    assert_eq!(reloaded.default_tenant.as_deref(), Some("acme"));
    assert_eq!(reloaded.tenants.len(), 2);
    assert_eq!(
        reloaded.get("globex").unwrap().credentials,
        CredentialDeclaration::ManagedIdentity { client_id: None }
    );
}

#[tokio::test]
async fn missing_document_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let doc = TenantsDocument::load(Some(&dir.path().join("nope.json"))).unwrap();
    assert!(doc.tenants.iter().all(|t| t.name != "acme"));
}
