//! Credential strategies and token cache behavior against a mock identity
//! provider.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use lakemux_core::GatewayError;
use lakemux_gateway::{
    ClientSecretCredential, ManagedIdentityCredential, TokenCache, TokenCredential,
};
use pretty_assertions::assert_eq;
use tests::MockCredential;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCOPE: &str = "https://warehouse.example.net/.default";

#[tokio::test]
async fn client_secret_acquires_and_caches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dir-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=app-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3600,
            "access_token": "secret-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential =
        ClientSecretCredential::new("dir-1", "app-1", "s3cret").with_authority(server.uri());
    let cache = TokenCache::new(Arc::new(credential), SCOPE);

    // Two calls inside the expiry window: one underlying acquisition.
    assert_eq!(cache.get_access_token().await.unwrap(), "secret-token");
    assert_eq!(cache.get_access_token().await.unwrap(), "secret-token");

    let info = cache.get_token_info().await.unwrap();
    assert!(info.valid);
    assert_eq!(info.source, "client_secret");
}

#[tokio::test]
async fn client_secret_rejection_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dir-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "invalid_client"
        })))
        .mount(&server)
        .await;

    let credential =
        ClientSecretCredential::new("dir-1", "app-1", "wrong").with_authority(server.uri());
    let cache = TokenCache::new(Arc::new(credential), SCOPE);

    let err = cache.get_access_token().await.unwrap_err();
    assert!(matches!(err, GatewayError::Authentication { .. }));
    // A failed acquisition leaves nothing cached.
    assert!(cache.get_token_info().await.is_none());
}

#[tokio::test]
async fn managed_identity_queries_metadata_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/identity/oauth2/token"))
        .and(header("Metadata", "true"))
        .and(query_param("resource", "https://warehouse.example.net"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "mi-token",
            "expires_on": "1954400000",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = ManagedIdentityCredential::new(None)
        .with_endpoint(format!("{}/metadata/identity/oauth2/token", server.uri()));

    let token = credential.acquire(SCOPE).await.unwrap();
    assert_eq!(token.token, "mi-token");
    assert!(token.expires_at.is_some());
}

#[tokio::test]
async fn refresh_forces_a_new_acquisition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dir-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3600,
            "access_token": "fresh-token"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let credential =
        ClientSecretCredential::new("dir-1", "app-1", "s3cret").with_authority(server.uri());
    let cache = TokenCache::new(Arc::new(credential), SCOPE);

    cache.get_access_token().await.unwrap();
    cache.refresh_token().await.unwrap();
}

#[tokio::test]
async fn expiry_inside_buffer_reacquires() {
    // Four minutes to expiry: inside the five-minute buffer, so every call
    // goes back to the strategy.
    let credential = Arc::new(MockCredential::new(Some(chrono::Duration::minutes(4))));
    let cache = TokenCache::new(credential.clone(), SCOPE);

    cache.get_access_token().await.unwrap();
    cache.get_access_token().await.unwrap();
    assert_eq!(credential.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn authorization_header_carries_bearer_prefix() {
    let credential = Arc::new(MockCredential::new(Some(chrono::Duration::hours(1))));
    let cache = TokenCache::new(credential, SCOPE);

    assert_eq!(
        cache.get_authorization_header().await.unwrap(),
        "Bearer mock-token-1"
    );
}
