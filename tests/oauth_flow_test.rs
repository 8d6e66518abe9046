// Integration tests for the OAuth flow API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use mockito::Matcher;
use spendsync::adapters::{
    AppCredentials, GoogleAdapter, MetaAdapter, PlatformAdapter, TikTokAdapter,
};
use spendsync::api::{create_router, ApiState};
use spendsync::cipher::SecretCipher;
use spendsync::export::SpendExporter;
use spendsync::flow::Orchestrator;
use spendsync::platform::Platform;
use spendsync::session::AdminSession;
use spendsync::state_token::StateTokenCodec;
use spendsync::vault::{CredentialVault, MemoryStore, StorageLocation};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

const REDIRECT: &str = "http://localhost:8888/oauth/callback";

fn codec() -> StateTokenCodec {
    StateTokenCodec::new(Some("integration-test-key"))
}

fn build_app(
    dir: &Path,
    adapters: Vec<Arc<dyn PlatformAdapter>>,
) -> (Router, Arc<CredentialVault>) {
    let cipher = SecretCipher::from_key(Some(&BASE64.encode([1u8; 32]))).unwrap();
    let vault = Arc::new(CredentialVault::new(
        dir,
        cipher,
        Box::new(MemoryStore::new()),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&vault),
        codec(),
        SpendExporter::new(dir),
        adapters,
        REDIRECT.to_string(),
        false,
    ));
    let sessions = Arc::new(AdminSession::new(dir, codec()));
    let app = create_router(ApiState {
        orchestrator,
        vault: Arc::clone(&vault),
        sessions,
        admin_email: Some("admin@example.com".to_string()),
    });
    (app, vault)
}

fn unconfigured_meta() -> Vec<Arc<dyn PlatformAdapter>> {
    vec![Arc::new(MetaAdapter::new(AppCredentials::default()))]
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_start_returns_simulated_url_when_unconfigured() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path(), unconfigured_meta());

    let (status, json) = get(app, "/oauth/meta/start").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["simulated"], true);
    let url = json["authorization_url"].as_str().unwrap();
    assert!(url.starts_with(REDIRECT));
    assert!(url.contains("token=SIMULATED_META_TOKEN"));
}

#[tokio::test]
async fn test_start_redirects_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![Arc::new(MetaAdapter::new(
        AppCredentials::new("meta-app", "meta-secret"),
    ))];
    let (app, _) = build_app(dir.path(), adapters);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/meta/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.starts_with("https://www.facebook.com/"));
    assert!(location.contains("client_id=meta-app"));
}

#[tokio::test]
async fn test_start_unknown_platform_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path(), unconfigured_meta());

    let (status, _) = get(app, "/oauth/shopify/start").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_callback_with_simulated_token() {
    let dir = tempfile::tempdir().unwrap();
    let (app, vault) = build_app(dir.path(), unconfigured_meta());

    let (status, json) = get(
        app,
        "/oauth/callback?platform=meta&token=SIMULATED_META_TOKEN",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["stage"], "synced");
    assert_eq!(json["synthetic"], true);
    assert_eq!(
        vault.retrieve_token(Platform::Meta, None),
        Some("SIMULATED_META_TOKEN".to_string())
    );

    // The sync wrote the normalized export
    let csv = std::fs::read_to_string(dir.path().join("spend.csv")).unwrap();
    assert!(csv.starts_with("campaign_id,ad_spend,platform,date"));
}

#[tokio::test]
async fn test_callback_provider_error_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, vault) = build_app(dir.path(), unconfigured_meta());

    let (status, json) = get(app, "/oauth/callback?platform=meta&error=access_denied").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["stage"], "errored");
    assert_eq!(
        vault.locate_token(Platform::Meta, None),
        StorageLocation::None
    );
}

#[tokio::test]
async fn test_callback_invalid_state_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, vault) = build_app(dir.path(), unconfigured_meta());

    let (status, json) = get(
        app,
        "/oauth/callback?platform=meta&token=tok&state=forged-value",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Invalid or expired state token"));
    assert_eq!(
        vault.locate_token(Platform::Meta, None),
        StorageLocation::None
    );
}

#[tokio::test]
async fn test_callback_valid_state_binds_user() {
    let dir = tempfile::tempdir().unwrap();
    let (app, vault) = build_app(dir.path(), unconfigured_meta());

    let state = codec().issue("alice@example.com");
    let uri = format!("/oauth/callback?platform=meta&token=tok-alice&state={}", state);
    let (status, json) = get(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user_email"], "alice@example.com");
    assert_eq!(
        vault.retrieve_token(Platform::Meta, Some("alice@example.com")),
        Some("tok-alice".to_string())
    );
}

#[tokio::test]
async fn test_meta_code_exchange_stores_long_lived_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/oauth/access_token")
        .match_query(Matcher::UrlEncoded("code".into(), "X".into()))
        .with_status(200)
        .with_body(r#"{"access_token": "S"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/oauth/access_token")
        .match_query(Matcher::UrlEncoded(
            "grant_type".into(),
            "fb_exchange_token".into(),
        ))
        .with_status(200)
        .with_body(r#"{"access_token": "L"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![Arc::new(MetaAdapter::with_base_url(
        AppCredentials::new("meta-app", "meta-secret"),
        server.url(),
    ))];
    let (app, vault) = build_app(dir.path(), adapters);

    let (status, json) = get(app, "/oauth/callback?platform=meta&code=X").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(
        vault.retrieve_token(Platform::Meta, None),
        Some("L".to_string())
    );
}

#[tokio::test]
async fn test_google_callback_persists_refresh_token() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token": "at-1", "refresh_token": "rt-1"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![Arc::new(GoogleAdapter::with_base_url(
        AppCredentials::new("google-client", "google-secret"),
        server.url(),
    ))];
    let (app, vault) = build_app(dir.path(), adapters);

    let (status, json) = get(app, "/oauth/callback?platform=google&code=gcode").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    // Synthetic sync (no Ads API client wired in), but the durable refresh
    // token is what got stored
    assert_eq!(json["synthetic"], true);
    assert_eq!(
        vault.retrieve_token(Platform::Google, None),
        Some("rt-1".to_string())
    );
}

#[tokio::test]
async fn test_tiktok_embedded_error_fails_flow() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/oauth2/access_token/")
        .with_status(200)
        .with_body(r#"{"code": 40001, "message": "auth_code expired"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![Arc::new(TikTokAdapter::with_base_url(
        AppCredentials::new("tt-app", "tt-secret"),
        server.url(),
    ))];
    let (app, vault) = build_app(dir.path(), adapters);

    let (status, json) = get(app, "/oauth/callback?platform=tiktok&code=stale").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("40001"));
    assert_eq!(
        vault.locate_token(Platform::TikTok, None),
        StorageLocation::None
    );
}

#[tokio::test]
async fn test_callback_missing_code_and_token() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_app(dir.path(), unconfigured_meta());

    let (status, json) = get(app, "/oauth/callback?platform=meta").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("Missing token or code"));
}
