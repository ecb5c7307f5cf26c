#![allow(clippy::unwrap_used)]
// Integration tests for `TokenManager` using wiremock: refresh-on-first-
// use, the single 401 retry, and the failure fallbacks.

use reqwest::Method;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::token::{Credentials, TokenManager};
use devicehive_api::transport::{Transport, TransportOptions};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Transport) {
    let server = MockServer::start().await;
    let (event_tx, _event_rx) = mpsc::unbounded_channel();
    // The receiver is dropped: these tests only exercise the request
    // path, and event sends are fire-and-forget.
    let transport = Transport::create(
        &format!("{}/api/", server.uri()),
        TransportOptions::default(),
        event_tx,
    )
    .unwrap();
    transport.connect().await.unwrap();
    (server, transport)
}

fn device_request() -> RequestEnvelope {
    RequestEnvelope::new("device/get", Method::GET, "device/{deviceId}")
        .path_param("deviceId", "d-1")
        .response_key("device")
}

// ── Acquisition ─────────────────────────────────────────────────────

#[tokio::test]
async fn first_authorized_call_refreshes_transparently() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh"))
        .and(body_json(json!({ "refreshToken": "R" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "A" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/device/d-1"))
        .and(header("authorization", "Bearer A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "d-1", "name": "x" })))
        .expect(2)
        .mount(&server)
        .await;

    let manager = TokenManager::new(Credentials {
        refresh_token: Some("R".into()),
        ..Credentials::default()
    });

    // First call acquires the token; the second reuses it without
    // another refresh (the refresh mock expects exactly one hit).
    let response = manager
        .execute_authorized(&transport, device_request())
        .await
        .unwrap();
    assert!(response.is_success());

    let response = manager
        .execute_authorized(&transport, device_request())
        .await
        .unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn login_is_used_when_no_refresh_token_is_held() {
    let (server, transport) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/token/login"))
        .and(body_json(json!({ "login": "admin", "password": "pw" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "A", "refreshToken": "R2" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/device/d-1"))
        .and(header("authorization", "Bearer A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "d-1", "name": "x" })))
        .mount(&server)
        .await;

    let manager = TokenManager::new(Credentials {
        login: Some("admin".into()),
        password: Some("pw".to_string().into()),
        ..Credentials::default()
    });

    let response = manager
        .execute_authorized(&transport, device_request())
        .await
        .unwrap();
    assert!(response.is_success());
}

// ── 401 retry ───────────────────────────────────────────────────────

#[tokio::test]
async fn expired_token_triggers_one_refresh_and_one_retry() {
    let (server, transport) = setup().await;

    // The stale token is rejected once.
    Mock::given(method("GET"))
        .and(path("/api/device/d-1"))
        .and(header("authorization", "Bearer STALE"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthorized" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh"))
        .and(body_json(json!({ "refreshToken": "R" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "FRESH" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/device/d-1"))
        .and(header("authorization", "Bearer FRESH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "d-1", "name": "x" })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(Credentials {
        access_token: Some("STALE".into()),
        refresh_token: Some("R".into()),
        ..Credentials::default()
    });

    // The caller sees a single success; the refresh and replay are
    // invisible.
    let mut response = manager
        .execute_authorized(&transport, device_request())
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.take_payload(Some("device"))["id"], "d-1");
}

#[tokio::test]
async fn original_401_surfaces_when_reauth_fails() {
    let (server, transport) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/device/d-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthorized" })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "boom" })))
        .mount(&server)
        .await;

    let manager = TokenManager::new(Credentials {
        access_token: Some("STALE".into()),
        refresh_token: Some("R".into()),
        ..Credentials::default()
    });

    // Refresh failed and no login credentials exist, so the original
    // 401 envelope comes back unchanged.
    let response = manager
        .execute_authorized(&transport, device_request())
        .await
        .unwrap();
    assert!(!response.is_success());
    assert_eq!(response.code, Some(401));
}

#[tokio::test]
async fn second_401_after_retry_propagates() {
    let (server, transport) = setup().await;

    // Both the original call and the replay are rejected.
    Mock::given(method("GET"))
        .and(path("/api/device/d-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthorized" })))
        .expect(2)
        .mount(&server)
        .await;

    // Refresh "succeeds" but the new token is rejected too; exactly one
    // refresh must happen.
    Mock::given(method("POST"))
        .and(path("/api/token/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "STILL-BAD" })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = TokenManager::new(Credentials {
        access_token: Some("STALE".into()),
        refresh_token: Some("R".into()),
        ..Credentials::default()
    });

    let response = manager
        .execute_authorized(&transport, device_request())
        .await
        .unwrap();
    assert!(!response.is_success());
    assert_eq!(response.code, Some(401));
}

#[tokio::test]
async fn no_credentials_at_all_is_an_auth_error() {
    let (_server, transport) = setup().await;

    let manager = TokenManager::new(Credentials::default());
    let result = manager
        .execute_authorized(&transport, device_request())
        .await;
    assert!(matches!(result, Err(Error::Auth { .. })));
}
