#![allow(clippy::unwrap_used)]
// End-to-end tests: a recording handler driven through connect →
// subscribe → event → unsubscribe → disconnect against wiremock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use devicehive_client::{
    ClientConfig, Command, DeviceFilter, DeviceHandler, DeviceHive, Error, Notification,
};

// ── Recording handler ───────────────────────────────────────────────

#[derive(Clone, Default)]
struct Recorder {
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Command>>>,
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl Recorder {
    fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

impl DeviceHandler for Recorder {
    fn handle_connect(
        &mut self,
        _api: DeviceHive,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        self.connects.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }

    fn handle_command_insert(
        &mut self,
        command: Command,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        self.commands.lock().unwrap().push(command);
        async { Ok(()) }
    }

    fn handle_notification(
        &mut self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        self.notifications.lock().unwrap().push(notification);
        async { Ok(()) }
    }

    fn handle_disconnect(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn wait_until(description: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for: {description}");
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(format!("{}/api/", server.uri())).with_access_token("T")
}

// ── Construction ────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_scheme_is_rejected_at_construction() {
    let result = DeviceHive::connect(
        ClientConfig::new("ftp://host/api/"),
        Recorder::default(),
    )
    .await;
    assert!(matches!(result, Err(Error::Config { .. })));
}

// ── Connect / info / disconnect ─────────────────────────────────────

#[tokio::test]
async fn connect_fires_handle_connect_once_and_info_round_trips() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "4.0.0",
            "serverTimestamp": "2026-08-07T12:00:00.000000",
            "restServerUrl": null,
            "webSocketServerUrl": "ws://host/api/websocket"
        })))
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let client = DeviceHive::connect(config(&server), recorder.clone())
        .await
        .unwrap();
    assert_eq!(client.transport_name(), "http");

    wait_until("handle_connect", || {
        recorder.connects.load(Ordering::SeqCst) == 1
    })
    .await;

    let info = client.get_info().await.unwrap();
    assert_eq!(info.api_version, "4.0.0");
    assert_eq!(info.server_timestamp, "2026-08-07T12:00:00.000000");
    // Exactly one of the two URLs is set.
    assert!(info.rest_server_url.is_none());
    assert_eq!(
        info.web_socket_server_url.as_deref(),
        Some("ws://host/api/websocket")
    );

    client.disconnect().await;
    assert!(!client.is_connected());
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.connects.load(Ordering::SeqCst), 1);

    let result = client.get_info().await;
    assert!(matches!(result, Err(Error::NotConnected)));

    client.join().await.unwrap();
}

// ── Token lifecycle through the facade ──────────────────────────────

#[tokio::test]
async fn connect_refreshes_and_stale_token_retries_once() {
    let server = MockServer::start().await;

    // Authentication on connect acquires A1.
    Mock::given(method("POST"))
        .and(path("/api/token/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "A1" })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    // A1 has expired by the time the call goes out; the client must
    // refresh once more and replay.
    Mock::given(method("GET"))
        .and(path("/api/device/d-1"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthorized" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/token/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "A2" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/device/d-1"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "d-1",
            "name": "lamp",
            "networkId": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let client = DeviceHive::connect(
        ClientConfig::new(format!("{}/api/", server.uri())).with_refresh_token("R"),
        recorder.clone(),
    )
    .await
    .unwrap();

    wait_until("handle_connect", || {
        recorder.connects.load(Ordering::SeqCst) == 1
    })
    .await;

    // The caller sees a single clean success.
    let device = client.get_device("d-1").await.unwrap();
    assert_eq!(device.id, "d-1");
    assert_eq!(device.network_id, Some(5));

    client.disconnect().await;
}

// ── Subscriptions ───────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_receive_unsubscribe() {
    let server = MockServer::start().await;

    // First poll delivers one command, once.
    Mock::given(method("GET"))
        .and(path("/api/device/command/poll"))
        .and(query_param("deviceIds", "d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 117,
            "command": "ping",
            "deviceId": "d1",
            "timestamp": "2026-08-07T10:00:00.000000"
        }])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // Later polls carry the cursor and stay empty.
    Mock::given(method("GET"))
        .and(path("/api/device/command/poll"))
        .and(query_param("timestamp", "2026-08-07T10:00:00.000000"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let client = DeviceHive::connect(config(&server), recorder.clone())
        .await
        .unwrap();

    let subscription_id = client
        .subscribe_insert_commands(&["d1"], None, None, None)
        .await
        .unwrap();
    assert!(!subscription_id.is_empty());

    // Exactly one callback, with the posted id and device.
    wait_until("command insert callback", || recorder.command_count() == 1).await;
    {
        let commands = recorder.commands.lock().unwrap();
        assert_eq!(commands[0].id, Some(117));
        assert_eq!(commands[0].command, "ping");
        assert_eq!(commands[0].device_id.as_deref(), Some("d1"));
    }

    // A second subscription over the same device set is refused.
    let duplicate = client
        .subscribe_insert_commands(&["d1"], None, None, None)
        .await;
    assert!(matches!(duplicate, Err(Error::Subscription { .. })));

    client.unsubscribe_insert_commands(&["d1"]).await.unwrap();

    // No further callbacks after unsubscribing.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(recorder.command_count(), 1);

    // Unsubscribing a device set that has no subscription is an error.
    let result = client.unsubscribe_insert_commands(&["d1"]).await;
    assert!(matches!(result, Err(Error::Subscription { .. })));

    client.disconnect().await;
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disconnect_during_subscriptions_is_clean() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/device/notification/poll"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/device/command/poll"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let client = DeviceHive::connect(config(&server), recorder.clone())
        .await
        .unwrap();

    client
        .subscribe_notifications(&["d1", "d2"], None, None, None)
        .await
        .unwrap();
    client
        .subscribe_insert_commands(&["d1", "d2"], None, None, None)
        .await
        .unwrap();

    client.disconnect().await;

    // Both poll workers are gone, the dispatcher has exited, and no
    // background error is held.
    client.join_timeout(Duration::from_secs(5)).await.unwrap();
    assert!(!client.is_connected());
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);

    // Subscription state is cleared with the connection.
    let result = client.subscribe_notifications(&["d1"], None, None, None).await;
    assert!(matches!(result, Err(Error::NotConnected)));
}

// ── Typed operations ────────────────────────────────────────────────

#[tokio::test]
async fn device_listing_passes_filters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/device"))
        .and(query_param("namePattern", "sensor-%"))
        .and(query_param("take", "2"))
        .and(header("authorization", "Bearer T"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "s-1", "name": "sensor-1", "networkId": 1 },
            { "id": "s-2", "name": "sensor-2", "networkId": 1 }
        ])))
        .mount(&server)
        .await;

    let client = DeviceHive::connect(config(&server), Recorder::default())
        .await
        .unwrap();

    let filter = DeviceFilter {
        name_pattern: Some("sensor-%".into()),
        take: Some(2),
        ..DeviceFilter::default()
    };
    let devices = client.list_devices(&filter).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id, "s-1");
    assert_eq!(devices[1].name, "sensor-2");

    client.disconnect().await;
}

#[tokio::test]
async fn removed_device_surfaces_the_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/device/gone"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({ "error": 404, "message": "Device not found" })),
        )
        .mount(&server)
        .await;

    let client = DeviceHive::connect(config(&server), Recorder::default())
        .await
        .unwrap();

    let err = client.get_device("gone").await.unwrap_err();
    assert!(err.is_not_found());
    match err {
        Error::Api { code, message, .. } => {
            assert_eq!(code, 404);
            assert_eq!(message, "Device not found");
        }
        other => panic!("expected 404 Api error, got: {other:?}"),
    }

    client.disconnect().await;
}
