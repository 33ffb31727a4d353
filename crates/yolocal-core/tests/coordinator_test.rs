#![allow(clippy::unwrap_used)]
// End-to-end coordinator tests against a wiremock hub.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use yolocal_core::{
    ConnectionState, Coordinator, CoordinatorConfig, CoreError, DeviceCommand, DeviceId,
    HubCredentials, SubscriptionState, SyncStatus,
};

const TOKEN_PATH: &str = "/open/yolink/token";
const API_PATH: &str = "/open/yolink/v2/api";

// ── Helpers ─────────────────────────────────────────────────────────

fn config_for(server: &MockServer) -> CoordinatorConfig {
    let mut credentials = HubCredentials::new(
        server.uri(),
        "client-1",
        SecretString::from("s3cret".to_string()),
        "net-1",
    );
    credentials.http_port = server.address().port();

    let mut config = CoordinatorConfig::new(credentials);
    config.events_enabled = false;
    config.refresh_interval_secs = 0;
    config
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "t1", "expires_in": 7200 })),
        )
        .mount(server)
        .await;
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": "000000",
        "time": 1_700_000_000_000_i64,
        "desc": "Success",
        "data": data
    }))
}

fn device(id: &str, device_type: &str) -> serde_json::Value {
    json!({ "deviceId": id, "name": id, "token": format!("{id}-token"), "type": device_type })
}

async fn mount_devices(server: &MockServer, devices: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "method": "Home.getDeviceList" })))
        .respond_with(ok(json!({ "devices": devices })))
        .mount(server)
        .await;
}

async fn mount_state(server: &MockServer, device_type: &str, state: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "method": format!("{device_type}.getState") })))
        .respond_with(ok(json!({ "online": true, "state": state })))
        .mount(server)
        .await;
}

/// A hub with one door sensor, one lock, and the hub itself.
async fn standard_hub() -> MockServer {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_devices(
        &server,
        json!([
            device("door-1", "DoorSensor"),
            device("lock-1", "Lock"),
            device("hub-1", "Hub")
        ]),
    )
    .await;
    mount_state(&server, "DoorSensor", json!({ "state": "closed", "battery": 4 })).await;
    mount_state(&server, "Lock", json!({ "state": "unlocked", "battery": 3 })).await;
    server
}

// ── Startup ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_syncs_every_supported_device() {
    let server = standard_hub().await;
    let coordinator = Coordinator::new(config_for(&server));

    coordinator.connect().await.unwrap();

    assert_eq!(*coordinator.connection_state().borrow(), ConnectionState::Connected);
    assert_eq!(coordinator.all_devices().len(), 3);
    assert_eq!(coordinator.devices().len(), 2);

    let door = coordinator.state(&DeviceId::from("door-1")).unwrap();
    assert_eq!(door.status, SyncStatus::Synced);
    assert_eq!(door.get("state").unwrap().as_str(), Some("closed"));
    assert_eq!(door.is_online(), Some(true));
    assert!(coordinator.state(&DeviceId::from("hub-1")).is_none());

    coordinator.disconnect().await;
    assert_eq!(
        *coordinator.connection_state().borrow(),
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn test_connect_fails_when_token_refused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(config_for(&server));
    let err = coordinator.connect().await.unwrap_err();

    assert!(err.is_auth_unavailable(), "got {err:?}");
    assert_eq!(*coordinator.connection_state().borrow(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_failed_fetch_leaves_device_unknown() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_devices(&server, json!([device("door-1", "DoorSensor")])).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "method": "DoorSensor.getState" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "020104",
            "desc": "Device offline"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_state(&server, "DoorSensor", json!({ "state": "open" })).await;

    let coordinator = Coordinator::new(config_for(&server));
    coordinator.connect().await.unwrap();

    let id = DeviceId::from("door-1");
    assert_eq!(coordinator.state(&id).unwrap().status, SyncStatus::Unknown);

    let synced = coordinator.refresh_stale().await.unwrap();
    assert_eq!(synced, 1);
    let state = coordinator.state(&id).unwrap();
    assert_eq!(state.status, SyncStatus::Synced);
    assert_eq!(state.get("state").unwrap().as_str(), Some("open"));
    assert_eq!(coordinator.diagnostics().await.fetch_failures, 1);
}

#[tokio::test]
async fn test_subscriber_starts_after_initial_sync() {
    let server = standard_hub().await;

    // Nothing listens here, so the subscriber keeps retrying.
    let closed_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut config = config_for(&server);
    config.events_enabled = true;
    config.credentials.mqtt_port = closed_port;

    let coordinator = Coordinator::new(config);
    let mut subscription = coordinator.watch_subscription();
    coordinator.connect().await.unwrap();

    // Every supported device has its baseline by the time events can flow.
    for descriptor in coordinator.devices() {
        let state = coordinator.state(&descriptor.id).unwrap();
        assert_eq!(state.status, SyncStatus::Synced);
    }

    tokio::time::timeout(
        Duration::from_secs(10),
        subscription.wait_for(|s| *s == SubscriptionState::Degraded),
    )
    .await
    .unwrap()
    .unwrap();

    coordinator.disconnect().await;
    assert_eq!(
        coordinator.subscription_state(),
        SubscriptionState::Disconnected
    );
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_command_does_not_touch_cached_state() {
    let server = standard_hub().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({
            "method": "Lock.setState",
            "targetDevice": "lock-1",
            "token": "lock-1-token",
            "params": { "state": "locked" }
        })))
        .respond_with(ok(json!({ "state": "locked" })))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(config_for(&server));
    coordinator.connect().await.unwrap();

    let id = DeviceId::from("lock-1");
    let result = coordinator
        .send_command(&id, DeviceCommand::Lock)
        .await
        .unwrap();
    assert_eq!(result.method, "Lock.setState");
    assert_eq!(result.data["state"], "locked");

    let state = coordinator.state(&id).unwrap();
    assert_eq!(state.get("state").unwrap().as_str(), Some("unlocked"));
}

#[tokio::test]
async fn test_command_rejected_before_reaching_hub() {
    let server = standard_hub().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "method": "DoorSensor.setState" })))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(config_for(&server));
    coordinator.connect().await.unwrap();

    let err = coordinator
        .send_command(&DeviceId::from("door-1"), DeviceCommand::Lock)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unsupported { .. }), "got {err:?}");

    let err = coordinator
        .send_command(&DeviceId::from("missing"), DeviceCommand::Lock)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_command_hub_error_surfaces() {
    let server = standard_hub().await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "method": "Lock.setState" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "000201",
            "desc": "Cannot connect to the device"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(config_for(&server));
    coordinator.connect().await.unwrap();

    let err = coordinator
        .send_command(&DeviceId::from("lock-1"), DeviceCommand::Unlock)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::CommandFailed { .. }), "got {err:?}");
}

// ── Refresh & rediscovery ───────────────────────────────────────────

#[tokio::test]
async fn test_rediscover_prunes_vanished_devices() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "method": "Home.getDeviceList" })))
        .respond_with(ok(json!({
            "devices": [device("door-1", "DoorSensor"), device("lock-1", "Lock")]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_devices(
        &server,
        json!([device("door-1", "DoorSensor"), device("leak-1", "LeakSensor")]),
    )
    .await;
    mount_state(&server, "DoorSensor", json!({ "state": "closed" })).await;
    mount_state(&server, "Lock", json!({ "state": "locked" })).await;
    mount_state(&server, "LeakSensor", json!({ "state": "normal" })).await;

    let coordinator = Coordinator::new(config_for(&server));
    coordinator.connect().await.unwrap();
    assert!(coordinator.state(&DeviceId::from("lock-1")).is_some());

    let diff = coordinator.rediscover().await.unwrap();
    assert_eq!(diff.added, vec![DeviceId::from("leak-1")]);
    assert_eq!(diff.removed, vec![DeviceId::from("lock-1")]);
    assert!(coordinator.state(&DeviceId::from("lock-1")).is_none());

    // Added devices get their baseline during rediscovery itself.
    let leak = coordinator.state(&DeviceId::from("leak-1")).unwrap();
    assert_eq!(leak.status, SyncStatus::Synced);
    assert_eq!(leak.get("state").unwrap().as_str(), Some("normal"));
}

#[tokio::test]
async fn test_rediscover_refetches_retyped_device() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "method": "Home.getDeviceList" })))
        .respond_with(ok(json!({ "devices": [device("dev-1", "DoorSensor")] })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_devices(&server, json!([device("dev-1", "Lock")])).await;
    mount_state(&server, "DoorSensor", json!({ "state": "open" })).await;
    mount_state(&server, "Lock", json!({ "state": "locked" })).await;

    let coordinator = Coordinator::new(config_for(&server));
    coordinator.connect().await.unwrap();
    let id = DeviceId::from("dev-1");
    assert_eq!(
        coordinator.state(&id).unwrap().get("state").unwrap().as_str(),
        Some("open")
    );

    let diff = coordinator.rediscover().await.unwrap();
    assert_eq!(diff.updated, vec![id.clone()]);
    let state = coordinator.state(&id).unwrap();
    assert_eq!(state.status, SyncStatus::Synced);
    assert_eq!(state.get("state").unwrap().as_str(), Some("locked"));
}

#[tokio::test]
async fn test_refresh_without_subscription_refetches_all() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_devices(&server, json!([device("door-1", "DoorSensor")])).await;
    Mock::given(method("POST"))
        .and(path(API_PATH))
        .and(body_partial_json(json!({ "method": "DoorSensor.getState" })))
        .respond_with(ok(json!({ "state": { "state": "closed" } })))
        .expect(2)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(config_for(&server));
    coordinator.connect().await.unwrap();

    assert_eq!(coordinator.subscription_state(), SubscriptionState::Disconnected);
    assert_eq!(coordinator.refresh_stale().await.unwrap(), 1);
    assert_eq!(coordinator.diagnostics().await.refresh_cycles, 1);
}

#[tokio::test]
async fn test_oneshot_runs_and_disconnects() {
    let server = standard_hub().await;

    let names = Coordinator::oneshot(config_for(&server), |coordinator| async move {
        let lock = coordinator.find_device("LOCK-1")?;
        Ok(lock.id.to_string())
    })
    .await
    .unwrap();

    assert_eq!(names, "lock-1");
}
