//! Integration tests for the `yolocal` binary.
//!
//! Argument parsing and error handling run without a hub; the end-to-end
//! cases point a profile at a wiremock server.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `yolocal` binary with env isolation.
fn yolocal_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("yolocal");
    cmd.env("HOME", "/tmp/yolocal-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/yolocal-cli-test-nonexistent")
        .env_remove("RUST_LOG")
        .env_remove("YOLOCAL_PROFILE")
        .env_remove("YOLINK_HOST")
        .env_remove("YOLINK_CLIENT_ID")
        .env_remove("YOLINK_CLIENT_SECRET")
        .env_remove("YOLINK_NET_ID")
        .env_remove("YOLINK_NET");
    cmd
}

/// A command whose `mock` profile points at `server`.
fn mock_cmd(server: &MockServer) -> assert_cmd::Command {
    let mut cmd = yolocal_cmd();
    cmd.env("YOLOCAL_PROFILES__MOCK__HOST", "127.0.0.1")
        .env(
            "YOLOCAL_PROFILES__MOCK__HTTP_PORT",
            server.address().port().to_string(),
        )
        .env("YOLOCAL_PROFILES__MOCK__CLIENT_ID", "client-1")
        .env("YOLOCAL_PROFILES__MOCK__CLIENT_SECRET", "s3cret")
        .env("YOLOCAL_PROFILES__MOCK__NET_ID", "net-1")
        .args(["--profile", "mock"]);
    cmd
}

async fn mock_hub() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open/yolink/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "t1", "expires_in": 7200 })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/open/yolink/v2/api"))
        .and(body_partial_json(json!({ "method": "Home.getDeviceList" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "000000",
            "data": { "devices": [
                { "deviceId": "door-1", "name": "Back Door", "token": "a", "type": "DoorSensor" },
                { "deviceId": "hub-1", "name": "Hub", "token": "b", "type": "Hub" }
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/open/yolink/v2/api"))
        .and(body_partial_json(json!({ "method": "DoorSensor.getState" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "000000",
            "time": 1_700_000_000_000_i64,
            "data": { "online": true, "state": { "state": "closed", "battery": 4 } }
        })))
        .mount(&server)
        .await;
    server
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = yolocal_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    yolocal_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("devices")
            .and(predicate::str::contains("state"))
            .and(predicate::str::contains("command"))
            .and(predicate::str::contains("watch")),
    );
}

#[test]
fn test_version_flag() {
    yolocal_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("yolocal"));
}

#[test]
fn test_completions_zsh() {
    yolocal_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_config_path() {
    yolocal_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_devices_without_profile() {
    yolocal_cmd()
        .arg("devices")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no hub configured"));
}

#[test]
fn test_unknown_action_rejected() {
    let output = yolocal_cmd()
        .args(["command", "lock-1", "explode"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("possible values"));
}

#[test]
fn test_watch_help_lists_wait_and_request_timeout() {
    yolocal_cmd()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--max-wait").and(predicate::str::contains("--timeout")),
        );
}

#[test]
fn test_invalid_profile_field_is_usage_error() {
    yolocal_cmd()
        .env("YOLOCAL_PROFILES__BAD__HOST", "127.0.0.1")
        .env("YOLOCAL_PROFILES__BAD__CLIENT_ID", "id")
        .env("YOLOCAL_PROFILES__BAD__CLIENT_SECRET", "s")
        .env("YOLOCAL_PROFILES__BAD__NET_ID", "net")
        .env("YOLOCAL_PROFILES__BAD__TIMEOUT", "0")
        .args(["--profile", "bad", "devices"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("timeout"));
}

// ── Against a mock hub ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_plain_lists_supported() {
    let server = mock_hub().await;
    let mut cmd = mock_cmd(&server);
    let output = tokio::task::spawn_blocking(move || {
        cmd.args(["--output", "plain", "devices"]).output().unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "door-1\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_devices_all_includes_hub() {
    let server = mock_hub().await;
    let mut cmd = mock_cmd(&server);
    let output = tokio::task::spawn_blocking(move || {
        cmd.args(["-o", "plain", "devices", "--all"]).output().unwrap()
    })
    .await
    .unwrap();

    assert_eq!(String::from_utf8_lossy(&output.stdout), "door-1\nhub-1\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_state_by_name_as_json() {
    let server = mock_hub().await;
    let mut cmd = mock_cmd(&server);
    let output = tokio::task::spawn_blocking(move || {
        cmd.args(["-o", "json-compact", "state", "back door"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", combined_output(&output));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["device"]["id"], "door-1");
    assert_eq!(body["state"]["status"], "synced");
    assert_eq!(body["state"]["attributes"]["state"], "closed");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsupported_command_exit_code() {
    let server = mock_hub().await;
    let mut cmd = mock_cmd(&server);
    let output = tokio::task::spawn_blocking(move || {
        cmd.args(["command", "door-1", "lock"]).output().unwrap()
    })
    .await
    .unwrap();

    assert_eq!(output.status.code(), Some(5), "{}", combined_output(&output));
}
