//! Test: `/health` and `/control` on a bound listener

use std::sync::Arc;

use mcplex_core::ConnectionState;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::async_helpers::wait_for_state;
use tests::{harness, DuplexConnector, ECHO_COMMAND};

async fn post_control(client: &reqwest::Client, base: &str, body: Value) -> Value {
    client
        .post(format!("{}/control", base))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_and_control_over_http() {
    let handle = harness::start(Arc::new(DuplexConnector::new())).await;
    let base = handle.base_url();
    let http = reqwest::Client::new();

    let health: Value = http
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok", "ready": 0, "session": false}));

    let added = post_control(
        &http,
        &base,
        json!({"verb": "add", "data": {"uniqueName": "echo", "command": ECHO_COMMAND}}),
    )
    .await;
    assert_eq!(added["success"], true);
    wait_for_state(&handle.services().manager, "echo", ConnectionState::Ready).await;

    let status = post_control(&http, &base, json!({"verb": "status"})).await;
    assert_eq!(status["data"]["ready"], 1);
    assert_eq!(status["data"]["connections"][0]["uniqueName"], "echo");
    assert_eq!(status["data"]["connections"][0]["state"], "ready");

    let listed = post_control(&http, &base, json!({"verb": "list"})).await;
    assert_eq!(listed["data"][0]["uniqueName"], "echo");

    let deleted = post_control(&http, &base, json!({"verb": "delete", "data": "echo"})).await;
    assert_eq!(deleted["success"], true);

    let status = post_control(&http, &base, json!({"verb": "status"})).await;
    assert_eq!(status["data"]["total"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_add_reports_code() {
    let handle = harness::start(Arc::new(DuplexConnector::new())).await;
    let http = reqwest::Client::new();

    let response = post_control(
        &http,
        &handle.base_url(),
        json!({"verb": "add", "data": {"uniqueName": "bad name!", "command": ECHO_COMMAND}}),
    )
    .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "invalid_definition");
    assert!(response["error"].is_string());
}
