//! Control plane scenario: add, route, status, delete

use std::sync::Arc;

use mcplex_core::{
    CapabilityKind, ConnectionState, ControlRequest, ControlVerb, DomainEvent, ErrorCode,
};
use mcplex_gateway::ServiceContainer;
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::async_helpers::{eventually, wait_for_state, DEFAULT_TIMEOUT};
use tests::events::wait_for_event;
use tests::{harness, DuplexConnector, ECHO_COMMAND};

fn add(name: &str, command: &str) -> ControlRequest {
    ControlRequest::new(ControlVerb::Add).with_data(json!({
        "uniqueName": name,
        "command": command,
    }))
}

fn delete(name: &str) -> ControlRequest {
    ControlRequest::new(ControlVerb::Delete).with_data(json!({ "uniqueName": name }))
}

fn services() -> ServiceContainer {
    harness::services(Arc::new(DuplexConnector::new()))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_route_status_delete() {
    let services = services();
    let mut rx = services.event_bus.subscribe();

    let response = services.control.handle(add("echo", ECHO_COMMAND)).await;
    assert!(response.success, "{:?}", response);
    assert_eq!(response.data.as_ref().unwrap()["definition"]["uniqueName"], "echo");

    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    let result = services
        .router
        .route(CapabilityKind::Tool, "echo__ping", None)
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "pong");

    let status = services
        .control
        .handle(ControlRequest::new(ControlVerb::Status))
        .await;
    let data = status.data.unwrap();
    assert_eq!(data["ready"], 1);
    assert_eq!(data["total"], 1);
    assert_eq!(data["connections"][0]["uniqueName"], "echo");
    assert_eq!(data["connections"][0]["state"], "ready");
    assert_eq!(data["connections"][0]["capabilities"]["tools"].as_array().unwrap().len(), 4);

    let response = services.control.handle(delete("echo")).await;
    assert!(response.success, "{:?}", response);
    assert!(services.manager.get("echo").is_none());
    eventually(|| services.router.catalog().is_empty()).await;

    let list = services
        .control
        .handle(ControlRequest::new(ControlVerb::List))
        .await;
    assert_eq!(list.data.unwrap(), json!([]));

    let deleted = wait_for_event(&mut rx, DEFAULT_TIMEOUT, |e| {
        matches!(e, DomainEvent::ServerDeleted { .. })
    })
    .await;
    assert!(deleted.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_is_accepted_before_backend_is_ready() {
    let services = services();

    let response = services.control.handle(add("ghost", "does-not-exist")).await;
    assert!(response.success, "add only registers and dispatches");

    wait_for_state(&services.manager, "ghost", ConnectionState::Closed).await;

    // Closed connections stay visible until deleted
    let status = services
        .control
        .handle(ControlRequest::new(ControlVerb::Status))
        .await;
    let data = status.data.unwrap();
    assert_eq!(data["closed"], 1);
    let error = data["connections"][0]["lastError"].as_str().unwrap();
    assert!(error.contains("Command not found"), "{}", error);

    let response = services.control.handle(delete("ghost")).await;
    assert!(response.success);
    let status = services
        .control
        .handle(ControlRequest::new(ControlVerb::Status))
        .await;
    assert_eq!(status.data.unwrap()["total"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejections_carry_error_codes() {
    let services = services();

    let cases = [
        (add("9lives", ECHO_COMMAND), ErrorCode::InvalidDefinition),
        (add("empty", "  "), ErrorCode::InvalidDefinition),
        (ControlRequest::new(ControlVerb::Add), ErrorCode::InvalidDefinition),
        (delete("nobody"), ErrorCode::NotFound),
    ];
    for (request, code) in cases {
        let response = services.control.handle(request).await;
        assert!(!response.success);
        assert_eq!(response.code, Some(code));
        assert!(response.error.is_some());
    }

    assert!(services.control.handle(add("echo", ECHO_COMMAND)).await.success);
    let duplicate = services.control.handle(add("echo", "other")).await;
    assert_eq!(duplicate.code, Some(ErrorCode::DuplicateName));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_readd_after_delete_reconnects() {
    let connector = Arc::new(DuplexConnector::new());
    let services = harness::services(connector.clone());

    services.control.handle(add("echo", ECHO_COMMAND)).await;
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;
    services.control.handle(delete("echo")).await;

    let response = services.control.handle(add("echo", ECHO_COMMAND)).await;
    assert!(response.success, "{:?}", response);
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;
    assert_eq!(connector.attach_count("echo"), 2);
}
