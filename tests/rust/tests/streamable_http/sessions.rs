//! Test: catalog, routed calls and preemption over `/mcp`

use std::sync::Arc;
use std::time::Duration;

use mcplex_core::{ConnectionState, ControlRequest, ControlVerb, DomainEvent, TransportKind};
use mcplex_gateway::GatewayHandle;
use pretty_assertions::assert_eq;
use rmcp::{
    model::*, service::RunningService, transport::StreamableHttpClientTransport, RoleClient,
    ServiceExt,
};
use serde_json::json;
use tests::async_helpers::{eventually, wait_for_state, with_timeout, DEFAULT_TIMEOUT};
use tests::events::wait_for_event;
use tests::{harness, DuplexConnector, ECHO_COMMAND};

async fn connect(handle: &GatewayHandle, name: &str) -> RunningService<RoleClient, ClientInfo> {
    let transport = StreamableHttpClientTransport::from_uri(handle.mcp_url().as_str());
    ClientInfo {
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
    .serve(transport)
    .await
    .expect("client should connect")
}

async fn start_with_echo() -> GatewayHandle {
    let handle = harness::start(Arc::new(DuplexConnector::new())).await;
    let services = handle.services();
    let response = services
        .control
        .handle(ControlRequest::new(ControlVerb::Add).with_data(json!({
            "uniqueName": "echo",
            "command": ECHO_COMMAND,
        })))
        .await;
    assert!(response.success);
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;
    handle
}

#[tokio::test(flavor = "multi_thread")]
async fn test_catalog_and_calls_over_mcp() {
    let handle = start_with_echo().await;
    let client = connect(&handle, "stream-client").await;

    let tools = client.list_tools(Default::default()).await.unwrap();
    let mut names: Vec<String> = tools.tools.iter().map(|t| t.name.to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["echo__echo", "echo__fail", "echo__ping", "echo__slow"]);

    let params: CallToolRequestParams =
        serde_json::from_value(json!({"name": "echo__ping", "arguments": {}})).unwrap();
    let result = client.call_tool(params).await.unwrap();
    let result = serde_json::to_value(&result).unwrap();
    assert_eq!(result["content"][0]["text"], "pong");

    let prompts = client.list_prompts(Default::default()).await.unwrap();
    assert_eq!(prompts.prompts[0].name, "echo__greet");

    let resources = client.list_resources(Default::default()).await.unwrap();
    assert_eq!(resources.resources.len(), 1);

    client.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_session_replaces_first() {
    let handle = start_with_echo().await;
    let services = handle.services().clone();
    let mut rx = services.event_bus.subscribe();

    let first = connect(&handle, "first").await;
    eventually(|| services.gateway.current_session().is_some()).await;
    let first_session = services.gateway.current_session().unwrap().session_id;

    let second = connect(&handle, "second").await;
    eventually(|| {
        services
            .gateway
            .current_session()
            .is_some_and(|s| s.session_id != first_session)
    })
    .await;
    assert_eq!(
        services.gateway.current_transport_kind(),
        Some(TransportKind::Stream)
    );

    let replaced = wait_for_event(&mut rx, DEFAULT_TIMEOUT, |e| {
        matches!(e, DomainEvent::ClientReplaced { .. })
    })
    .await;
    match replaced {
        Some(DomainEvent::ClientReplaced {
            previous_session_id,
            ..
        }) => assert_eq!(previous_session_id, first_session),
        other => panic!("expected ClientReplaced, got {:?}", other),
    }

    // The replaced session no longer gets answers
    with_timeout(DEFAULT_TIMEOUT, async {
        while first.list_tools(Default::default()).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    let tools = second.list_tools(Default::default()).await.unwrap();
    assert_eq!(tools.tools.len(), 4);

    second.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deleted_session_is_released() {
    let handle = start_with_echo().await;
    let services = handle.services().clone();
    let client = connect(&handle, "short-lived").await;
    client.list_tools(Default::default()).await.unwrap();

    eventually(|| services.gateway.current_session().is_some()).await;
    let session_id = services.gateway.current_session().unwrap().session_id;

    let response = reqwest::Client::new()
        .delete(handle.mcp_url())
        .header("Mcp-Session-Id", session_id.as_str())
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success(), "{}", response.status());

    eventually(|| services.gateway.current_session().is_none()).await;
    let health: serde_json::Value = reqwest::get(format!("{}/health", handle.base_url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["session"], false);

    client.cancel().await.ok();
}
