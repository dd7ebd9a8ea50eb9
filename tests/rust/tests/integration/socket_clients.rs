//! Raw socket clients: newline-delimited JSON-RPC and preemption

use std::sync::Arc;

use mcplex_core::{ConnectionState, ControlRequest, ControlVerb, TransportKind};
use mcplex_gateway::{GatewayConfig, GatewayHandle};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tests::async_helpers::{eventually, wait_for_state, with_timeout, DEFAULT_TIMEOUT};
use tests::{harness, DuplexConnector, ECHO_COMMAND};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Minimal JSON-RPC peer over one TCP connection
struct LineClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl LineClient {
    async fn connect(handle: &GatewayHandle) -> Self {
        let addr = handle.socket_addr.expect("socket listener enabled");
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            next_id: 1,
        }
    }

    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next line, or `None` at EOF
    async fn read_message(&mut self) -> Option<Value> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await.unwrap_or(0);
        (read > 0).then(|| serde_json::from_str(line.trim()).unwrap())
    }

    /// Send a request and wait for its response, skipping notifications
    async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;

        with_timeout(DEFAULT_TIMEOUT, async {
            loop {
                let message = self.read_message().await.expect("connection closed");
                if message["id"] == json!(id) {
                    return message;
                }
            }
        })
        .await
    }

    async fn initialize(&mut self) -> Value {
        let response = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": {"name": "line-client", "version": "1.0.0"}
                }),
            )
            .await;
        self.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        response
    }

    /// Read until EOF; returns every message seen on the way
    async fn drain(&mut self) -> Vec<Value> {
        with_timeout(DEFAULT_TIMEOUT, async {
            let mut seen = Vec::new();
            while let Some(message) = self.read_message().await {
                seen.push(message);
            }
            seen
        })
        .await
    }
}

async fn start() -> (Arc<DuplexConnector>, GatewayHandle) {
    let connector = Arc::new(DuplexConnector::new());
    let config = GatewayConfig {
        socket_port: Some(0),
        ..harness::http_only()
    };
    let handle = harness::start_with(connector.clone(), config).await;
    (connector, handle)
}

async fn add_echo(handle: &GatewayHandle) {
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
}

#[tokio::test(flavor = "multi_thread")]
async fn test_socket_client_sees_namespaced_catalog() {
    let (_connector, handle) = start().await;
    add_echo(&handle).await;

    let mut client = LineClient::connect(&handle).await;
    let init = client.initialize().await;
    assert_eq!(init["result"]["serverInfo"]["name"], "mcplex-gateway");

    let tools = client.request("tools/list", json!({})).await;
    let mut names: Vec<String> = tools["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["echo__echo", "echo__fail", "echo__ping", "echo__slow"]);

    let result = client
        .request("tools/call", json!({"name": "echo__ping", "arguments": {}}))
        .await;
    assert_eq!(result["result"]["content"][0]["text"], "pong");

    let error = client
        .request("tools/call", json!({"name": "echo__fail", "arguments": {}}))
        .await;
    assert_eq!(error["error"]["message"], "boom");

    let unknown = client
        .request("tools/call", json!({"name": "nobody__ping", "arguments": {}}))
        .await;
    assert!(unknown["error"].is_object());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_control_verbs_over_custom_methods() {
    let (_connector, handle) = start().await;

    let mut client = LineClient::connect(&handle).await;
    client.initialize().await;

    let added = client
        .request(
            "mcplex/add",
            json!({"uniqueName": "echo", "command": ECHO_COMMAND}),
        )
        .await;
    assert_eq!(added["result"]["success"], true);

    let services = handle.services();
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    let status = client.request("mcplex/status", json!({})).await;
    assert_eq!(status["result"]["data"]["ready"], 1);

    let duplicate = client
        .request(
            "mcplex/add",
            json!({"uniqueName": "echo", "command": ECHO_COMMAND}),
        )
        .await;
    assert_eq!(duplicate["result"]["success"], false);
    assert_eq!(duplicate["result"]["code"], "duplicate_name");

    let unknown = client.request("mcplex/restart", json!({})).await;
    assert_eq!(unknown["error"]["code"], -32601);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_new_socket_client_preempts_previous() {
    let (_connector, handle) = start().await;
    let services = handle.services().clone();
    let mut rx = services.event_bus.subscribe();

    let mut first = LineClient::connect(&handle).await;
    first.initialize().await;
    eventually(|| services.gateway.current_session().is_some()).await;
    let first_session = services.gateway.current_session().unwrap().session_id;

    let mut second = LineClient::connect(&handle).await;
    second.initialize().await;
    eventually(|| {
        services
            .gateway
            .current_session()
            .is_some_and(|s| s.session_id != first_session)
    })
    .await;

    // The preempted connection is closed by the gateway
    first.drain().await;

    let session = services.gateway.current_session().unwrap();
    assert_eq!(session.transport_kind, TransportKind::Socket);

    let replaced = tests::events::wait_for_event(&mut rx, DEFAULT_TIMEOUT, |e| {
        matches!(e, mcplex_core::DomainEvent::ClientReplaced { .. })
    })
    .await;
    assert!(replaced.is_some());

    // The newcomer keeps working
    let tools = second.request("tools/list", json!({})).await;
    assert!(tools["result"]["tools"].is_array());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_releases_session() {
    let (_connector, handle) = start().await;
    let services = handle.services().clone();

    let mut client = LineClient::connect(&handle).await;
    client.initialize().await;
    eventually(|| services.gateway.current_session().is_some()).await;

    drop(client);
    eventually(|| services.gateway.current_session().is_none()).await;

    let health = services.control.status();
    assert!(health.data.unwrap().get("session").is_none());
}
