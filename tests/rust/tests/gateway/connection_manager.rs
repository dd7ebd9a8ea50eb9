//! ConnectionManager lifecycle tests
//!
//! Ready → Degraded → one reconnect → Ready or Closed, plus call forwarding
//! and timeouts, all against in-process backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mcplex_core::{
    CapabilityKind, ConnectionState, DomainEvent, MuxError, PublicName, ServerDefinition,
};
use mcplex_gateway::{BackendRequest, CallError, ServiceContainer};
use pretty_assertions::assert_eq;
use tests::async_helpers::{eventually, wait_for_state, with_timeout, DEFAULT_TIMEOUT};
use tests::events::{collect_events, states_of, wait_for_event};
use tests::{fixtures, harness, DuplexConnector};

fn setup() -> (Arc<DuplexConnector>, ServiceContainer) {
    let connector = Arc::new(DuplexConnector::new());
    let services = harness::services(connector.clone());
    (connector, services)
}

fn call(name: &str) -> BackendRequest {
    BackendRequest::CallTool {
        name: name.to_string(),
        arguments: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handshake_reaches_ready_and_publishes_catalog() {
    let (_connector, services) = setup();
    let mut rx = services.event_bus.subscribe();

    services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    let catalog = services.manager.catalog();
    let counts = catalog.counts();
    assert_eq!(counts.tools, 4);
    assert_eq!(counts.prompts, 1);
    assert_eq!(counts.resources, 1);
    assert!(catalog
        .find(CapabilityKind::Tool, &PublicName::new("echo", "ping"))
        .is_some());

    let events = collect_events(&mut rx, Duration::from_millis(100)).await;
    assert_eq!(
        states_of(&events, "echo"),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Handshaking,
            ConnectionState::Ready
        ]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::CatalogRebuilt { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forward_returns_backend_result() {
    let (_connector, services) = setup();
    let id = services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    let result = services.manager.forward(id, call("ping")).await.unwrap();
    assert_eq!(result["content"][0]["text"], "pong");

    let prompt = services
        .manager
        .forward(
            id,
            BackendRequest::GetPrompt {
                name: "greet".into(),
                arguments: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(prompt["messages"][0]["content"]["text"], "hello from echo");

    let stats = services.manager.get("echo").unwrap().stats();
    assert_eq!(stats.calls_served, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_calls_each_get_their_own_reply() {
    let (_connector, services) = setup();
    let id = services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    let calls = (0..5).map(|i| {
        let mut arguments = serde_json::Map::new();
        arguments.insert("n".into(), serde_json::json!(i));
        services.manager.forward(
            id,
            BackendRequest::CallTool {
                name: "echo".into(),
                arguments: Some(arguments),
            },
        )
    });
    let results = futures::future::join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        let text = result.unwrap()["content"][0]["text"].as_str().unwrap().to_string();
        assert_eq!(text, format!("{{\"n\":{}}}", i));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_backend_error_passes_through() {
    let (_connector, services) = setup();
    let id = services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    match services.manager.forward(id, call("fail")).await {
        Err(CallError::Backend(error)) => assert_eq!(error.message, "boom"),
        other => panic!("expected backend error, got {:?}", other),
    }

    // A JSON-RPC error leaves the connection serving
    assert_eq!(
        services.manager.get("echo").unwrap().state(),
        ConnectionState::Ready
    );
    assert!(services.manager.forward(id, call("ping")).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_call_times_out() {
    let (_connector, services) = setup();
    let id = services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    let result = services.manager.forward(id, call("slow")).await;
    assert_eq!(
        result,
        Err(CallError::Mux(MuxError::CallTimeout("echo".into())))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_connection_id_is_unavailable() {
    let (_connector, services) = setup();
    let result = services
        .manager
        .forward(uuid::Uuid::new_v4(), call("ping"))
        .await;
    assert!(matches!(
        result,
        Err(CallError::Mux(MuxError::BackendUnavailable(_)))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_killed_backend_reconnects_once() {
    let (connector, services) = setup();
    let mut rx = services.event_bus.subscribe();
    services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    connector.kill("echo");

    let degraded = wait_for_event(&mut rx, DEFAULT_TIMEOUT, |e| {
        matches!(
            e,
            DomainEvent::ConnectionStateChanged {
                state: ConnectionState::Degraded,
                ..
            }
        )
    })
    .await;
    assert!(degraded.is_some(), "kill should degrade the connection");

    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;
    assert_eq!(connector.attach_count("echo"), 2);
    assert_eq!(services.manager.catalog().counts().tools, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reconnect_budget_resets_after_ready() {
    let (connector, services) = setup();
    services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    for attempt in 2..=3 {
        connector.kill("echo");
        eventually(|| connector.attach_count("echo") == attempt).await;
        wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_reconnect_closes_connection() {
    let (connector, services) = setup();
    services
        .manager
        .connect(ServerDefinition::new("flaky", "flaky"));
    wait_for_state(&services.manager, "flaky", ConnectionState::Ready).await;
    assert_eq!(services.manager.catalog().counts().tools, 4);

    connector.kill("flaky");
    wait_for_state(&services.manager, "flaky", ConnectionState::Closed).await;

    let snapshot = services.manager.snapshot();
    let error = snapshot[0].last_error.clone().unwrap_or_default();
    assert!(error.contains("refused to restart"), "{}", error);
    assert!(services.manager.catalog().is_empty());
    assert_eq!(connector.attach_count("flaky"), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_backend_hits_handshake_timeout() {
    let (_connector, services) = setup();
    services
        .manager
        .connect(ServerDefinition::new("silent", "silent"));

    wait_for_state(&services.manager, "silent", ConnectionState::Closed).await;
    let error = services.manager.snapshot()[0]
        .last_error
        .clone()
        .unwrap_or_default();
    assert!(error.contains("timed out"), "{}", error);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_launch_failure_is_reported() {
    let (_connector, services) = setup();
    services
        .manager
        .connect(fixtures::broken_definition("broken"));

    wait_for_state(&services.manager, "broken", ConnectionState::Closed).await;
    let error = services.manager.snapshot()[0]
        .last_error
        .clone()
        .unwrap_or_default();
    assert!(error.contains("Command not found"), "{}", error);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_one_failing_backend_does_not_affect_others() {
    let (connector, services) = setup();
    services.manager.connect(fixtures::echo_definition("alpha"));
    services
        .manager
        .connect(ServerDefinition::new("beta", "flaky"));
    wait_for_state(&services.manager, "alpha", ConnectionState::Ready).await;
    wait_for_state(&services.manager, "beta", ConnectionState::Ready).await;
    assert_eq!(services.manager.catalog().counts().tools, 8);

    connector.kill("beta");
    wait_for_state(&services.manager, "beta", ConnectionState::Closed).await;

    let catalog = services.manager.catalog();
    assert_eq!(catalog.counts().tools, 4);
    assert!(catalog.entries().iter().all(|e| e.owner() == "alpha"));
    assert_eq!(
        services.manager.get("alpha").unwrap().state(),
        ConnectionState::Ready
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_backend_list_changed_refreshes_catalog() {
    let (connector, services) = setup();
    services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    connector.backend().add_tool("extra");
    // The backend publishes its peer once initialize completes
    with_timeout(DEFAULT_TIMEOUT, async {
        while !connector.announce_tools_changed("echo").await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let extra = PublicName::new("echo", "extra");
    eventually(|| {
        services
            .manager
            .catalog()
            .find(CapabilityKind::Tool, &extra)
            .is_some()
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_drops_catalog_entries() {
    let (_connector, services) = setup();
    let id = services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    services.manager.disconnect(id).unwrap();
    assert!(services.manager.get("echo").is_none());
    eventually(|| services.manager.catalog().is_empty()).await;
    assert_eq!(services.manager.ready_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disconnect_mid_call_resolves_unavailable() {
    let (_connector, services) = setup();
    let id = services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    let manager = services.manager.clone();
    let in_flight = tokio::spawn(async move { manager.forward(id, call("slow")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    services.manager.disconnect(id).unwrap();
    let result = with_timeout(DEFAULT_TIMEOUT, in_flight).await.unwrap();
    assert_eq!(
        result,
        Err(CallError::Mux(MuxError::BackendUnavailable("echo".into())))
    );
    assert!(services.manager.catalog().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_calls_reach_backend_in_send_order() {
    let (connector, services) = setup();
    let id = services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    let calls = (0..20).map(|seq| {
        let mut arguments = serde_json::Map::new();
        arguments.insert("seq".into(), serde_json::json!(seq));
        services.manager.forward(
            id,
            BackendRequest::CallTool {
                name: "echo".into(),
                arguments: Some(arguments),
            },
        )
    });
    for result in futures::future::join_all(calls).await {
        assert!(result.is_ok());
    }

    let order: Vec<i64> = connector
        .backend()
        .echoed()
        .iter()
        .filter_map(|args| args["seq"].as_i64())
        .collect();
    assert_eq!(order, (0..20).collect::<Vec<i64>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rebuild_racing_disconnect_never_restores_entries() {
    let (_connector, services) = setup();

    for _ in 0..10 {
        let id = services.manager.connect(fixtures::echo_definition("echo"));
        wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

        let stop = Arc::new(AtomicBool::new(false));
        let workers: Vec<_> = (0..6)
            .map(|_| {
                let manager = services.manager.clone();
                let stop = stop.clone();
                tokio::task::spawn_blocking(move || {
                    while !stop.load(Ordering::SeqCst) {
                        manager.rebuild_catalog();
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(5)).await;
        services.manager.disconnect(id).unwrap();
        stop.store(true, Ordering::SeqCst);
        for worker in workers {
            worker.await.unwrap();
        }

        assert!(
            services.manager.catalog().is_empty(),
            "catalog still lists a disconnected backend"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_rediscovery_degrades_connection() {
    let (connector, services) = setup();
    let mut rx = services.event_bus.subscribe();
    services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    connector.backend().stall_listing();
    with_timeout(DEFAULT_TIMEOUT, async {
        while !connector.announce_tools_changed("echo").await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    let degraded = wait_for_event(&mut rx, DEFAULT_TIMEOUT, |e| {
        matches!(
            e,
            DomainEvent::ConnectionStateChanged {
                state: ConnectionState::Degraded,
                message: Some(message),
                ..
            } if message.contains("rediscovery")
        )
    })
    .await;
    assert!(degraded.is_some(), "rediscovery should be bounded");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_during_stalled_rediscovery_fails_queued_calls() {
    let (connector, services) = setup();
    let id = services.manager.connect(fixtures::echo_definition("echo"));
    wait_for_state(&services.manager, "echo", ConnectionState::Ready).await;

    connector.backend().stall_listing();
    with_timeout(DEFAULT_TIMEOUT, async {
        while !connector.announce_tools_changed("echo").await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    eventually(|| connector.backend().stalled_listings() > 0).await;

    let manager = services.manager.clone();
    let queued = tokio::spawn(async move { manager.forward(id, call("ping")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    services.manager.disconnect(id).unwrap();
    let result = with_timeout(DEFAULT_TIMEOUT, queued).await.unwrap();
    assert_eq!(
        result,
        Err(CallError::Mux(MuxError::BackendUnavailable("echo".into())))
    );
}
