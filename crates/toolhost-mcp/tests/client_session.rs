//! Client session against an in-process server over an in-memory pipe.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;
use tokio_test::assert_ok;

use toolhost::{CapabilityKind, ErrorKind, InvocationResult};
use toolhost_mcp::client::ClientSession;
use toolhost_mcp::config::TransportConfig;
use toolhost_mcp::protocol::SessionState;
use toolhost_mcp::types::McpError;

use common::*;

async fn connected(gate: Arc<Notify>) -> (Arc<toolhost_mcp::Session>, ClientSession) {
    let (server, transport, _task) = spawn_server(test_dispatcher(gate));
    let client = ClientSession::connect(transport, Duration::from_secs(5))
        .await
        .unwrap();
    (server, client)
}

#[tokio::test]
async fn test_invoke_before_handshake_is_local_failure() {
    let (server, transport, _task) = spawn_server(test_dispatcher(Arc::new(Notify::new())));
    let client = ClientSession::attach(transport);
    assert_eq!(client.state().await, SessionState::Uninitialized);

    let result = client
        .invoke(CapabilityKind::Tool, "echo", Some(json!({ "text": "hi" })))
        .await
        .unwrap();
    assert_eq!(result.error_kind(), Some(ErrorKind::NotNegotiated));
    assert_eq!(server.in_flight().await, 0);

    client.initialize(Duration::from_secs(5)).await.unwrap();
    assert_eq!(client.state().await, SessionState::Negotiated);
    let result = client
        .invoke(CapabilityKind::Tool, "echo", Some(json!({ "text": "hi" })))
        .await
        .unwrap();
    assert_eq!(result, InvocationResult::success(json!({ "text": "hi" })));
}

#[tokio::test]
async fn test_catalog_and_listing_agree() {
    let (_server, client) = connected(Arc::new(Notify::new())).await;

    let catalog = client.catalog().expect("catalog after handshake").clone();
    for kind in CapabilityKind::ALL {
        let listed = client.list_capabilities(kind).await.unwrap();
        assert_eq!(listed, catalog.descriptors(kind).unwrap(), "{kind}");
    }

    let first = client.list_capabilities(CapabilityKind::Tool).await.unwrap();
    let second = client.list_capabilities(CapabilityKind::Tool).await.unwrap();
    assert_eq!(first, second);
    assert!(first.iter().any(|d| d.name == "echo" && d.param("text").is_some()));
}

#[tokio::test]
async fn test_invoke_each_kind() {
    let (_server, client) = connected(Arc::new(Notify::new())).await;

    let tool = client
        .invoke(CapabilityKind::Tool, "echo", Some(json!({ "text": "hello" })))
        .await
        .unwrap();
    assert_eq!(tool.payload(), Some(&json!({ "text": "hello" })));

    let resource = client
        .invoke(CapabilityKind::Resource, "echo://abc", None)
        .await
        .unwrap();
    assert_eq!(resource.payload().unwrap()["contents"][0]["text"], "abc");

    let prompt = client
        .invoke(
            CapabilityKind::Prompt,
            "weather_analysis",
            Some(json!({ "location": "Lima", "context": "clothing" })),
        )
        .await
        .unwrap();
    let text = prompt.payload().unwrap()["messages"][0]["content"]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(text.contains("clothing"));
}

#[tokio::test]
async fn test_failures_come_back_classified() {
    let (_server, client) = connected(Arc::new(Notify::new())).await;

    let unknown = client
        .invoke(CapabilityKind::Tool, "missing", None)
        .await
        .unwrap();
    assert_eq!(unknown.error_kind(), Some(ErrorKind::UnknownCapability));

    let invalid = client
        .invoke(CapabilityKind::Tool, "sleep", Some(json!({ "ms": "soon" })))
        .await
        .unwrap();
    assert_eq!(invalid.error_kind(), Some(ErrorKind::InvalidArguments));

    let failed = client.invoke(CapabilityKind::Tool, "fail", None).await.unwrap();
    assert_eq!(failed.error_kind(), Some(ErrorKind::HandlerError));

    let echoed = client
        .invoke(CapabilityKind::Tool, "echo", Some(json!({ "text": "ok" })))
        .await
        .unwrap();
    assert!(echoed.is_success());
}

#[tokio::test]
async fn test_concurrent_invocations_do_not_block_each_other() {
    let gate = Arc::new(Notify::new());
    let (_server, client) = connected(gate.clone()).await;
    let client = Arc::new(client);

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.invoke(CapabilityKind::Tool, "gated", None).await })
    };

    let fast = client
        .invoke(CapabilityKind::Tool, "echo", Some(json!({ "text": "first" })))
        .await
        .unwrap();
    assert_eq!(fast.payload(), Some(&json!({ "text": "first" })));
    assert!(!slow.is_finished());

    gate.notify_one();
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.payload(), Some(&json!({ "released": true })));
}

#[tokio::test]
async fn test_deadline_yields_timeout_and_cancels_remote() {
    let (server, client) = connected(Arc::new(Notify::new())).await;

    let result = client
        .invoke_with_deadline(
            CapabilityKind::Tool,
            "gated",
            None,
            Duration::from_millis(50),
        )
        .await
        .unwrap();
    assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));

    // The best-effort cancellation reaches the server.
    assert!(eventually(|| async { server.in_flight().await == 0 }).await);

    // Nothing from a timed-out request leaks into later ones.
    let late = client
        .invoke_with_deadline(
            CapabilityKind::Tool,
            "sleep",
            Some(json!({ "ms": 200 })),
            Duration::from_millis(20),
        )
        .await
        .unwrap();
    assert_eq!(late.error_kind(), Some(ErrorKind::Timeout));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let next = client
        .invoke(CapabilityKind::Tool, "echo", Some(json!({ "text": "next" })))
        .await
        .unwrap();
    assert_eq!(next.payload(), Some(&json!({ "text": "next" })));
}

#[tokio::test]
async fn test_client_close_resolves_pending_with_session_closed() {
    let (_server, client) = connected(Arc::new(Notify::new())).await;
    let client = Arc::new(client);

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.invoke(CapabilityKind::Tool, "gated", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_ok!(client.close().await);
    let result = pending.await.unwrap().unwrap();
    assert_eq!(result.error_kind(), Some(ErrorKind::SessionClosed));
    assert_eq!(client.state().await, SessionState::Closed);

    let after = client
        .invoke(CapabilityKind::Tool, "echo", Some(json!({ "text": "x" })))
        .await
        .unwrap();
    assert_eq!(after.error_kind(), Some(ErrorKind::SessionClosed));
}

#[tokio::test]
async fn test_server_shutdown_resolves_pending_with_session_closed() {
    let (server, client) = connected(Arc::new(Notify::new())).await;
    let client = Arc::new(client);

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.invoke(CapabilityKind::Tool, "gated", None).await })
    };
    assert!(eventually(|| async { server.in_flight().await == 1 }).await);

    let ack = client
        .request("shutdown", None, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(ack, json!({}));

    let result = pending.await.unwrap().unwrap();
    assert_eq!(result.error_kind(), Some(ErrorKind::SessionClosed));

    // The reader notices the hang-up.
    assert!(eventually(|| async { client.state().await == SessionState::Closed }).await);
}

#[tokio::test]
async fn test_open_reports_launch_failure_as_transport_error() {
    let config = TransportConfig::parse("stdio:/definitely/not/a/real/binary --flag").unwrap();
    let err = match ClientSession::open(&config, Duration::from_secs(2)).await {
        Ok(_) => panic!("launching a missing binary should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, McpError::Transport(_)), "{err}");
    assert!(err.to_string().contains("failed to launch"));
}
