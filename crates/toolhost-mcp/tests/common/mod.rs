//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use toolhost::{
    handler_fn, Arguments, CapabilityDescriptor, CapabilityRegistry, Dispatcher, ParamType,
};
use toolhost_mcp::capabilities::build_registry;
use toolhost_mcp::session::Session;
use toolhost_mcp::transport::{LineTransport, Transport};
use toolhost_mcp::types::*;

pub const WAIT: Duration = Duration::from_secs(5);

/// The bundled capabilities plus a few test-only tools:
///
/// - `gated`: blocks until `gate` is notified, then returns `{"released": true}`
/// - `sleep(ms)`: sleeps, then returns `{"slept": ms}`
/// - `fail`: always errors
/// - `boom`: always panics
pub fn test_registry(gate: Arc<Notify>) -> CapabilityRegistry {
    let mut registry = build_registry(None).unwrap();

    registry
        .register(
            CapabilityDescriptor::tool("gated").build().unwrap(),
            handler_fn(move |_| {
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    Ok(json!({ "released": true }))
                }
            }),
        )
        .unwrap();

    registry
        .register(
            CapabilityDescriptor::tool("sleep")
                .required("ms", ParamType::Integer)
                .build()
                .unwrap(),
            handler_fn(|args: Arguments| async move {
                let ms = args.i64("ms")?;
                tokio::time::sleep(Duration::from_millis(ms as u64)).await;
                Ok(json!({ "slept": ms }))
            }),
        )
        .unwrap();

    registry
        .register(
            CapabilityDescriptor::tool("fail").build().unwrap(),
            handler_fn(|_| async { Err(anyhow::anyhow!("upstream service unavailable")) }),
        )
        .unwrap();

    registry
        .register(
            CapabilityDescriptor::tool("boom").build().unwrap(),
            handler_fn(|_| async {
                if true {
                    panic!("handler exploded");
                }
                Ok(Value::Null)
            }),
        )
        .unwrap();

    registry
}

pub fn test_dispatcher(gate: Arc<Notify>) -> Dispatcher {
    Dispatcher::new(Arc::new(test_registry(gate)))
}

/// Two connected in-memory line transports.
pub fn pipe_pair() -> (Arc<dyn Transport>, Arc<dyn Transport>) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let (ar, aw) = tokio::io::split(a);
    let (br, bw) = tokio::io::split(b);
    (
        Arc::new(LineTransport::new(ar, aw)),
        Arc::new(LineTransport::new(br, bw)),
    )
}

/// A server session running over one end of a pipe; returns the other end.
pub fn spawn_server(
    dispatcher: Dispatcher,
) -> (Arc<Session>, Arc<dyn Transport>, JoinHandle<McpResult<()>>) {
    let (client_end, server_end) = pipe_pair();
    let session = Session::new(dispatcher);
    let task = tokio::spawn(session.clone().serve(server_end));
    (session, client_end, task)
}

pub fn request(id: i64, method: &str, params: Option<Value>) -> JsonRpcMessage {
    JsonRpcRequest::new(RequestId::Number(id), method, params).into()
}

pub fn init_request(id: i64) -> JsonRpcMessage {
    request(
        id,
        "initialize",
        Some(json!({
            "protocolVersion": MCP_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0" }
        })),
    )
}

pub fn tool_call(id: i64, name: &str, arguments: Value) -> JsonRpcMessage {
    request(
        id,
        "tools/call",
        Some(json!({ "name": name, "arguments": arguments })),
    )
}

/// Next message from `transport`, failing the test after [`WAIT`].
pub async fn recv(transport: &Arc<dyn Transport>) -> JsonRpcMessage {
    tokio::time::timeout(WAIT, transport.receive())
        .await
        .expect("timed out waiting for a message")
        .expect("transport error")
        .expect("transport closed")
}

/// Send `initialize` + `notifications/initialized` and check the reply.
pub async fn handshake(transport: &Arc<dyn Transport>) -> InitializeResult {
    transport.send(init_request(0)).await.unwrap();
    let reply = recv(transport).await;
    let JsonRpcMessage::Response(response) = reply else {
        panic!("handshake failed: {reply:?}");
    };
    transport
        .send(JsonRpcNotification::new(NOTIFICATION_INITIALIZED, None).into())
        .await
        .unwrap();
    serde_json::from_value(response.result).unwrap()
}

pub fn error_of(message: &JsonRpcMessage) -> &JsonRpcErrorObject {
    match message {
        JsonRpcMessage::Error(e) => &e.error,
        other => panic!("expected an error reply, got {other:?}"),
    }
}

pub fn error_kind_of(message: &JsonRpcMessage) -> Option<String> {
    error_of(message)
        .data
        .as_ref()
        .and_then(|d| d.get("errorKind"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Poll `check` until it holds or [`WAIT`] passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
