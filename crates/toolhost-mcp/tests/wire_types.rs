//! JSON-RPC wire types, error mapping, and target parsing.

use serde_json::{json, Value};

use toolhost::{CapabilityKind, ErrorKind, Failure};
use toolhost_mcp::config::TransportConfig;
use toolhost_mcp::transport::framing;
use toolhost_mcp::types::*;

#[test]
fn test_message_kinds_are_distinguished() {
    let request: JsonRpcMessage =
        serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" })).unwrap();
    assert!(matches!(request, JsonRpcMessage::Request(_)));

    let notification: JsonRpcMessage = serde_json::from_value(
        json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
    )
    .unwrap();
    assert!(matches!(notification, JsonRpcMessage::Notification(_)));
    assert_eq!(notification.id(), None);

    let response: JsonRpcMessage =
        serde_json::from_value(json!({ "jsonrpc": "2.0", "id": "abc", "result": {} })).unwrap();
    assert_eq!(response.id(), Some(&RequestId::String("abc".into())));

    let error: JsonRpcMessage = serde_json::from_value(json!({
        "jsonrpc": "2.0", "id": null,
        "error": { "code": -32700, "message": "Parse error" }
    }))
    .unwrap();
    assert!(matches!(error, JsonRpcMessage::Error(ref e) if e.id == RequestId::Null));
}

#[test]
fn test_generated_ids_are_unique_strings() {
    let a = RequestId::generate();
    let b = RequestId::generate();
    assert_ne!(a, b);
    assert!(matches!(a, RequestId::String(_)));
}

#[test]
fn test_error_codes_and_kinds() {
    let cases = [
        (McpError::UnknownCapability(CapabilityKind::Tool, "x".into()), -32803),
        (McpError::UnknownCapability(CapabilityKind::Resource, "x".into()), -32802),
        (McpError::UnknownCapability(CapabilityKind::Prompt, "x".into()), -32804),
        (McpError::InvalidArguments("x".into()), -32602),
        (McpError::HandlerError("x".into()), -32850),
        (McpError::NotNegotiated("x".into()), -32002),
        (McpError::SessionClosed, -32851),
        (McpError::Timeout("x".into()), -32852),
    ];
    for (err, code) in cases {
        assert_eq!(err.code(), code, "{err}");
        let wire = err.to_json_rpc_error(RequestId::Number(1));
        let kind = wire.error.data.as_ref().unwrap()["errorKind"].clone();
        assert_eq!(kind, Value::String(err.error_kind().unwrap().as_str().into()));
    }

    let plain = McpError::MethodNotFound("nope".into()).to_json_rpc_error(RequestId::Null);
    assert_eq!(plain.error.code, error_codes::METHOD_NOT_FOUND);
    assert!(plain.error.data.is_none());
}

#[test]
fn test_wire_error_decodes_to_failure() {
    let wire = McpError::from_failure(
        CapabilityKind::Resource,
        Failure::new(ErrorKind::UnknownCapability, "No resource matches URI: a://b"),
    )
    .to_json_rpc_error(RequestId::Number(3));

    let failure = wire.error.to_failure();
    assert_eq!(failure.error_kind, ErrorKind::UnknownCapability);
    assert_eq!(failure.message, "No resource matches URI: a://b");

    let back: McpError = wire.error.into();
    assert!(matches!(back, McpError::UnknownCapability(CapabilityKind::Resource, _)));
}

#[test]
fn test_untagged_wire_errors_fall_back_on_code() {
    let object = JsonRpcErrorObject {
        code: mcp_error_codes::TIMEOUT,
        message: "slow".into(),
        data: None,
    };
    assert_eq!(object.to_failure().error_kind, ErrorKind::Timeout);

    let internal: McpError = JsonRpcErrorObject {
        code: error_codes::INTERNAL_ERROR,
        message: "oops".into(),
        data: None,
    }
    .into();
    assert!(matches!(internal, McpError::InternalError(_)));
    assert_eq!(internal.into_failure().error_kind, ErrorKind::HandlerError);
}

#[test]
fn test_transport_errors_are_not_failures() {
    assert!(McpError::Transport("gone".into()).is_transport());
    assert!(McpError::Transport("gone".into()).error_kind().is_none());
    assert!(!McpError::SessionClosed.is_transport());
}

#[test]
fn test_cancelled_notification_carries_request_id() {
    let notification = CancelledParams::notification(&RequestId::Number(42), "deadline exceeded");
    assert_eq!(notification.method, NOTIFICATION_CANCELLED);

    let params: CancelledParams = serde_json::from_value(notification.params.unwrap()).unwrap();
    assert_eq!(params.request_id(), Some(RequestId::Number(42)));
    assert_eq!(params.reason.as_deref(), Some("deadline exceeded"));
}

#[test]
fn test_tool_result_wraps_payloads() {
    let text = ToolCallResult::from_payload(json!("plain"));
    assert_eq!(text.content[0].as_text(), Some("plain"));
    assert!(text.structured_content.is_none());

    let structured = ToolCallResult::from_payload(json!({ "n": 1 }));
    assert_eq!(structured.structured_content, Some(json!({ "n": 1 })));
    let wire = serde_json::to_value(&structured).unwrap();
    assert_eq!(wire["structuredContent"], json!({ "n": 1 }));
    assert_eq!(wire["content"][0]["type"], "text");
}

#[test]
fn test_batch_framing() {
    let batch = br#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","method":"notifications/initialized"}]"#;
    let messages = framing::parse_batch(batch).unwrap();
    assert_eq!(messages.len(), 2);

    assert!(matches!(framing::parse_batch(b"[]"), Err(McpError::InvalidRequest(_))));
    assert!(matches!(framing::parse_batch(b"{oops"), Err(McpError::ParseError(_))));

    let framed = framing::frame_message(&messages[0]).unwrap();
    assert!(framed.ends_with('\n'));
    assert_eq!(framed.matches('\n').count(), 1);
}

#[test]
fn test_line_framing_handles_raw_bytes() {
    let crlf = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\r\n";
    assert!(matches!(framing::parse_line(crlf), Ok(JsonRpcMessage::Request(_))));

    let not_utf8 = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\",\"x\":\"\xff\xfe\"}\n";
    assert!(matches!(framing::parse_line(not_utf8), Err(McpError::ParseError(_))));
}

#[test]
fn test_transport_targets_parse() {
    match TransportConfig::parse("stdio:toolhost serve --log-level debug").unwrap() {
        TransportConfig::Pipe { command, args, env } => {
            assert_eq!(command, "toolhost");
            assert_eq!(args, vec!["serve", "--log-level", "debug"]);
            assert!(env.is_empty());
        }
        other => panic!("unexpected {other:?}"),
    }

    assert_eq!(
        TransportConfig::parse("http://localhost:8000/mcp").unwrap(),
        TransportConfig::StreamableHttp {
            url: "http://localhost:8000/mcp".into()
        }
    );
    let sse = TransportConfig::parse("sse+https://example.com/sse").unwrap();
    assert_eq!(sse.to_string(), "sse+https://example.com/sse");

    assert!(TransportConfig::parse("stdio:").is_err());
    assert!(TransportConfig::parse("ftp://example.com").is_err());
    assert!(TransportConfig::parse("sse+ftp://example.com").is_err());
}

#[test]
fn test_explicit_session_ttl_wins() {
    assert_eq!(
        toolhost_mcp::resolve_session_ttl(Some(5)),
        std::time::Duration::from_secs(5)
    );
}
