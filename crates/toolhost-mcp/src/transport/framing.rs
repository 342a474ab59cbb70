//! Message framing for newline-delimited JSON.

use crate::types::{JsonRpcMessage, McpError, McpResult};

/// Parse a single line of text as a JSON-RPC message.
pub fn parse_message(line: &str) -> McpResult<JsonRpcMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    serde_json::from_str(trimmed).map_err(|e| McpError::ParseError(e.to_string()))
}

/// Parse one raw line off a byte stream. Invalid UTF-8 is a parse error
/// like any other malformed line.
pub fn parse_line(line: &[u8]) -> McpResult<JsonRpcMessage> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    serde_json::from_slice(trimmed).map_err(|e| McpError::ParseError(e.to_string()))
}

/// Parse a body that holds either one message or a batch array.
pub fn parse_batch(body: &[u8]) -> McpResult<Vec<JsonRpcMessage>> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| McpError::ParseError(e.to_string()))?;
    match value {
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Err(McpError::InvalidRequest("Empty batch".to_string()));
            }
            items
                .into_iter()
                .map(|item| {
                    serde_json::from_value(item).map_err(|e| McpError::ParseError(e.to_string()))
                })
                .collect()
        }
        single => serde_json::from_value(single)
            .map(|msg| vec![msg])
            .map_err(|e| McpError::ParseError(e.to_string())),
    }
}

/// Serialize a message to a JSON line (with trailing newline).
pub fn frame_message(message: &JsonRpcMessage) -> McpResult<String> {
    let mut json = serde_json::to_string(message).map_err(McpError::Json)?;
    json.push('\n');
    Ok(json)
}
