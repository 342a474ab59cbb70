//! Error types and JSON-RPC error codes for the MCP server and client.

use serde_json::json;
use toolhost::{CapabilityKind, ErrorKind, Failure, HostError};

use super::message::{JsonRpcError, JsonRpcErrorObject, RequestId, JSONRPC_VERSION};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP-specific error codes.
pub mod mcp_error_codes {
    pub const NOT_NEGOTIATED: i32 = -32002;
    pub const REQUEST_CANCELLED: i32 = -32800;
    pub const RESOURCE_NOT_FOUND: i32 = -32802;
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const PROMPT_NOT_FOUND: i32 = -32804;
    pub const HANDLER_ERROR: i32 = -32850;
    pub const SESSION_CLOSED: i32 = -32851;
    pub const TIMEOUT: i32 = -32852;
}

/// All errors that can occur in the MCP server or client.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Request cancelled")]
    RequestCancelled,

    #[error("{0}")]
    UnknownCapability(CapabilityKind, String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    HandlerError(String),

    #[error("Session not negotiated: {0}")]
    NotNegotiated(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::RequestCancelled => REQUEST_CANCELLED,
            McpError::UnknownCapability(kind, _) => match kind {
                CapabilityKind::Tool => TOOL_NOT_FOUND,
                CapabilityKind::Resource => RESOURCE_NOT_FOUND,
                CapabilityKind::Prompt => PROMPT_NOT_FOUND,
            },
            McpError::InvalidArguments(_) => INVALID_PARAMS,
            McpError::HandlerError(_) => HANDLER_ERROR,
            McpError::NotNegotiated(_) => NOT_NEGOTIATED,
            McpError::SessionClosed => SESSION_CLOSED,
            McpError::Timeout(_) => TIMEOUT,
            McpError::Transport(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::Json(_) => PARSE_ERROR,
        }
    }

    /// The in-protocol failure classification, if this error is one.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            McpError::UnknownCapability(..) => Some(ErrorKind::UnknownCapability),
            McpError::InvalidArguments(_) => Some(ErrorKind::InvalidArguments),
            McpError::HandlerError(_) => Some(ErrorKind::HandlerError),
            McpError::NotNegotiated(_) => Some(ErrorKind::NotNegotiated),
            McpError::SessionClosed => Some(ErrorKind::SessionClosed),
            McpError::Timeout(_) => Some(ErrorKind::Timeout),
            _ => None,
        }
    }

    /// Lift a dispatcher failure for a capability of `kind` into a wire error.
    pub fn from_failure(kind: CapabilityKind, failure: Failure) -> Self {
        let Failure {
            error_kind,
            message,
        } = failure;
        match error_kind {
            ErrorKind::UnknownCapability => McpError::UnknownCapability(kind, message),
            ErrorKind::InvalidArguments => McpError::InvalidArguments(message),
            ErrorKind::HandlerError => McpError::HandlerError(message),
            ErrorKind::NotNegotiated => McpError::NotNegotiated(message),
            ErrorKind::SessionClosed => McpError::SessionClosed,
            ErrorKind::Timeout => McpError::Timeout(message),
        }
    }

    /// Fold into a [`Failure`]; non-protocol errors count as handler errors.
    pub fn into_failure(self) -> Failure {
        let kind = self.error_kind().unwrap_or(ErrorKind::HandlerError);
        let message = match self {
            McpError::UnknownCapability(_, m)
            | McpError::InvalidArguments(m)
            | McpError::HandlerError(m) => m,
            other => other.to_string(),
        };
        Failure::new(kind, message)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, McpError::Transport(_) | McpError::Io(_))
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data: self
                    .error_kind()
                    .map(|kind| json!({ "errorKind": kind.as_str() })),
            },
        }
    }
}

impl From<HostError> for McpError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::NotFound { kind, .. } => McpError::UnknownCapability(kind, e.to_string()),
            other => McpError::InternalError(other.to_string()),
        }
    }
}

impl JsonRpcErrorObject {
    /// Decode a received error object back into a [`Failure`].
    ///
    /// `data.errorKind` wins; otherwise the code decides, falling back to
    /// `HandlerError` for anything unrecognized.
    pub fn to_failure(&self) -> Failure {
        use error_codes::*;
        use mcp_error_codes::*;

        let from_data = self
            .data
            .as_ref()
            .and_then(|d| d.get("errorKind"))
            .and_then(|k| k.as_str())
            .and_then(ErrorKind::parse);

        let kind = from_data.unwrap_or(match self.code {
            INVALID_PARAMS => ErrorKind::InvalidArguments,
            METHOD_NOT_FOUND | TOOL_NOT_FOUND | RESOURCE_NOT_FOUND | PROMPT_NOT_FOUND => {
                ErrorKind::UnknownCapability
            }
            NOT_NEGOTIATED => ErrorKind::NotNegotiated,
            SESSION_CLOSED => ErrorKind::SessionClosed,
            TIMEOUT => ErrorKind::Timeout,
            _ => ErrorKind::HandlerError,
        });
        Failure::new(kind, self.message.clone())
    }
}

/// Rebuild a local error from one received over the wire.
impl From<JsonRpcErrorObject> for McpError {
    fn from(obj: JsonRpcErrorObject) -> Self {
        use error_codes::*;
        use mcp_error_codes::*;

        let tagged = obj.data.as_ref().and_then(|d| d.get("errorKind")).is_some();
        if !tagged {
            match obj.code {
                PARSE_ERROR => return McpError::ParseError(obj.message),
                INVALID_REQUEST => return McpError::InvalidRequest(obj.message),
                METHOD_NOT_FOUND => return McpError::MethodNotFound(obj.message),
                INTERNAL_ERROR => return McpError::InternalError(obj.message),
                _ => {}
            }
        }

        let kind = match obj.code {
            RESOURCE_NOT_FOUND => CapabilityKind::Resource,
            PROMPT_NOT_FOUND => CapabilityKind::Prompt,
            _ => CapabilityKind::Tool,
        };
        McpError::from_failure(kind, obj.to_failure())
    }
}

pub type McpResult<T> = Result<T, McpError>;
