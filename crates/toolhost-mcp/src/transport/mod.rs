//! Transport layer for MCP communication.
//!
//! Every binding moves whole [`JsonRpcMessage`]s; sessions on either side
//! only ever see the [`Transport`] trait.

pub mod framing;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub mod sse;
pub mod stdio;
#[cfg(feature = "http")]
pub mod streamable;

use async_trait::async_trait;

use crate::types::{JsonRpcMessage, McpResult};

#[cfg(feature = "http")]
pub use http::HttpServer;
pub use stdio::LineTransport;
#[cfg(feature = "stdio")]
pub use stdio::StdioTransport;

/// A bidirectional message channel.
///
/// Methods take `&self` so one task can sit in `receive` while others `send`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: JsonRpcMessage) -> McpResult<()>;

    /// Next inbound message; `Ok(None)` once the peer has gone away.
    async fn receive(&self) -> McpResult<Option<JsonRpcMessage>>;

    async fn close(&self) -> McpResult<()>;
}
