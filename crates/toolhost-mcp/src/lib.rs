//! toolhost MCP server — tools, resources, and prompts over stdio,
//! streaming HTTP, and SSE, plus the matching client session.

pub mod capabilities;
pub mod client;
pub mod config;
pub mod protocol;
pub mod repl;
pub mod session;
pub mod transport;
pub mod types;

pub use client::ClientSession;
pub use config::{resolve_bind_addr, resolve_session_ttl, resolve_timeout, TransportConfig};
pub use protocol::ProtocolHandler;
pub use session::{Session, SessionRegistry};
#[cfg(feature = "http")]
pub use transport::HttpServer;
#[cfg(feature = "stdio")]
pub use transport::StdioTransport;
pub use transport::Transport;
