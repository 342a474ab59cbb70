//! MCP protocol handling — JSON-RPC dispatch.

pub mod convert;
pub mod handler;
pub mod negotiation;
pub mod validator;

pub use handler::ProtocolHandler;
pub use negotiation::SessionState;
