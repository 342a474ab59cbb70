//! Caller side: open a binding, negotiate, list, and invoke.

pub mod session;
pub mod transport;

pub use session::ClientSession;
pub use transport::connect;
#[cfg(feature = "stdio")]
pub use transport::pipe::ChildProcessTransport;
#[cfg(feature = "http")]
pub use transport::http::{SseTransport, StreamableHttpTransport};
