//! Server-side sessions.

pub mod registry;
pub mod server;

pub use registry::SessionRegistry;
pub use server::{Outbound, Session};
