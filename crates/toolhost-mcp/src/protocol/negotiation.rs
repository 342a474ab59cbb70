//! Session state machine and capability negotiation during initialization.

use crate::types::{
    Catalog, ClientCapabilities, Implementation, InitializeParams, InitializeResult, McpError,
    McpResult, MCP_VERSION,
};

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Negotiated,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Negotiated => "negotiated",
            SessionState::Closed => "closed",
        }
    }
}

/// Stored client capabilities after negotiation.
#[derive(Debug, Clone, Default)]
pub struct NegotiatedCapabilities {
    pub state: SessionState,
    pub client: ClientCapabilities,
    pub client_info: Option<Implementation>,
    pub initialized: bool,
}

impl NegotiatedCapabilities {
    /// Accept the handshake exactly once and move to `Negotiated`.
    pub fn negotiate(
        &mut self,
        params: InitializeParams,
        catalog: Catalog,
    ) -> McpResult<InitializeResult> {
        match self.state {
            SessionState::Uninitialized => {}
            SessionState::Negotiated => {
                return Err(McpError::InvalidRequest(
                    "Session already initialized".to_string(),
                ))
            }
            SessionState::Closed => return Err(McpError::SessionClosed),
        }

        if params.protocol_version != MCP_VERSION {
            tracing::warn!(
                "Client requested protocol version {}, server supports {}. Proceeding with server version.",
                params.protocol_version,
                MCP_VERSION
            );
        }

        tracing::info!(
            "Initialized with client: {} v{} ({} capabilities advertised)",
            params.client_info.name,
            params.client_info.version,
            catalog.len()
        );

        self.client = params.capabilities;
        self.client_info = Some(params.client_info);
        self.state = SessionState::Negotiated;

        Ok(InitializeResult::with_catalog(catalog))
    }

    pub fn mark_initialized(&mut self) -> McpResult<()> {
        if self.state != SessionState::Negotiated {
            return Err(McpError::NotNegotiated(
                "initialized notification before initialize".to_string(),
            ));
        }
        self.initialized = true;
        tracing::info!("MCP handshake complete");
        Ok(())
    }

    /// Reject anything but the handshake until negotiation has happened.
    pub fn require_negotiated(&self, method: &str) -> McpResult<()> {
        match self.state {
            SessionState::Negotiated => Ok(()),
            SessionState::Uninitialized => Err(McpError::NotNegotiated(format!(
                "'{method}' received before initialize"
            ))),
            SessionState::Closed => Err(McpError::SessionClosed),
        }
    }

    /// Returns `false` if the session was already closed.
    pub fn close(&mut self) -> bool {
        let was_open = self.state != SessionState::Closed;
        self.state = SessionState::Closed;
        was_open
    }
}
