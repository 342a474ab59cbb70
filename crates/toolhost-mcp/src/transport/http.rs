//! HTTP server — streaming HTTP and SSE bindings plus /health on one router.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use toolhost::Dispatcher;

use crate::config::DEFAULT_SESSION_TTL_SECS;
use crate::session::{Outbound, SessionRegistry};
use crate::types::{McpError, McpResult, RequestId};

use super::{sse, streamable};

/// Shared server state passed to all handlers via axum State.
pub struct AppState {
    pub sessions: SessionRegistry,
    /// Outbound channel of each open SSE stream, by session id.
    pub(crate) sse_channels: Mutex<HashMap<String, Outbound>>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            sessions: SessionRegistry::new(dispatcher),
            sse_channels: Mutex::new(HashMap::new()),
        }
    }

    /// Close streaming HTTP sessions that have been quiet for `ttl`. SSE
    /// sessions live as long as their stream and are left alone.
    pub async fn reap_idle(&self, ttl: Duration) -> usize {
        let streams: Vec<String> = self.sse_channels.lock().await.keys().cloned().collect();
        let mut reaped = 0;
        for id in self.sessions.idle(ttl).await {
            if streams.contains(&id) {
                continue;
            }
            if self.drop_session(&id).await {
                tracing::info!("Evicted idle session {id}");
                reaped += 1;
            }
        }
        reaped
    }

    /// Forget a session across both bindings, closing it.
    pub(crate) async fn drop_session(&self, id: &str) -> bool {
        self.sse_channels.lock().await.remove(id);
        self.sessions.remove(id).await
    }
}

/// HTTP transport for web-based MCP clients.
pub struct HttpServer {
    state: Arc<AppState>,
    session_ttl: Duration,
}

impl HttpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            state: Arc::new(AppState::new(dispatcher)),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }

    /// How long a streaming HTTP session may sit idle before it is closed.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Run the HTTP server on the given address until Ctrl-C.
    pub async fn run(&self, addr: &str) -> McpResult<()> {
        let listener = TcpListener::bind(addr).await.map_err(McpError::Io)?;
        tracing::info!("HTTP transport listening on {addr}");
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> McpResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let reaper = tokio::spawn(reap_loop(self.state.clone(), self.session_ttl));

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| McpError::Transport(e.to_string()));
        reaper.abort();
        served?;

        self.state.sessions.close_all().await;
        self.state.sse_channels.lock().await.clear();
        tracing::info!("HTTP transport stopped");
        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(streamable::handle_post).delete(streamable::handle_delete),
        )
        .route("/sse", get(sse::handle_stream))
        .route("/messages", post(sse::handle_message))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn reap_loop(state: Arc<AppState>, ttl: Duration) {
    let period = (ttl / 4).max(Duration::from_millis(10));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        state.reap_idle(ttl).await;
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> AxumJson<serde_json::Value> {
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.count().await,
        "streams": state.sse_channels.lock().await.len(),
        "live": state.sessions.summary().await,
    }))
}

/// A bare JSON-RPC error body with a null id.
pub(crate) fn error_response(status: StatusCode, error: McpError) -> Response {
    (
        status,
        AxumJson(serde_json::to_value(error.to_json_rpc_error(RequestId::Null)).unwrap_or_default()),
    )
        .into_response()
}
