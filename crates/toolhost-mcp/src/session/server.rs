//! Server-side session — correlation, concurrency, and teardown for one
//! connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::Instrument;

use toolhost::Dispatcher;

use crate::protocol::{ProtocolHandler, SessionState};
use crate::transport::Transport;
use crate::types::*;

/// Where a session writes its replies.
pub type Outbound = mpsc::UnboundedSender<JsonRpcMessage>;

struct PendingEntry {
    abort: AbortHandle,
    reply: Outbound,
}

/// One connection's worth of protocol state.
///
/// Every request other than the handshake runs on its own task, so a slow
/// handler never holds up the rest; replies go out as they complete and
/// carry the request id.
pub struct Session {
    id: String,
    handler: Arc<ProtocolHandler>,
    pending: Arc<Mutex<HashMap<RequestId, PendingEntry>>>,
    created_at: DateTime<Utc>,
    last_activity: Arc<Mutex<Instant>>,
}

impl Session {
    pub fn new(dispatcher: Dispatcher) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            handler: Arc::new(ProtocolHandler::new(dispatcher)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            created_at: Utc::now(),
            last_activity: Arc::new(Mutex::new(Instant::now())),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn state(&self) -> SessionState {
        self.handler.state().await
    }

    /// Number of requests currently executing.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Time since the last inbound message or request completion, or
    /// `None` while requests are still running.
    pub async fn idle_for(&self) -> Option<Duration> {
        if self.in_flight().await > 0 {
            return None;
        }
        Some(self.last_activity.lock().await.elapsed())
    }

    async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    /// Take one inbound message. Replies (possibly later) go to `reply`.
    pub async fn accept(&self, message: JsonRpcMessage, reply: &Outbound) {
        self.touch().await;
        match message {
            JsonRpcMessage::Request(request) => self.accept_request(request, reply).await,
            JsonRpcMessage::Notification(notification)
                if notification.method == NOTIFICATION_CANCELLED =>
            {
                self.cancel(notification.params).await;
            }
            JsonRpcMessage::Notification(notification) => {
                self.handler.handle_notification(notification).await;
            }
            other => {
                tracing::debug!(
                    "Session {} ignoring unsolicited response {:?}",
                    self.id,
                    other.id()
                );
            }
        }
    }

    async fn accept_request(&self, request: JsonRpcRequest, reply: &Outbound) {
        match request.method.as_str() {
            // The handshake and liveness checks run inline so that anything
            // arriving after them observes their effect.
            "initialize" | "ping" => {
                let response = self.handler.handle_request(request).await;
                let _ = reply.send(response);
            }
            "shutdown" => {
                let response = self.handler.handle_request(request).await;
                let accepted = matches!(response, JsonRpcMessage::Response(_));
                let _ = reply.send(response);
                if accepted {
                    self.close().await;
                }
            }
            _ => self.spawn_request(request, reply).await,
        }
    }

    async fn spawn_request(&self, request: JsonRpcRequest, reply: &Outbound) {
        if let Err(e) = self.handler.admit(&request).await {
            let _ = reply.send(e.to_json_rpc_error(request.id).into());
            return;
        }

        // Held across the spawn, so the task cannot finish before its entry exists.
        let mut pending = self.pending.lock().await;
        if pending.contains_key(&request.id) {
            let err = McpError::InvalidRequest(format!(
                "Request id {} is already in flight",
                request.id
            ));
            let _ = reply.send(err.to_json_rpc_error(request.id).into());
            return;
        }

        let id = request.id.clone();
        let handler = self.handler.clone();
        let table = self.pending.clone();
        let reply_tx = reply.clone();
        let last_activity = self.last_activity.clone();
        let span = tracing::debug_span!("request", id = %id, method = %request.method);

        let task = tokio::spawn(
            async move {
                let request_id = request.id.clone();
                let response = handler.handle_request(request).await;
                *last_activity.lock().await = Instant::now();
                // Cancelled or closed requests have already left the table.
                if table.lock().await.remove(&request_id).is_some() {
                    let _ = reply_tx.send(response);
                }
            }
            .instrument(span),
        );

        pending.insert(
            id,
            PendingEntry {
                abort: task.abort_handle(),
                reply: reply.clone(),
            },
        );
    }

    async fn cancel(&self, params: Option<serde_json::Value>) {
        let Some(id) = params
            .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok())
            .and_then(|p| p.request_id())
        else {
            tracing::debug!("Malformed cancellation notification");
            return;
        };

        match self.pending.lock().await.remove(&id) {
            Some(entry) => {
                entry.abort.abort();
                tracing::info!("Cancelled request {id}");
            }
            None => tracing::debug!("Cancellation for unknown request {id}"),
        }
    }

    /// Move to `Closed` and answer every in-flight request with `SessionClosed`.
    pub async fn close(&self) {
        if !self.handler.close().await {
            return;
        }

        let drained: Vec<(RequestId, PendingEntry)> = self.pending.lock().await.drain().collect();
        for (id, entry) in drained {
            entry.abort.abort();
            let _ = entry
                .reply
                .send(McpError::SessionClosed.to_json_rpc_error(id).into());
        }
        tracing::info!("Session {} closed", self.id);
    }

    /// Drive the session over a full-duplex transport until EOF, fault, or
    /// shutdown, then close both.
    pub async fn serve<T>(self: Arc<Self>, transport: Arc<T>) -> McpResult<()>
    where
        T: Transport + ?Sized + 'static,
    {
        let span = tracing::info_span!("session", id = %self.id);
        self.serve_inner(transport).instrument(span).await
    }

    async fn serve_inner<T>(&self, transport: Arc<T>) -> McpResult<()>
    where
        T: Transport + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcMessage>();

        let writer_transport = transport.clone();
        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = writer_transport.send(message).await {
                    tracing::warn!("Dropping outbound messages: {e}");
                    break;
                }
            }
        });

        tracing::info!("Session started");
        let mut outcome = Ok(());

        loop {
            match transport.receive().await {
                Ok(Some(message)) => self.accept(message, &tx).await,
                Ok(None) => {
                    tracing::info!("Peer closed the transport");
                    break;
                }
                Err(McpError::ParseError(detail)) => {
                    tracing::warn!("Parse error: {detail}");
                    let err = McpError::ParseError(detail).to_json_rpc_error(RequestId::Null);
                    let _ = tx.send(err.into());
                }
                Err(e) => {
                    tracing::error!("Transport fault: {e}");
                    outcome = Err(e);
                    break;
                }
            }

            if self.state().await == SessionState::Closed {
                break;
            }
        }

        self.close().await;
        drop(tx);
        let _ = writer.await;
        transport.close().await?;
        outcome
    }
}
