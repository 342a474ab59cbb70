//! Caller-side session: handshake, discovery, and correlated invocation.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use toolhost::{CapabilityDescriptor, CapabilityKind, InvocationResult};

use crate::config::TransportConfig;
use crate::protocol::convert;
use crate::protocol::SessionState;
use crate::transport::Transport;
use crate::types::*;

use super::transport::connect;

#[derive(Default)]
struct PendingTable {
    closed: bool,
    waiters: HashMap<RequestId, oneshot::Sender<JsonRpcMessage>>,
}

type Pending = Arc<Mutex<PendingTable>>;

/// A negotiated (or negotiating) connection to a capability host.
///
/// Any number of tasks may call [`ClientSession::invoke`] at once; each
/// waits only for the response carrying its own correlation id.
pub struct ClientSession {
    transport: Arc<dyn Transport>,
    pending: Pending,
    server: OnceLock<InitializeResult>,
    default_deadline: Option<Duration>,
    reader: JoinHandle<()>,
}

impl ClientSession {
    /// Connect the configured binding and complete the handshake.
    ///
    /// On any failure the transport is closed before the error is returned.
    pub async fn open(config: &TransportConfig, timeout: Duration) -> McpResult<Self> {
        tracing::info!("Connecting to {config}");
        let transport = connect(config, timeout).await?;
        let session = Self::attach(transport).with_default_deadline(timeout);
        match session.initialize(timeout).await {
            Ok(_) => Ok(session),
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    tracing::debug!("Closing after failed handshake: {close_err}");
                }
                Err(e)
            }
        }
    }

    /// Handshake over an already-connected transport.
    pub async fn connect(transport: Arc<dyn Transport>, timeout: Duration) -> McpResult<Self> {
        let session = Self::attach(transport);
        match session.initialize(timeout).await {
            Ok(_) => Ok(session),
            Err(e) => {
                let _ = session.close().await;
                Err(e)
            }
        }
    }

    /// Start reading from `transport` without performing the handshake.
    pub fn attach(transport: Arc<dyn Transport>) -> Self {
        let pending: Pending = Arc::new(Mutex::new(PendingTable::default()));
        let reader = tokio::spawn(read_loop(transport.clone(), pending.clone()));
        Self {
            transport,
            pending,
            server: OnceLock::new(),
            default_deadline: None,
            reader,
        }
    }

    /// Deadline applied by [`ClientSession::invoke`] and the list calls.
    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = Some(deadline);
        self
    }

    pub async fn state(&self) -> SessionState {
        if self.pending.lock().await.closed {
            SessionState::Closed
        } else if self.server.get().is_some() {
            SessionState::Negotiated
        } else {
            SessionState::Uninitialized
        }
    }

    /// The server's handshake answer, once negotiated.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server.get()
    }

    /// Everything the server advertised during the handshake.
    pub fn catalog(&self) -> Option<&Catalog> {
        self.server.get().and_then(|s| s.catalog.as_ref())
    }

    pub async fn initialize(&self, timeout: Duration) -> McpResult<&InitializeResult> {
        if let Some(existing) = self.server.get() {
            return Ok(existing);
        }

        let params = serde_json::to_value(InitializeParams::client_default())?;
        let value = self
            .request("initialize", Some(params), Some(timeout))
            .await?;
        let result: InitializeResult = serde_json::from_value(value)?;

        tracing::info!(
            "Negotiated with {} v{} (protocol {})",
            result.server_info.name,
            result.server_info.version,
            result.protocol_version
        );

        let result = self.server.get_or_init(|| result);
        self.transport
            .send(JsonRpcNotification::new(NOTIFICATION_INITIALIZED, None).into())
            .await?;
        Ok(result)
    }

    /// Descriptors of one kind, as the server lists them right now.
    pub async fn list_capabilities(
        &self,
        kind: CapabilityKind,
    ) -> McpResult<Vec<CapabilityDescriptor>> {
        let deadline = self.default_deadline;
        match kind {
            CapabilityKind::Tool => {
                let value = self.request("tools/list", None, deadline).await?;
                let list: ToolListResult = serde_json::from_value(value)?;
                list.tools.iter().map(convert::descriptor_from_tool).collect()
            }
            CapabilityKind::Resource => {
                let value = self.request("resources/list", None, deadline).await?;
                let list: ResourceListResult = serde_json::from_value(value)?;
                let value = self
                    .request("resources/templates/list", None, deadline)
                    .await?;
                let templates: ResourceTemplateListResult = serde_json::from_value(value)?;
                list.resources
                    .iter()
                    .map(convert::descriptor_from_resource)
                    .chain(
                        templates
                            .resource_templates
                            .iter()
                            .map(convert::descriptor_from_template),
                    )
                    .collect()
            }
            CapabilityKind::Prompt => {
                let value = self.request("prompts/list", None, deadline).await?;
                let list: PromptListResult = serde_json::from_value(value)?;
                list.prompts
                    .iter()
                    .map(convert::descriptor_from_prompt)
                    .collect()
            }
        }
    }

    /// Invoke with the session's default deadline (if any).
    pub async fn invoke(
        &self,
        kind: CapabilityKind,
        name: &str,
        arguments: Option<Value>,
    ) -> McpResult<InvocationResult> {
        self.invoke_inner(kind, name, arguments, self.default_deadline)
            .await
    }

    /// Invoke, resolving to a `Timeout` failure once `deadline` passes.
    pub async fn invoke_with_deadline(
        &self,
        kind: CapabilityKind,
        name: &str,
        arguments: Option<Value>,
        deadline: Duration,
    ) -> McpResult<InvocationResult> {
        self.invoke_inner(kind, name, arguments, Some(deadline))
            .await
    }

    /// `Err` is reserved for transport faults; everything the protocol can
    /// express comes back as an [`InvocationResult`].
    async fn invoke_inner(
        &self,
        kind: CapabilityKind,
        name: &str,
        arguments: Option<Value>,
        deadline: Option<Duration>,
    ) -> McpResult<InvocationResult> {
        let (method, params) = match kind {
            CapabilityKind::Tool => (
                "tools/call",
                serde_json::to_value(ToolCallParams {
                    name: name.to_string(),
                    arguments,
                })?,
            ),
            CapabilityKind::Resource => (
                "resources/read",
                serde_json::to_value(ResourceReadParams {
                    uri: name.to_string(),
                    arguments,
                })?,
            ),
            CapabilityKind::Prompt => (
                "prompts/get",
                serde_json::to_value(PromptGetParams {
                    name: name.to_string(),
                    arguments,
                })?,
            ),
        };

        match self.request(method, Some(params), deadline).await {
            Ok(result) => {
                let payload = match kind {
                    CapabilityKind::Tool => match result.get("structuredContent") {
                        Some(structured) => structured.clone(),
                        None => result,
                    },
                    _ => result,
                };
                Ok(InvocationResult::success(payload))
            }
            Err(e) if e.is_transport() => Err(e),
            Err(e) => Ok(InvocationResult::Failure(e.into_failure())),
        }
    }

    /// Send one request and wait for its correlated answer.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Option<Duration>,
    ) -> McpResult<Value> {
        if method != "initialize" && self.server.get().is_none() {
            return Err(McpError::NotNegotiated(format!(
                "'{method}' before the handshake completed"
            )));
        }

        let id = RequestId::generate();
        let (tx, rx) = oneshot::channel();
        {
            let mut table = self.pending.lock().await;
            if table.closed {
                return Err(McpError::SessionClosed);
            }
            table.waiters.insert(id.clone(), tx);
        }

        let request = JsonRpcRequest::new(id.clone(), method, params);
        if let Err(e) = self.transport.send(request.into()).await {
            self.pending.lock().await.waiters.remove(&id);
            return Err(e);
        }

        let reply = match deadline {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.pending.lock().await.waiters.remove(&id);
                    self.cancel_remote(id);
                    return Err(McpError::Timeout(format!(
                        "no response to '{method}' within {limit:?}"
                    )));
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(JsonRpcMessage::Response(response)) => Ok(response.result),
            Ok(JsonRpcMessage::Error(error)) => Err(error.error.into()),
            Ok(other) => Err(McpError::InternalError(format!(
                "unexpected reply: {:?}",
                other.method()
            ))),
            Err(_) => Err(McpError::SessionClosed),
        }
    }

    fn cancel_remote(&self, id: RequestId) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let notification = CancelledParams::notification(&id, "deadline exceeded");
            if let Err(e) = transport.send(notification.into()).await {
                tracing::debug!("Could not send cancellation for {id}: {e}");
            }
        });
    }

    /// Close the transport and resolve everything pending with `SessionClosed`.
    pub async fn close(&self) -> McpResult<()> {
        let already_closed = {
            let mut table = self.pending.lock().await;
            let was = table.closed;
            table.closed = true;
            table.waiters.clear();
            was
        };
        if already_closed {
            return Ok(());
        }

        let result = self.transport.close().await;
        self.reader.abort();
        tracing::info!("Client session closed");
        result
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Route responses to their waiters until the transport goes away.
async fn read_loop(transport: Arc<dyn Transport>, pending: Pending) {
    loop {
        match transport.receive().await {
            Ok(Some(JsonRpcMessage::Response(response))) => {
                let id = response.id.clone();
                deliver(&pending, id, response.into()).await;
            }
            Ok(Some(JsonRpcMessage::Error(error))) => {
                if error.id == RequestId::Null {
                    tracing::warn!("Server error without request id: {}", error.error.message);
                    continue;
                }
                let id = error.id.clone();
                deliver(&pending, id, error.into()).await;
            }
            Ok(Some(JsonRpcMessage::Request(request))) => {
                let reply: JsonRpcMessage = if request.method == "ping" {
                    JsonRpcResponse::new(request.id, Value::Object(serde_json::Map::new())).into()
                } else {
                    McpError::MethodNotFound(request.method)
                        .to_json_rpc_error(request.id)
                        .into()
                };
                if let Err(e) = transport.send(reply).await {
                    tracing::debug!("Could not answer server request: {e}");
                }
            }
            Ok(Some(JsonRpcMessage::Notification(notification))) => {
                tracing::debug!("Server notification: {}", notification.method);
            }
            Ok(None) => {
                tracing::info!("Server closed the transport");
                break;
            }
            Err(McpError::ParseError(detail)) => {
                tracing::warn!("Discarding unparseable server message: {detail}");
            }
            Err(e) => {
                tracing::warn!("Transport fault: {e}");
                break;
            }
        }
    }

    let mut table = pending.lock().await;
    table.closed = true;
    // Dropping the senders wakes every waiter with SessionClosed.
    table.waiters.clear();
}

async fn deliver(pending: &Pending, id: RequestId, message: JsonRpcMessage) {
    let waiter = pending.lock().await.waiters.remove(&id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(message);
        }
        None => tracing::debug!("Discarding late or unknown response {id}"),
    }
}
