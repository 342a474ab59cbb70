//! Client-side transport bindings: child process pipe, streaming HTTP, SSE.

use std::sync::Arc;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::transport::Transport;
use crate::types::{McpError, McpResult};

/// Open the binding described by `config`.
///
/// Launch and connection failures come back as [`McpError::Transport`].
pub async fn connect(config: &TransportConfig, timeout: Duration) -> McpResult<Arc<dyn Transport>> {
    match config {
        #[cfg(feature = "stdio")]
        TransportConfig::Pipe { command, args, env } => {
            let transport = pipe::ChildProcessTransport::spawn(command, args, env)?;
            Ok(Arc::new(transport))
        }
        #[cfg(feature = "http")]
        TransportConfig::StreamableHttp { url } => {
            Ok(Arc::new(http::StreamableHttpTransport::new(url)?))
        }
        #[cfg(feature = "http")]
        TransportConfig::Sse { url } => Ok(Arc::new(http::SseTransport::connect(url, timeout).await?)),
        #[allow(unreachable_patterns)]
        other => {
            let _ = timeout;
            Err(McpError::Transport(format!(
                "binding for '{other}' is not compiled in"
            )))
        }
    }
}

#[cfg(feature = "stdio")]
pub mod pipe {
    use std::collections::HashMap;
    use std::process::Stdio;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::process::{Child, ChildStdin, ChildStdout, Command};
    use tokio::sync::Mutex;

    use crate::transport::{LineTransport, Transport};
    use crate::types::{JsonRpcMessage, McpError, McpResult};

    const EXIT_GRACE: Duration = Duration::from_secs(2);

    /// Runs the host as a child process and talks to it over stdin/stdout.
    ///
    /// The child is killed if the transport is dropped without `close`.
    pub struct ChildProcessTransport {
        lines: LineTransport<ChildStdout, ChildStdin>,
        child: Mutex<Child>,
    }

    impl ChildProcessTransport {
        pub fn spawn(
            command: &str,
            args: &[String],
            env: &HashMap<String, String>,
        ) -> McpResult<Self> {
            let mut child = Command::new(command)
                .args(args)
                .envs(env)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| McpError::Transport(format!("failed to launch '{command}': {e}")))?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| McpError::Transport("child stdin unavailable".to_string()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| McpError::Transport("child stdout unavailable".to_string()))?;

            tracing::debug!("Spawned '{command}' (pid {:?})", child.id());

            Ok(Self {
                lines: LineTransport::new(stdout, stdin),
                child: Mutex::new(child),
            })
        }
    }

    #[async_trait]
    impl Transport for ChildProcessTransport {
        async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
            self.lines
                .send(message)
                .await
                .map_err(|e| McpError::Transport(format!("child pipe: {e}")))
        }

        async fn receive(&self) -> McpResult<Option<JsonRpcMessage>> {
            self.lines.receive().await
        }

        /// Close stdin, give the child a moment to exit, then kill it.
        async fn close(&self) -> McpResult<()> {
            if let Err(e) = self.lines.close().await {
                tracing::debug!("Closing child stdin: {e}");
            }
            let mut child = self.child.lock().await;
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!("Child exited with {status}"),
                Ok(Err(e)) => tracing::warn!("Waiting for child: {e}"),
                Err(_) => {
                    tracing::warn!("Child did not exit within {EXIT_GRACE:?}, killing it");
                    child.kill().await?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(feature = "http")]
pub mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use eventsource_client as es;
    use eventsource_client::Client as _;
    use futures::StreamExt;
    use reqwest::{header, StatusCode};
    use tokio::io::AsyncBufReadExt;
    use tokio::sync::{mpsc, oneshot, Mutex};
    use tokio::task::JoinHandle;
    use tokio_util::io::StreamReader;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    use crate::transport::framing;
    use crate::transport::sse::{ENDPOINT_EVENT, MESSAGE_EVENT};
    use crate::transport::streamable::{NDJSON, SESSION_HEADER};
    use crate::transport::Transport;
    use crate::types::{JsonRpcMessage, McpError, McpResult};

    fn transport_err(context: &str, e: impl std::fmt::Display) -> McpError {
        McpError::Transport(format!("{context}: {e}"))
    }

    /// Inbound half shared by both HTTP clients.
    struct Inbound {
        tx: mpsc::UnboundedSender<JsonRpcMessage>,
        rx: Mutex<mpsc::UnboundedReceiver<JsonRpcMessage>>,
        closed: CancellationToken,
    }

    impl Inbound {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                tx,
                rx: Mutex::new(rx),
                closed: CancellationToken::new(),
            }
        }

        async fn receive(&self) -> McpResult<Option<JsonRpcMessage>> {
            let mut rx = self.rx.lock().await;
            tokio::select! {
                _ = self.closed.cancelled() => Ok(None),
                message = rx.recv() => Ok(message),
            }
        }
    }

    /// Client for the streaming HTTP binding.
    ///
    /// Each message is its own `POST`; reply bodies are read as
    /// newline-delimited JSON on a background task and fed to `receive`.
    pub struct StreamableHttpTransport {
        client: reqwest::Client,
        url: Url,
        session_id: Mutex<Option<String>>,
        inbound: Inbound,
    }

    impl StreamableHttpTransport {
        pub fn new(url: &str) -> McpResult<Self> {
            let url = Url::parse(url).map_err(|e| transport_err("invalid URL", e))?;
            Ok(Self {
                client: reqwest::Client::new(),
                url,
                session_id: Mutex::new(None),
                inbound: Inbound::new(),
            })
        }

        pub async fn session_id(&self) -> Option<String> {
            self.session_id.lock().await.clone()
        }
    }

    #[async_trait]
    impl Transport for StreamableHttpTransport {
        async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
            if self.inbound.closed.is_cancelled() {
                return Err(McpError::Transport("transport closed".to_string()));
            }

            let mut request = self
                .client
                .post(self.url.clone())
                .header(header::ACCEPT, format!("{NDJSON}, application/json"))
                .json(&message);
            if let Some(id) = self.session_id.lock().await.as_deref() {
                request = request.header(SESSION_HEADER, id);
            }

            let response = request
                .send()
                .await
                .map_err(|e| transport_err("POST failed", e))?;

            if let Some(id) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                *self.session_id.lock().await = Some(id.to_string());
            }

            let status = response.status();
            if status == StatusCode::ACCEPTED {
                return Ok(());
            }
            if status == StatusCode::NOT_FOUND {
                return Err(McpError::Transport("server no longer knows this session".to_string()));
            }
            if !status.is_success() {
                return Err(McpError::Transport(format!("server answered HTTP {status}")));
            }

            let is_ndjson = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with(NDJSON));

            let tx = self.inbound.tx.clone();
            let closed = self.inbound.closed.clone();
            tokio::spawn(async move {
                if is_ndjson {
                    let stream = response
                        .bytes_stream()
                        .map(|r| r.map_err(std::io::Error::other));
                    let mut lines = tokio::io::BufReader::new(StreamReader::new(stream)).lines();
                    loop {
                        let line = tokio::select! {
                            _ = closed.cancelled() => break,
                            line = lines.next_line() => line,
                        };
                        match line {
                            Ok(Some(line)) if line.trim().is_empty() => continue,
                            Ok(Some(line)) => match framing::parse_message(&line) {
                                Ok(message) => {
                                    let _ = tx.send(message);
                                }
                                Err(e) => tracing::warn!("Discarding reply line: {e}"),
                            },
                            Ok(None) => break,
                            Err(e) => {
                                tracing::warn!("Reply stream broke off: {e}");
                                break;
                            }
                        }
                    }
                } else {
                    match response.bytes().await {
                        Ok(body) if body.is_empty() => {}
                        Ok(body) => match framing::parse_batch(&body) {
                            Ok(messages) => {
                                for message in messages {
                                    let _ = tx.send(message);
                                }
                            }
                            Err(e) => tracing::warn!("Discarding reply body: {e}"),
                        },
                        Err(e) => tracing::warn!("Reading reply body: {e}"),
                    }
                }
            });

            Ok(())
        }

        async fn receive(&self) -> McpResult<Option<JsonRpcMessage>> {
            self.inbound.receive().await
        }

        /// Ends the server-side session with `DELETE`, best-effort.
        async fn close(&self) -> McpResult<()> {
            if self.inbound.closed.is_cancelled() {
                return Ok(());
            }
            self.inbound.closed.cancel();

            if let Some(id) = self.session_id.lock().await.take() {
                let result = self
                    .client
                    .delete(self.url.clone())
                    .header(SESSION_HEADER, &id)
                    .send()
                    .await;
                if let Err(e) = result {
                    tracing::debug!("DELETE for session {id} failed: {e}");
                }
            }
            Ok(())
        }
    }

    /// Client for the SSE binding: replies arrive as `message` events, and
    /// requests go to the endpoint announced by the first `endpoint` event.
    pub struct SseTransport {
        client: reqwest::Client,
        endpoint: Url,
        inbound: Inbound,
        stream_task: JoinHandle<()>,
    }

    impl SseTransport {
        /// Open the event stream and wait (up to `timeout`) for the endpoint.
        pub async fn connect(url: &str, timeout: Duration) -> McpResult<Self> {
            let base = Url::parse(url).map_err(|e| transport_err("invalid URL", e))?;

            let es_client = es::ClientBuilder::for_url(url)
                .map_err(|e| transport_err("event stream", format!("{e:?}")))?
                .reconnect(es::ReconnectOptions::reconnect(false).build())
                .build();

            let inbound = Inbound::new();
            let tx = inbound.tx.clone();
            let closed = inbound.closed.clone();
            let (endpoint_tx, endpoint_rx) = oneshot::channel::<McpResult<String>>();

            let stream_task = tokio::spawn(async move {
                let mut stream = es_client.stream();
                let mut endpoint_tx = Some(endpoint_tx);
                loop {
                    let event = tokio::select! {
                        _ = closed.cancelled() => break,
                        event = stream.next() => event,
                    };
                    match event {
                        Some(Ok(es::SSE::Event(event))) if event.event_type == ENDPOINT_EVENT => {
                            if let Some(reply) = endpoint_tx.take() {
                                let _ = reply.send(Ok(event.data));
                            }
                        }
                        Some(Ok(es::SSE::Event(event))) => {
                            if event.event_type != MESSAGE_EVENT {
                                tracing::debug!("Ignoring '{}' event", event.event_type);
                                continue;
                            }
                            match framing::parse_message(&event.data) {
                                Ok(message) => {
                                    if tx.send(message).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => tracing::warn!("Discarding event: {e}"),
                            }
                        }
                        Some(Ok(es::SSE::Connected(_))) | Some(Ok(es::SSE::Comment(_))) => {}
                        Some(Err(e)) => {
                            let err = transport_err("event stream", format!("{e:?}"));
                            match endpoint_tx.take() {
                                Some(reply) => {
                                    let _ = reply.send(Err(err));
                                }
                                None => tracing::warn!("{err}"),
                            }
                            break;
                        }
                        None => break,
                    }
                }
                // Stream over: wake the reader.
                closed.cancel();
            });

            let endpoint = match tokio::time::timeout(timeout, endpoint_rx).await {
                Ok(Ok(Ok(path))) => base
                    .join(&path)
                    .map_err(|e| transport_err("bad endpoint event", e)),
                Ok(Ok(Err(e))) => Err(e),
                Ok(Err(_)) => Err(McpError::Transport(
                    "event stream ended before announcing an endpoint".to_string(),
                )),
                Err(_) => Err(McpError::Transport(format!(
                    "no endpoint event within {timeout:?}"
                ))),
            };

            match endpoint {
                Ok(endpoint) => {
                    tracing::debug!("SSE endpoint: {endpoint}");
                    Ok(Self {
                        client: reqwest::Client::new(),
                        endpoint,
                        inbound,
                        stream_task,
                    })
                }
                Err(e) => {
                    stream_task.abort();
                    Err(e)
                }
            }
        }

        pub fn endpoint(&self) -> &Url {
            &self.endpoint
        }
    }

    #[async_trait]
    impl Transport for SseTransport {
        async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
            if self.inbound.closed.is_cancelled() {
                return Err(McpError::Transport("event stream closed".to_string()));
            }
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&message)
                .send()
                .await
                .map_err(|e| transport_err("POST failed", e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(McpError::Transport(format!("server answered HTTP {status}")));
            }
            Ok(())
        }

        async fn receive(&self) -> McpResult<Option<JsonRpcMessage>> {
            self.inbound.receive().await
        }

        async fn close(&self) -> McpResult<()> {
            self.inbound.closed.cancel();
            self.stream_task.abort();
            Ok(())
        }
    }

    impl Drop for SseTransport {
        fn drop(&mut self) {
            self.stream_task.abort();
        }
    }
}
