//! Pipe transport — newline-delimited JSON over any async byte stream.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use async_trait::async_trait;

use crate::types::{JsonRpcMessage, McpError, McpResult};

use super::{framing, Transport};

/// One JSON-RPC message per line in each direction.
///
/// Reader and writer sit behind separate locks, so a pending `receive`
/// never blocks `send`.
pub struct LineTransport<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<Option<W>>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(Some(writer)),
        }
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        let framed = framing::frame_message(&message)?;
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| McpError::Transport("pipe closed".to_string()))?;
        writer.write_all(framed.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Blank lines are skipped; a line that is not a JSON-RPC message
    /// surfaces as [`McpError::ParseError`] and the stream stays usable.
    async fn receive(&self) -> McpResult<Option<JsonRpcMessage>> {
        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();
        loop {
            line.clear();
            let bytes_read = reader.read_until(b'\n', &mut line).await?;
            if bytes_read == 0 {
                return Ok(None);
            }
            if line.trim_ascii().is_empty() {
                continue;
            }
            tracing::trace!("Received line: {}", String::from_utf8_lossy(&line).trim_end());
            return framing::parse_line(&line).map(Some);
        }
    }

    async fn close(&self) -> McpResult<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

/// Stdio transport for desktop MCP clients: stdin in, stdout out.
#[cfg(feature = "stdio")]
pub type StdioTransport = LineTransport<tokio::io::Stdin, tokio::io::Stdout>;

#[cfg(feature = "stdio")]
impl StdioTransport {
    pub fn stdio() -> Self {
        LineTransport::new(tokio::io::stdin(), tokio::io::stdout())
    }
}
