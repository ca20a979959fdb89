//! stdio transport for the MCP server.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from the client
//! - stdout: sends messages to the client
//! - stderr: logging only, never MCP messages
//!
//! There is exactly one client, so no session registry is involved. The
//! binding ends when stdin reaches EOF, when stdout can no longer be written,
//! or when the shutdown future resolves.

use std::future::Future;
use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::mcp::protocol::{JsonRpcError, OutgoingMessage};
use crate::mcp::McpServer;

use super::lifecycle::Lifecycle;

/// A line-delimited JSON-RPC transport over a reader/writer pair.
///
/// Defaults to the process's stdin and stdout.
pub struct StdioTransport<R = tokio::io::Stdin, W = tokio::io::Stdout> {
    reader: BufReader<R>,
    writer: W,
    lifecycle: Lifecycle,
}

impl StdioTransport {
    /// Creates a transport over stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over any reader/writer pair.
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            lifecycle: Lifecycle::new(),
        }
    }

    /// The transport's lifecycle.
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Consumes the transport and returns the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Reads the next raw line with its terminator stripped.
    ///
    /// Returns `None` at EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Reads the next message line as text.
    ///
    /// Returns `None` at EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the line is not valid UTF-8.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        match self.read_frame().await? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Ok(None),
        }
    }

    /// Writes one serialised message followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or flushing fails.
    pub async fn write_line(&mut self, json: &str) -> io::Result<()> {
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Feeds every inbound line to `server` until EOF, a write failure, or
    /// `shutdown`.
    ///
    /// A write failure means the client is gone; the transport closes and
    /// this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the input fails.
    pub async fn serve<F>(&mut self, mut server: McpServer, shutdown: F) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        self.lifecycle.attach()?;
        tokio::pin!(shutdown);

        let result = loop {
            let line = tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, closing stdio transport");
                    break Ok(());
                }
                line = self.read_frame() => line,
            };

            let bytes = match line {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    info!("stdin closed, shutting down");
                    break Ok(());
                }
                Err(e) => break Err(TransportError::Io(e)),
            };

            if let Err(e) = self.lifecycle.activate() {
                break Err(e);
            }

            let reply = match String::from_utf8(bytes) {
                Ok(line) => server.handle_line(&line),
                Err(e) => {
                    warn!(error = %e, "Discarding line that is not valid UTF-8");
                    Some(OutgoingMessage::from(JsonRpcError::parse_error()).to_line())
                }
            };
            let Some(reply) = reply else {
                continue;
            };

            if let Err(e) = self.write_line(&reply).await {
                warn!(error = %e, "Failed to write to stdout, closing transport");
                break Ok(());
            }
            debug!(bytes = reply.len(), "Reply written");
        };

        self.lifecycle.begin_close();
        self.lifecycle.finish_close();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use crate::mcp::ServerFactory;
    use crate::transport::lifecycle::ConnectionState;

    fn transcript(input: &str) -> StdioTransport<&[u8], Vec<u8>> {
        StdioTransport::from_parts(input.as_bytes(), Vec::new())
    }

    fn lines(output: &[u8]) -> Vec<serde_json::Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn read_line_strips_crlf() {
        let mut transport = transcript("first\r\nsecond\n");
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_line_terminates_with_newline() {
        let mut transport = transcript("");
        transport.write_line(r#"{"a":1}"#).await.unwrap();
        assert_eq!(transport.into_writer(), b"{\"a\":1}\n");
    }

    #[tokio::test]
    async fn serves_until_eof() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test","version":"1"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let mut transport = transcript(input);
        transport
            .serve(ServerFactory::default().session(), std::future::pending())
            .await
            .unwrap();

        assert_eq!(transport.lifecycle().state(), ConnectionState::Closed);

        let replies = lines(&transport.into_writer());
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "chhart-mcp-server");
        assert_eq!(replies[1]["id"], 2);
        assert_eq!(replies[1]["result"]["tools"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn malformed_line_gets_parse_error() {
        let mut transport = transcript("{not json\n");
        transport
            .serve(ServerFactory::default().session(), std::future::pending())
            .await
            .unwrap();

        let replies = lines(&transport.into_writer());
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert!(replies[0]["id"].is_null());
    }

    #[tokio::test]
    async fn invalid_utf8_line_keeps_serving() {
        let mut input = vec![0xFF, 0xFE, b'\n'];
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        input.push(b'\n');

        let mut transport = StdioTransport::from_parts(input.as_slice(), Vec::new());
        transport
            .serve(ServerFactory::default().session(), std::future::pending())
            .await
            .unwrap();

        let replies = lines(&transport.into_writer());
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert!(replies[0]["id"].is_null());
        assert_eq!(replies[1]["id"], 1);
        assert!(replies[1].get("result").is_some());
    }

    #[tokio::test]
    async fn read_line_rejects_invalid_utf8() {
        let input: &[u8] = &[0xC3, 0x28, b'\n'];
        let mut transport = StdioTransport::from_parts(input, Vec::new());
        let err = transport.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn shutdown_stops_serving() {
        let (client, server_side) = tokio::io::duplex(64);
        let (reader, _) = tokio::io::split(server_side);
        let mut transport = StdioTransport::from_parts(reader, Vec::new());

        transport
            .serve(ServerFactory::default().session(), std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(transport.lifecycle().state(), ConnectionState::Closed);
        assert!(transport.into_writer().is_empty());
        drop(client);
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_failure_closes_quietly() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n".repeat(3);
        let mut transport = StdioTransport::from_parts(input.as_bytes(), BrokenPipe);

        let result = transport
            .serve(ServerFactory::default().session(), std::future::pending())
            .await;

        assert!(result.is_ok());
        assert_eq!(transport.lifecycle().state(), ConnectionState::Closed);
    }
}
