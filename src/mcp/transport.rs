//! stdio transport for MCP server.
//!
//! The stdio transport:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! The transport is generic over its reader and writer so tests can drive it
//! with in-memory pipes.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp::protocol::OutgoingMessage;

/// A line-framed MCP transport.
///
/// Handles reading JSON-RPC messages from the reader and writing responses
/// to the writer, one per line.
pub struct StdioTransport<R = BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    /// Buffered reader for incoming lines.
    reader: R,
    /// Sink for outgoing lines.
    writer: W,
}

impl StdioTransport {
    /// Creates a transport bound to the process's stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over arbitrary streams.
    pub const fn with_io(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next message line as raw bytes.
    ///
    /// Returns `None` if the input is closed (EOF). The bytes are not checked
    /// for UTF-8 here, so a garbled line never ends the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut line).await?;

        if bytes_read == 0 {
            // EOF - input closed
            return Ok(None);
        }

        // Remove the trailing newline
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Writes a reply envelope, terminated with a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message(&mut self, message: &OutgoingMessage) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(&json).await
    }

    /// Writes a raw JSON string with newline termination.
    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        // One message per line, so no embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Consumes the transport, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{
        ErrorCode, JsonRpcError, JsonRpcErrorData, JsonRpcResponse, RequestId,
    };

    #[test]
    fn transport_default() {
        // Just ensure Default is implemented and doesn't panic
        let _transport: StdioTransport = StdioTransport::default();
    }

    #[tokio::test]
    async fn read_line_strips_line_endings() {
        let input = tokio_test::io::Builder::new()
            .read(b"first\r\nsecond\n")
            .read(b"third")
            .build();
        let mut transport = StdioTransport::with_io(BufReader::new(input), Vec::new());

        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some(&b"third"[..]));
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_line_passes_invalid_utf8_through() {
        let input = &b"\xff\xfe\nok\n"[..];
        let mut transport = StdioTransport::with_io(BufReader::new(input), Vec::new());

        assert_eq!(transport.read_line().await.unwrap(), Some(vec![0xff, 0xfe]));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some(&b"ok"[..]));
    }

    #[tokio::test]
    async fn write_message_appends_newline() {
        let mut transport = StdioTransport::with_io(BufReader::new(&b""[..]), Vec::new());
        let response: OutgoingMessage =
            JsonRpcResponse::success(RequestId::Number(1_i64.into()), serde_json::json!({})).into();

        transport.write_message(&response).await.unwrap();

        let written = String::from_utf8(transport.into_writer()).unwrap();
        assert_eq!(written, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n");
    }

    #[tokio::test]
    async fn serialise_error_no_newlines() {
        let error: OutgoingMessage =
            JsonRpcError::new(
                RequestId::Number(1_i64.into()),
                JsonRpcErrorData::with_message(ErrorCode::MethodNotFound, "test/method"),
            )
            .into();

        let json = serde_json::to_string(&error).unwrap();
        assert!(
            !json.contains('\n'),
            "Serialised JSON should not contain newlines"
        );
    }
}
