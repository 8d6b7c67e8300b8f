//! The stdio MCP server loop.
//!
//! One message is fully processed before the next line is read. Blank lines
//! and lines that are not JSON are skipped; everything else goes through the
//! [`Dispatcher`] and the reply, if any, is written back as a single line.

use std::io;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::transport::StdioTransport;

/// MCP server bound to a line transport.
pub struct McpServer<R = tokio::io::BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    /// Line transport.
    transport: StdioTransport<R, W>,
    /// Request router shared with other transports.
    dispatcher: Dispatcher,
}

impl McpServer {
    /// Creates a server reading stdin and writing stdout.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::with_transport(StdioTransport::new(), dispatcher)
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an arbitrary line transport.
    pub const fn with_transport(transport: StdioTransport<R, W>, dispatcher: Dispatcher) -> Self {
        Self {
            transport,
            dispatcher,
        }
    }

    /// The dispatcher this server routes through.
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Consumes the server, returning the transport's writer.
    pub fn into_writer(self) -> W {
        self.transport.into_writer()
    }

    /// Runs the server until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from or writing to the transport fails.
    pub async fn run(&mut self) -> io::Result<()> {
        tracing::info!("MCP stdio server ready");
        self.run_with_shutdown().await?;
        tracing::info!("MCP stdio server stopped");
        Ok(())
    }

    /// Processes lines until EOF, ignoring signals.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from or writing to the transport fails.
    pub async fn serve(&mut self) -> io::Result<()> {
        while let Some(line) = self.transport.read_line().await? {
            self.handle_line(&line).await?;
        }
        tracing::debug!("input closed");
        Ok(())
    }

    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "could not install signal handlers, running until EOF");
                    return self.serve().await;
                }
            };

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    let Some(line) = line_result? else {
                        tracing::debug!("input closed");
                        return Ok(());
                    };
                    self.handle_line(&line).await?;
                }
            }
        }
    }

    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    let Some(line) = line_result? else {
                        tracing::debug!("input closed");
                        return Ok(());
                    };
                    self.handle_line(&line).await?;
                }
            }
        }
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &[u8]) -> io::Result<()> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::debug!(error = %e, "skipping line that is not UTF-8");
                return Ok(());
            }
        };
        if line.is_empty() {
            return Ok(());
        }

        let payload: Value = match serde_json::from_str(line) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "skipping line that is not JSON");
                return Ok(());
            }
        };

        if let Some(reply) = self.dispatcher.handle_value(payload).await {
            self.transport.write_message(&reply).await?;
        }
        Ok(())
    }
}
