//! mcp-session-server: a Model Context Protocol server core.
//!
//! Clients discover tools with `tools/list` and invoke them with `tools/call`
//! over JSON-RPC 2.0. Two transports share one dispatcher:
//!
//! - **stdio**: newline-delimited JSON on stdin/stdout
//! - **SSE**: an event stream per client plus a POST endpoint, with replies
//!   queued in a session store (files on disk, or Redis)
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`logging`]: Tracing setup and HTTP request logging
//! - [`mcp`]: MCP protocol, dispatcher and stdio transport
//! - [`session`]: Session storage for the SSE transport
//! - [`sse`]: HTTP/SSE transport
//! - [`tools`]: Tool abstraction, registry and built-in tools

pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod session;
pub mod sse;
pub mod tools;

use config::Config;
use mcp::Dispatcher;
use tools::builtin::register_builtins;
use tools::{SharedRegistry, ToolRegistry};

/// Builds the dispatcher described by the configuration, with the enabled
/// built-in tools registered.
#[must_use]
pub fn build_dispatcher(config: &Config) -> Dispatcher {
    let mut registry = ToolRegistry::new();
    let registered = register_builtins(&mut registry, &config.tools.enabled);
    tracing::debug!(tools = registered, "registered built-in tools");

    Dispatcher::new(SharedRegistry::new(registry), config.server.server_context())
        .with_tool_timeout(config.server.tool_timeout())
}
