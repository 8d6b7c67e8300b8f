//! Model Context Protocol (MCP) server implementation.
//!
//! JSON-RPC 2.0 messages arrive over a transport, are decoded into a closed
//! set of methods and routed to the tool registry or to built-in lifecycle
//! handlers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │   stdio (server) ─┐                                          │
//! │                   ├─▶ Dispatcher ─▶ McpMethod ─▶ ToolRegistry │
//! │   SSE (crate::sse)┘        │                                 │
//! │                            ▼                                 │
//! │                  JSON-RPC envelopes                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! The latest supported version is 2024-11-05; 2024-10-07 is also accepted.

pub mod dispatcher;
pub mod method;
pub mod protocol;
pub mod server;
pub mod transport;

pub use dispatcher::{Dispatcher, ServerContext};
pub use method::McpMethod;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::StdioTransport;
