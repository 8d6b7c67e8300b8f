//! Routes JSON-RPC messages to protocol operations and the tool registry.
//!
//! Each message is handled on its own:
//!
//! ```text
//! Received ─▶ Validated ─▶ Routed ─▶ Success | Failure ─▶ Formatted
//! ```
//!
//! Validation failures, unknown methods and bad parameters become JSON-RPC
//! error envelopes. Tool failures do not: they are successful calls whose
//! result carries `isError: true`, so the calling model can read them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::method::{InitializeParams, McpMethod, ToolCallParams};
use super::protocol::{
    parse_value, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData, JsonRpcResponse,
    OutgoingMessage, RequestId, MCP_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::tools::{SharedRegistry, Tool};

/// Identity and prompt context the server reports to clients.
///
/// Context entries are appended to the configured instructions; nothing
/// global accumulates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerContext {
    /// Server name reported in `serverInfo`.
    pub name: String,
    /// Server version reported in `serverInfo`.
    pub version: String,
    /// Base instructions for the client model.
    pub instructions: Option<String>,
    /// Additional context paragraphs appended to the instructions.
    pub context: Vec<String>,
}

impl Default for ServerContext {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            context: Vec::new(),
        }
    }
}

impl ServerContext {
    /// Composes the `instructions` string, or `None` when there is nothing to say.
    #[must_use]
    pub fn instructions(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .instructions
            .iter()
            .chain(&self.context)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ListCapability,
    /// Resource-related capabilities.
    pub resources: ResourceCapability,
    /// Prompt-related capabilities.
    pub prompts: ListCapability,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: ListCapability { list_changed: false },
            resources: ResourceCapability {
                subscribe: false,
                list_changed: false,
            },
            prompts: ListCapability { list_changed: false },
        }
    }
}

/// Capability of a listable feature.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCapability {
    /// Whether the list can change during the session.
    pub list_changed: bool,
}

/// Resource capabilities.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCapability {
    /// Whether clients may subscribe to resource updates.
    pub subscribe: bool,
    /// Whether the list can change during the session.
    pub list_changed: bool,
}

/// Result of the initialize request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Server identity.
    pub server_info: ServerInfo,
    /// Advertised capabilities.
    pub capabilities: ServerCapabilities,
    /// Instructions for the client model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Describes a registered tool.
    #[must_use]
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        }
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

type RouteResult = Result<Value, JsonRpcErrorData>;

/// The protocol dispatcher.
///
/// Cheap to clone; clones share the registry and context.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: SharedRegistry,
    context: Arc<ServerContext>,
    tool_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Creates a dispatcher over a registry.
    #[must_use]
    pub fn new(registry: SharedRegistry, context: ServerContext) -> Self {
        Self {
            registry,
            context: Arc::new(context),
            tool_timeout: None,
        }
    }

    /// Bounds how long a single tool call may run.
    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// The registry this dispatcher reads.
    #[must_use]
    pub const fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Handles a decoded JSON value.
    ///
    /// Returns the reply to send, or `None` for messages without an `id`.
    /// An invalid envelope gets an error reply only when it carries an `id`.
    pub async fn handle_value(&self, payload: Value) -> Option<OutgoingMessage> {
        let has_id = payload.get("id").is_some();
        match parse_value(payload) {
            Ok(message) => self.handle_message(message).await,
            Err(error) => {
                debug!(code = error.error.code, has_id, "rejected invalid JSON-RPC envelope");
                has_id.then(|| error.into())
            }
        }
    }

    /// Handles a validated message, returning a reply only for requests.
    pub async fn handle_message(&self, message: IncomingMessage) -> Option<OutgoingMessage> {
        let expects_reply = message.id().is_some();
        let reply = self.dispatch(&message).await;
        expects_reply.then_some(reply)
    }

    /// Routes a message and formats the envelope.
    ///
    /// Always produces an envelope, including for notifications; callers
    /// decide whether to deliver it.
    pub async fn dispatch(&self, message: &IncomingMessage) -> OutgoingMessage {
        let id = message.id().cloned().unwrap_or(RequestId::Null);
        let method = message.method();

        let routed = AssertUnwindSafe(self.route(method, message.params()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let detail = panic_message(panic.as_ref());
                error!(method = %method, panic_message = %detail, "method handler panicked");
                Err(JsonRpcErrorData::internal(detail))
            });

        let reply: OutgoingMessage = match routed {
            Ok(result) => JsonRpcResponse::success(id, result).into(),
            Err(error) => JsonRpcError::new(id, error).into(),
        };

        info!(
            method = %method,
            params = %redact_audit_params(message.params()),
            outcome = if reply.is_error() { "failure" } else { "success" },
            "mcp action audited"
        );

        reply
    }

    async fn route(&self, method: &str, params: Option<&Value>) -> RouteResult {
        match McpMethod::parse(method, params)? {
            McpMethod::Notification(name) => {
                debug!(method = %name, "notification acknowledged");
                Ok(json!({ "success": true }))
            }
            McpMethod::Initialize(params) => self.initialize(&params),
            McpMethod::Ping => Ok(json!({})),
            McpMethod::ToolsList => self.tools_list(),
            McpMethod::ToolsCall(call) => self.tools_call(call).await,
            McpMethod::ResourcesList => Ok(json!({ "resources": [] })),
            McpMethod::ResourceTemplatesList => Ok(json!({ "resourceTemplates": [] })),
            McpMethod::PromptsList => Ok(json!({ "prompts": [] })),
            McpMethod::ResourcesRead => Err(JsonRpcErrorData::with_message(
                ErrorCode::InvalidParams,
                "Resource not found",
            )),
            McpMethod::PromptsGet => Err(JsonRpcErrorData::with_message(
                ErrorCode::InvalidParams,
                "Prompt not found",
            )),
            McpMethod::Unknown(name) => Err(JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                name,
            )),
        }
    }

    fn initialize(&self, params: &InitializeParams) -> RouteResult {
        let protocol_version = negotiate_protocol_version(params.protocol_version.as_deref());

        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                protocol_version,
                "client initialised"
            );
        }

        to_result(&InitializeResult {
            protocol_version: protocol_version.to_string(),
            server_info: ServerInfo {
                name: self.context.name.clone(),
                version: self.context.version.clone(),
            },
            capabilities: ServerCapabilities::default(),
            instructions: self.context.instructions(),
        })
    }

    fn tools_list(&self) -> RouteResult {
        let tools: Vec<ToolDefinition> = self
            .registry
            .read()
            .list()
            .map(|tool| ToolDefinition::from_tool(tool.as_ref()))
            .collect();

        Ok(json!({ "tools": to_result(&tools)? }))
    }

    async fn tools_call(&self, call: ToolCallParams) -> RouteResult {
        let tool = self.registry.read().get_tool(&call.name);
        let Some(tool) = tool else {
            return Err(JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Tool not found: {}", call.name),
            ));
        };

        let invocation = tool.invoke(call.arguments);
        let outcome = match self.tool_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation).await.map_err(|_| {
                warn!(tool = %call.name, timeout = ?limit, "tool call timed out");
                JsonRpcErrorData::from_code(ErrorCode::RequestTimeout)
                    .with_data(json!({ "tool": call.name }))
            })?,
            None => invocation.await,
        };

        let result = match outcome {
            Ok(text) => ToolCallResult::text(text),
            Err(err) => {
                debug!(tool = %call.name, error = %err, "tool reported an error");
                ToolCallResult::error(err.to_string())
            }
        };

        to_result(&result)
    }
}

/// Picks the protocol version to speak.
///
/// A supported offer is echoed; anything else, including no offer at all,
/// gets the latest version.
#[must_use]
pub fn negotiate_protocol_version(offered: Option<&str>) -> &'static str {
    offered
        .map(str::trim)
        .and_then(|offer| {
            SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .copied()
                .find(|supported| *supported == offer)
        })
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

fn to_result<T: Serialize>(value: &T) -> RouteResult {
    serde_json::to_value(value).map_err(|e| {
        error!(error = %e, "failed to serialise result");
        JsonRpcErrorData::internal(e.to_string())
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Copies params for the audit log with sensitive values replaced.
#[must_use]
pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map_or(Value::Null, redact_audit_value)
}

fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || ["token", "secret", "password", "credential"]
        .iter()
        .any(|needle| normalized.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolBuilder, ToolFuture, ToolRegistry};

    fn dispatcher_with(registry: ToolRegistry) -> Dispatcher {
        Dispatcher::new(registry.into(), ServerContext::default())
    }

    #[test]
    fn negotiate_keeps_supported_versions() {
        assert_eq!(negotiate_protocol_version(Some("2024-10-07")), "2024-10-07");
        assert_eq!(negotiate_protocol_version(Some("2024-11-05")), "2024-11-05");
    }

    #[test]
    fn negotiate_substitutes_latest() {
        assert_eq!(negotiate_protocol_version(Some("2099-01-01")), MCP_PROTOCOL_VERSION);
        assert_eq!(negotiate_protocol_version(None), MCP_PROTOCOL_VERSION);
    }

    #[test]
    fn instructions_compose_context() {
        let context = ServerContext {
            instructions: Some("Base.".to_string()),
            context: vec!["  ".to_string(), "Extra.".to_string()],
            ..ServerContext::default()
        };
        assert_eq!(context.instructions().as_deref(), Some("Base.\n\nExtra."));
        assert_eq!(ServerContext::default().instructions(), None);
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "echo",
            "arguments": {
                "text": "visible",
                "access_token": "hidden",
                "nested": { "Password": "hidden" }
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["arguments"]["text"], "visible");
        assert_eq!(redacted["arguments"]["access_token"], "[REDACTED]");
        assert_eq!(redacted["arguments"]["nested"]["Password"], "[REDACTED]");
    }

    #[tokio::test]
    async fn panicking_tool_becomes_internal_error() {
        let mut registry = ToolRegistry::new();
        registry.add_tool(ToolBuilder::new("explode").handler(|_| panic!("kaboom")));
        let dispatcher = dispatcher_with(registry);

        let reply = dispatcher
            .handle_value(json!({
                "jsonrpc": "2.0", "id": 9, "method": "tools/call",
                "params": {"name": "explode"}
            }))
            .await
            .unwrap();

        let OutgoingMessage::Error(err) = reply else {
            panic!("Expected error envelope");
        };
        assert_eq!(err.error.code, ErrorCode::InternalError.code());
        assert_eq!(err.error.data, Some(json!("kaboom")));
        assert_eq!(err.id, RequestId::Number(9_i64.into()));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let mut registry = ToolRegistry::new();
        registry.add_tool(ToolBuilder::new("slow").async_handler(|_| -> ToolFuture {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("done".to_string())
            })
        }));
        let dispatcher =
            dispatcher_with(registry).with_tool_timeout(Some(Duration::from_millis(20)));

        let reply = dispatcher
            .handle_value(json!({
                "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": {"name": "slow"}
            }))
            .await
            .unwrap();

        let OutgoingMessage::Error(err) = reply else {
            panic!("Expected error envelope");
        };
        assert_eq!(err.error.code, ErrorCode::RequestTimeout.code());
    }

    #[tokio::test]
    async fn notification_without_id_has_no_reply_but_is_acknowledged() {
        let dispatcher = dispatcher_with(ToolRegistry::new());
        let message = parse_value(json!({
            "jsonrpc": "2.0", "method": "notifications/initialized"
        }))
        .unwrap();

        let ack = dispatcher.dispatch(&message).await;
        let OutgoingMessage::Response(response) = ack else {
            panic!("Expected acknowledgement");
        };
        assert_eq!(response.result, json!({"success": true}));

        assert!(dispatcher.handle_message(message).await.is_none());
    }
}
