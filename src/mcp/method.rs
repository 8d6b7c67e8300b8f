//! The closed set of MCP methods this server understands.
//!
//! Method strings are decoded once into [`McpMethod`], carrying typed
//! parameters; anything unrecognised lands in [`McpMethod::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::protocol::{ErrorCode, JsonRpcErrorData};
use crate::tools::Arguments;

/// Prefix marking fire-and-forget methods.
pub const NOTIFICATION_PREFIX: &str = "notification";

/// Client information received during initialisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    #[serde(default)]
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
///
/// Every field is optional: a client offering nothing still gets a session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    pub arguments: Arguments,
}

/// A decoded MCP method.
#[derive(Debug, Clone, PartialEq)]
pub enum McpMethod {
    /// `initialize`
    Initialize(InitializeParams),
    /// `ping`
    Ping,
    /// `tools/list`
    ToolsList,
    /// `tools/call`
    ToolsCall(ToolCallParams),
    /// `resources/list`
    ResourcesList,
    /// `resources/templates/list`
    ResourceTemplatesList,
    /// `resources/read`
    ResourcesRead,
    /// `prompts/list`
    PromptsList,
    /// `prompts/get`
    PromptsGet,
    /// Any method starting with `notification`.
    Notification(String),
    /// Anything else.
    Unknown(String),
}

impl McpMethod {
    /// Decodes a method name and its parameters.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidParams` error when a known method's required
    /// parameters are missing or malformed.
    pub fn parse(method: &str, params: Option<&Value>) -> Result<Self, JsonRpcErrorData> {
        if method.starts_with(NOTIFICATION_PREFIX) {
            return Ok(Self::Notification(method.to_string()));
        }

        Ok(match method {
            "initialize" => Self::Initialize(parse_initialize(params)),
            "ping" => Self::Ping,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall(parse_tool_call(params)?),
            "resources/list" => Self::ResourcesList,
            "resources/templates/list" => Self::ResourceTemplatesList,
            "resources/read" => Self::ResourcesRead,
            "prompts/list" => Self::PromptsList,
            "prompts/get" => Self::PromptsGet,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Lenient: malformed initialize params are treated as empty.
fn parse_initialize(params: Option<&Value>) -> InitializeParams {
    params
        .filter(|p| p.is_object())
        .and_then(|p| InitializeParams::deserialize(p).ok())
        .unwrap_or_default()
}

fn parse_tool_call(params: Option<&Value>) -> Result<ToolCallParams, JsonRpcErrorData> {
    let empty = Map::new();
    let params = params.and_then(Value::as_object).unwrap_or(&empty);

    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            JsonRpcErrorData::with_message(
                ErrorCode::InvalidParams,
                "Missing required parameter: name",
            )
        })?
        .to_string();

    let arguments = params
        .get("arguments")
        .cloned()
        .map_or_else(|| Some(Arguments::default()), Arguments::from_value)
        .ok_or_else(|| {
            JsonRpcErrorData::with_message(
                ErrorCode::InvalidParams,
                "Parameter 'arguments' must be an object",
            )
        })?;

    Ok(ToolCallParams { name, arguments })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn notification_prefix_wins() {
        let method = McpMethod::parse("notifications/cancelled", None).unwrap();
        assert_eq!(
            method,
            McpMethod::Notification("notifications/cancelled".to_string())
        );
    }

    #[test]
    fn tool_call_requires_name() {
        let err = McpMethod::parse("tools/call", Some(&json!({"arguments": {}}))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams.code());
        assert_eq!(err.message, "Missing required parameter: name");

        let err = McpMethod::parse("tools/call", None).unwrap_err();
        assert_eq!(err.message, "Missing required parameter: name");
    }

    #[test]
    fn tool_call_arguments_default_to_empty() {
        let method = McpMethod::parse("tools/call", Some(&json!({"name": "echo"}))).unwrap();
        let McpMethod::ToolsCall(call) = method else {
            panic!("Expected ToolsCall");
        };
        assert_eq!(call.name, "echo");
        assert!(call.arguments.as_map().is_empty());
    }

    #[test]
    fn tool_call_rejects_non_object_arguments() {
        let err = McpMethod::parse("tools/call", Some(&json!({"name": "echo", "arguments": [1]})))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams.code());
    }

    #[test]
    fn initialize_is_lenient() {
        let method = McpMethod::parse("initialize", Some(&json!({"clientInfo": 5}))).unwrap();
        assert_eq!(method, McpMethod::Initialize(InitializeParams::default()));

        let method = McpMethod::parse(
            "initialize",
            Some(&json!({"protocolVersion": "2024-10-07", "clientInfo": {"name": "c"}})),
        )
        .unwrap();
        let McpMethod::Initialize(params) = method else {
            panic!("Expected Initialize");
        };
        assert_eq!(params.protocol_version.as_deref(), Some("2024-10-07"));
        assert_eq!(params.client_info.unwrap().name, "c");
    }

    #[test]
    fn unknown_methods_keep_their_name() {
        assert_eq!(
            McpMethod::parse("not/a/real/method", None).unwrap(),
            McpMethod::Unknown("not/a/real/method".to_string())
        );
    }
}
