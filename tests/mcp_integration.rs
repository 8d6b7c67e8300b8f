//! Integration tests for MCP protocol handling.
//!
//! These tests drive the dispatcher with raw JSON-RPC values and check the
//! envelopes it produces, covering lifecycle methods, tool discovery and
//! invocation, and error containment.

use mcp_session_server::config::Config;
use mcp_session_server::error::ToolError;
use mcp_session_server::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use mcp_session_server::mcp::{Dispatcher, ServerContext};
use mcp_session_server::tools::{ParameterType, SharedRegistry, ToolBuilder, ToolParameter};
use mcp_session_server::build_dispatcher;
use serde_json::{json, Value};

fn empty_dispatcher() -> Dispatcher {
    Dispatcher::new(SharedRegistry::default(), ServerContext::default())
}

async fn call(dispatcher: &Dispatcher, request: Value) -> Value {
    dispatcher
        .handle_value(request)
        .await
        .expect("request should produce a reply")
        .to_value()
        .unwrap()
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1_i64.into()));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_invalid_json() {
    let err = parse_message("not valid json").unwrap_err();
    assert_eq!(err.error.code, -32700);
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let err = parse_message(json).unwrap_err();
    assert_eq!(err.error.code, -32600);
    assert_eq!(err.id, RequestId::Number(1_i64.into()));
}

// =============================================================================
// Envelope Validation Tests
// =============================================================================

#[tokio::test]
async fn test_invalid_envelopes_are_rejected() {
    let dispatcher = empty_dispatcher();

    for bad in [
        json!({"id": 1, "method": "ping"}),
        json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}),
        json!({"jsonrpc": "2.0", "id": 1}),
        json!({"jsonrpc": "2.0", "id": 1, "method": 42}),
    ] {
        let reply = call(&dispatcher, bad.clone()).await;
        assert_eq!(reply["error"]["code"], -32600, "payload: {bad}");
        assert_eq!(reply["jsonrpc"], "2.0");
    }
}

#[tokio::test]
async fn test_invalid_envelopes_without_id_are_silent() {
    let dispatcher = empty_dispatcher();

    for bad in [
        json!([1, 2, 3]),
        json!("ping"),
        json!({"method": "ping"}),
        json!({"jsonrpc": "1.0", "method": "ping"}),
        json!({"jsonrpc": "2.0", "method": 42}),
    ] {
        assert!(dispatcher.handle_value(bad.clone()).await.is_none(), "payload: {bad}");
    }
}

#[tokio::test]
async fn test_unusable_id_still_gets_a_null_id_reply() {
    let dispatcher = empty_dispatcher();
    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": {"x": 1}, "method": "ping"})).await;

    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(reply["id"], Value::Null);
}

#[tokio::test]
async fn test_any_numeric_id_is_echoed() {
    let dispatcher = empty_dispatcher();

    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"})).await;
    assert_eq!(reply["id"], json!(1.5));
    assert_eq!(reply["result"], json!({}));

    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": u64::MAX, "method": "ping"})).await;
    assert_eq!(reply["id"], json!(u64::MAX));
}

#[tokio::test]
async fn test_null_id_is_echoed() {
    let dispatcher = empty_dispatcher();
    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": null, "method": "ping"})).await;

    assert!(reply.as_object().unwrap().contains_key("id"));
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["result"], json!({}));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_initialize_negotiates_version() {
    let dispatcher = empty_dispatcher();

    let reply = call(
        &dispatcher,
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {"protocolVersion": "2024-10-07", "capabilities": {}, "clientInfo": {"name": "c"}}
        }),
    )
    .await;
    assert_eq!(reply["result"]["protocolVersion"], "2024-10-07");

    let reply = call(
        &dispatcher,
        json!({
            "jsonrpc": "2.0", "id": 2, "method": "initialize",
            "params": {"protocolVersion": "1999-01-01"}
        }),
    )
    .await;
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(reply["result"]["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], false);
    assert!(reply["result"].get("instructions").is_none());
}

#[tokio::test]
async fn test_initialize_reports_instructions() {
    let context = ServerContext {
        instructions: Some("Use the tools sparingly.".to_string()),
        context: vec!["All times are UTC.".to_string()],
        ..ServerContext::default()
    };
    let dispatcher = Dispatcher::new(SharedRegistry::default(), context);

    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;
    assert_eq!(
        reply["result"]["instructions"],
        "Use the tools sparingly.\n\nAll times are UTC."
    );
}

#[tokio::test]
async fn test_notification_short_circuit() {
    let dispatcher = empty_dispatcher();

    let reply = call(
        &dispatcher,
        json!({"jsonrpc": "2.0", "id": 9, "method": "notifications/cancelled", "params": {"requestId": 3}}),
    )
    .await;
    assert_eq!(reply["result"], json!({"success": true}));

    let silent = dispatcher
        .handle_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    assert!(silent.is_none());
}

#[tokio::test]
async fn test_resource_and_prompt_stubs() {
    let dispatcher = empty_dispatcher();

    let list = |method: &str, id: i64| json!({"jsonrpc": "2.0", "id": id, "method": method});

    assert_eq!(call(&dispatcher, list("resources/list", 1)).await["result"], json!({"resources": []}));
    assert_eq!(
        call(&dispatcher, list("resources/templates/list", 2)).await["result"],
        json!({"resourceTemplates": []})
    );
    assert_eq!(call(&dispatcher, list("prompts/list", 3)).await["result"], json!({"prompts": []}));

    let read = call(&dispatcher, list("resources/read", 4)).await;
    assert_eq!(read["error"]["code"], -32602);
    assert_eq!(read["error"]["message"], "Resource not found");

    let get = call(&dispatcher, list("prompts/get", 5)).await;
    assert_eq!(get["error"]["message"], "Prompt not found");
}

#[tokio::test]
async fn test_unknown_method() {
    let dispatcher = empty_dispatcher();
    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": "x", "method": "not/a/real/method"})).await;

    assert_eq!(reply["id"], "x");
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["error"]["message"], "not/a/real/method");
    assert!(reply.get("result").is_none());
}

// =============================================================================
// Tool Tests
// =============================================================================

#[tokio::test]
async fn test_tools_list_empty() {
    let dispatcher = empty_dispatcher();
    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    assert_eq!(reply["result"], json!({"tools": []}));
}

#[tokio::test]
async fn test_tools_list_preserves_registration_order() {
    let registry = SharedRegistry::default();
    {
        let mut tools = registry.write();
        for name in ["zeta", "alpha", "mid"] {
            tools.add_tool(
                ToolBuilder::new(name)
                    .description(format!("The {name} tool"))
                    .handler(|_| Ok(String::new())),
            );
        }
    }
    let dispatcher = Dispatcher::new(registry, ServerContext::default());

    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    let tools = reply["result"]["tools"].as_array().unwrap();
    let names: Vec<_> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["zeta", "alpha", "mid"]);

    assert_eq!(tools[0]["description"], "The zeta tool");
    assert_eq!(
        tools[0]["inputSchema"],
        json!({"type": "object", "properties": {}, "required": [], "additionalProperties": false})
    );
}

#[tokio::test]
async fn test_tool_schema_lists_required_parameters() {
    let registry = SharedRegistry::default();
    registry.write().add_tool(
        ToolBuilder::new("greet")
            .description("Say hello")
            .parameter(ToolParameter::required("name", ParameterType::String, "Who to greet"))
            .parameter(ToolParameter::optional("times", ParameterType::Integer, "Repeat count"))
            .handler(|args| Ok(format!("hello {}", args.require_str("name")?))),
    );
    let dispatcher = Dispatcher::new(registry, ServerContext::default());

    let reply = call(&dispatcher, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    let schema = &reply["result"]["tools"][0]["inputSchema"];
    assert_eq!(schema["properties"]["name"]["type"], "string");
    assert_eq!(schema["properties"]["times"]["type"], "integer");
    assert_eq!(schema["required"], json!(["name"]));
}

#[tokio::test]
async fn test_builtin_echo_call() {
    let dispatcher = build_dispatcher(&Config::default());

    let reply = call(
        &dispatcher,
        json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": {"name": "echo", "arguments": {"text": "hello"}}
        }),
    )
    .await;

    assert_eq!(
        reply["result"],
        json!({"content": [{"type": "text", "text": "hello"}], "isError": false})
    );
}

#[tokio::test]
async fn test_tool_error_is_contained() {
    let registry = SharedRegistry::default();
    registry.write().add_tool(
        ToolBuilder::new("fails")
            .description("Always fails")
            .handler(|_| Err(ToolError::failed("disk on fire"))),
    );
    let dispatcher = Dispatcher::new(registry, ServerContext::default());

    let reply = call(
        &dispatcher,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "fails"}}),
    )
    .await;

    assert!(reply.get("error").is_none());
    assert_eq!(reply["result"]["isError"], true);
    assert_eq!(reply["result"]["content"][0]["text"], "disk on fire");
}

#[tokio::test]
async fn test_missing_argument_is_a_tool_error() {
    let dispatcher = build_dispatcher(&Config::default());

    let reply = call(
        &dispatcher,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "echo", "arguments": {}}}),
    )
    .await;

    assert_eq!(reply["result"]["isError"], true);
    assert!(reply["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("text"));
}

#[tokio::test]
async fn test_tools_call_errors() {
    let dispatcher = build_dispatcher(&Config::default());

    let missing_name = call(
        &dispatcher,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {}}),
    )
    .await;
    assert_eq!(missing_name["error"]["code"], -32602);
    assert_eq!(missing_name["error"]["message"], "Missing required parameter: name");

    let unknown = call(
        &dispatcher,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "nope"}}),
    )
    .await;
    assert_eq!(unknown["error"]["code"], -32601);
    assert_eq!(unknown["error"]["message"], "Tool not found: nope");
}

#[tokio::test]
async fn test_registry_changes_are_visible_to_live_dispatcher() {
    let dispatcher = empty_dispatcher();
    dispatcher
        .registry()
        .write()
        .add_tool(ToolBuilder::new("late").handler(|_| Ok("here".to_string())));

    let reply = call(
        &dispatcher,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "late"}}),
    )
    .await;
    assert_eq!(reply["result"]["content"][0]["text"], "here");

    dispatcher.registry().write().remove_tool("late");
    let reply = call(
        &dispatcher,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "late"}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32601);
}
