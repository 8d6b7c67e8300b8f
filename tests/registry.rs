//! Integration tests for the tool registry.

use std::sync::Arc;

use mcp_session_server::tools::builtin::{register_builtins, BUILTIN_GROUP};
use mcp_session_server::tools::{Arguments, SharedRegistry, Tool, ToolBuilder, ToolRegistry};

fn named(name: &str, reply: &'static str) -> impl Tool {
    ToolBuilder::new(name)
        .description(format!("{name} tool"))
        .handler(move |_| Ok(reply.to_string()))
}

fn names(registry: &ToolRegistry) -> Vec<String> {
    registry.list().map(|t| t.name().to_string()).collect()
}

#[test]
fn test_add_is_idempotent_first_wins() {
    let mut registry = ToolRegistry::new();

    assert!(registry.add_tool(named("search", "first")));
    assert!(!registry.add_tool(named("search", "second")));

    assert_eq!(registry.len(), 1);
    assert_eq!(names(&registry), ["search"]);
}

#[tokio::test]
async fn test_duplicate_does_not_replace_handler() {
    let mut registry = ToolRegistry::new();
    registry.add_tool(named("search", "first"));
    registry.add_tool(named("search", "second"));

    let tool = registry.get_tool("search").unwrap();
    assert_eq!(tool.invoke(Arguments::default()).await.unwrap(), "first");
}

#[test]
fn test_remove_tool() {
    let mut registry = ToolRegistry::new();
    registry.add_tool(named("a", ""));
    registry.add_tool(named("b", ""));
    registry.add_tool(named("c", ""));

    assert!(registry.remove_tool("b"));
    assert!(!registry.remove_tool("b"));
    assert!(registry.get_tool("b").is_none());
    assert_eq!(names(&registry), ["a", "c"]);
}

#[test]
fn test_remove_then_readd_goes_to_the_end() {
    let mut registry = ToolRegistry::new();
    registry.add_tool(named("a", ""));
    registry.add_tool(named("b", ""));

    registry.remove_tool("a");
    registry.add_tool(named("a", ""));

    assert_eq!(names(&registry), ["b", "a"]);
}

#[test]
fn test_clear_is_safe_when_empty() {
    let mut registry = ToolRegistry::new();
    registry.clear();
    assert!(registry.is_empty());

    register_builtins(&mut registry, &["echo", "current_time"]);
    assert_eq!(registry.len(), 2);
    assert!(registry.group(BUILTIN_GROUP).is_some());

    registry.clear();
    assert!(registry.is_empty());
    assert!(registry.group(BUILTIN_GROUP).is_none());
    assert_eq!(registry.list().count(), 0);
}

#[test]
fn test_groups_remove_only_their_members() {
    let mut registry = ToolRegistry::new();
    registry.add_tool(named("standalone", ""));
    let inserted = registry.add_group(
        "admin",
        [
            Arc::new(named("ban", "")) as Arc<dyn Tool>,
            Arc::new(named("standalone", "")) as Arc<dyn Tool>,
        ],
    );
    assert_eq!(inserted, 1);

    assert_eq!(registry.remove_group("admin"), 1);
    assert_eq!(names(&registry), ["standalone"]);
    assert_eq!(registry.remove_group("admin"), 0);
}

#[test]
fn test_shared_registry_mutations_are_visible() {
    let shared = SharedRegistry::default();
    let other = shared.clone();

    other.write().add_tool(named("x", ""));
    assert!(shared.read().contains("x"));

    shared.write().remove_tool("x");
    assert!(!other.read().contains("x"));
}
